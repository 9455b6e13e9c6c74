//! Inline image embedding

use crate::message::Attachment;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Replace `cid:` references in an HTML body with data URIs built from
/// the matching inline attachments.
///
/// Attachments that are not `inline`, or have no Content-ID, are
/// ignored. References without a matching attachment stay as they are.
#[must_use]
pub fn embed_inline_images(html: &str, attachments: &[Attachment]) -> String {
    let mut out = html.to_string();
    for attachment in attachments {
        if attachment.disposition != "inline" || attachment.reference.is_empty() {
            continue;
        }
        let reference = attachment.reference.replace(['<', '>'], "");
        let data_uri = format!(
            "data:image/{};base64,{}",
            attachment.subtype.to_ascii_lowercase(),
            STANDARD.encode(&attachment.content)
        );
        out = out.replace(&format!("cid:{reference}"), &data_uri);
    }
    out
}
