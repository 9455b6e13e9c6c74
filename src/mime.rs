//! MIME body-structure tree and attachment walker
//!
//! The server describes a message as a tree of parts. [`BodyNode`]
//! models it as an explicit composite/leaf enum; [`attachment_parts`]
//! flattens the leaves that carry disposition parameters into
//! [`AttachmentPart`] descriptors addressed by dotted part numbers.

use crate::encoding::{TransferEncoding, decode_mime_words};
use serde::{Deserialize, Serialize};

/// One node of a message body structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyNode {
    /// A `multipart/*` container.
    Multipart { subtype: String, parts: Vec<Self> },
    /// Any single part, including `message/rfc822`.
    Leaf(BodyLeaf),
}

/// A `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    /// Lowercased disposition type (`inline`, `attachment`, ...).
    pub kind: String,
    pub params: Vec<(String, String)>,
}

impl Disposition {
    #[must_use]
    pub fn new(kind: &str, params: Vec<(String, String)>) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyLeaf {
    /// Lowercased top-level media type (`text`, `image`, ...).
    pub media_type: String,
    /// Lowercased subtype (`plain`, `png`, ...).
    pub subtype: String,
    /// Content-Type parameters (`charset`, `name`, ...).
    pub params: Vec<(String, String)>,
    pub content_id: Option<String>,
    pub encoding: TransferEncoding,
    pub size: u32,
    pub disposition: Option<Disposition>,
    /// Body of an embedded `message/rfc822` part.
    pub embedded: Option<Box<BodyNode>>,
}

impl BodyLeaf {
    /// A leaf with the given media type and no parameters.
    #[must_use]
    pub fn new(media_type: &str, subtype: &str) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
            content_id: None,
            encoding: TransferEncoding::default(),
            size: 0,
            disposition: None,
            embedded: None,
        }
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    fn is_attachment(&self) -> bool {
        self.disposition
            .as_ref()
            .is_some_and(|d| d.kind == "attachment")
    }
}

/// Flat description of one attachment-bearing leaf, before its content
/// has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    pub name: String,
    /// Dotted part number, e.g. `2.1.3`.
    pub part: String,
    pub encoding: TransferEncoding,
    pub size: u32,
    /// Content-ID, empty when absent.
    pub reference: String,
    pub disposition: String,
    pub subtype: String,
}

/// Collect the attachment descriptors of a body structure in pre-order.
///
/// Only leaves with disposition parameters produce a descriptor. With
/// `index` set, the walk stops as soon as that position exists and the
/// result holds only that descriptor (or nothing, when the message has
/// fewer attachments).
#[must_use]
pub fn attachment_parts(root: &BodyNode, index: Option<usize>) -> Vec<AttachmentPart> {
    let mut found = Vec::new();
    let start = match root {
        BodyNode::Multipart { .. } => String::new(),
        BodyNode::Leaf(_) => "1".to_string(),
    };
    walk(root, &start, index, &mut found);

    match index {
        Some(i) => found.into_iter().nth(i).into_iter().collect(),
        None => found,
    }
}

fn child_path(parent: &str, n: usize) -> String {
    if parent.is_empty() {
        n.to_string()
    } else {
        format!("{parent}.{n}")
    }
}

/// Returns true once the requested index has been reached.
fn walk(node: &BodyNode, path: &str, index: Option<usize>, found: &mut Vec<AttachmentPart>) -> bool {
    match node {
        BodyNode::Multipart { parts, .. } => {
            for (i, child) in parts.iter().enumerate() {
                if walk(child, &child_path(path, i + 1), index, found) {
                    return true;
                }
            }
            false
        }
        BodyNode::Leaf(leaf) => {
            if leaf.disposition.is_none()
                && let Some(embedded) = &leaf.embedded
            {
                return match embedded.as_ref() {
                    BodyNode::Multipart { .. } => walk(embedded, path, index, found),
                    BodyNode::Leaf(_) => walk(embedded, &child_path(path, 1), index, found),
                };
            }
            let Some(descriptor) = describe(leaf, path) else {
                return false;
            };
            found.push(descriptor);
            index.is_some_and(|i| found.len() > i)
        }
    }
}

fn describe(leaf: &BodyLeaf, path: &str) -> Option<AttachmentPart> {
    let disposition = leaf.disposition.as_ref()?;
    let (_, raw_name) = disposition
        .params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("filename"))
        .or_else(|| disposition.params.first())?;

    Some(AttachmentPart {
        name: decode_mime_words(raw_name),
        part: path.to_string(),
        encoding: leaf.encoding.clone(),
        size: leaf.size,
        reference: leaf.content_id.clone().unwrap_or_default(),
        disposition: disposition.kind.clone(),
        subtype: leaf.subtype.clone(),
    })
}

/// Find the first `text/{subtype}` leaf that is not an attachment.
///
/// Returns its part number together with the leaf. Embedded messages
/// are not searched.
#[must_use]
pub fn find_text_part<'a>(root: &'a BodyNode, subtype: &str) -> Option<(String, &'a BodyLeaf)> {
    fn search<'a>(node: &'a BodyNode, path: &str, subtype: &str) -> Option<(String, &'a BodyLeaf)> {
        match node {
            BodyNode::Multipart { parts, .. } => parts
                .iter()
                .enumerate()
                .find_map(|(i, child)| search(child, &child_path(path, i + 1), subtype)),
            BodyNode::Leaf(leaf) => (leaf.media_type == "text"
                && leaf.subtype.eq_ignore_ascii_case(subtype)
                && !leaf.is_attachment())
            .then(|| (path.to_string(), leaf)),
        }
    }

    match root {
        BodyNode::Multipart { .. } => search(root, "", subtype),
        BodyNode::Leaf(_) => search(root, "1", subtype),
    }
}
