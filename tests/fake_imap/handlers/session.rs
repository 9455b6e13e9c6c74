//! Connection-level commands: CAPABILITY, LOGIN, NOOP and LOGOUT.
//!
//! LOGIN accepts any credentials except the password `wrong`, which
//! lets tests exercise the login failure path.

use crate::fake_imap::io::{complete, write_line};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub const REJECTED_PASSWORD: &str = "wrong";

pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    let _ = write_line(stream, "* CAPABILITY IMAP4rev1 STARTTLS\r\n").await;
    complete(stream, tag, "OK", "CAPABILITY completed").await;
}

/// Returns whether the session may continue.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    password: &[u8],
    stream: &mut BufReader<S>,
) -> bool {
    if password == REJECTED_PASSWORD.as_bytes() {
        complete(stream, tag, "NO", "[AUTHENTICATIONFAILED] Invalid credentials").await;
        return false;
    }
    complete(stream, tag, "OK", "LOGIN completed").await;
    true
}

pub async fn handle_noop<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    complete(stream, tag, "OK", "NOOP completed").await;
}

pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    let _ = write_line(stream, "* BYE\r\n").await;
    complete(stream, tag, "OK", "LOGOUT completed").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::capture;

    #[tokio::test]
    async fn login_accepts_any_other_password() {
        let mut ok = false;
        let output = capture(async |s| ok = handle_login("A0001", b"secret", s).await).await;
        assert!(ok);
        assert_eq!(output, "A0001 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn login_rejects_the_wrong_password() {
        let mut ok = true;
        let output = capture(async |s| ok = handle_login("A0001", b"wrong", s).await).await;
        assert!(!ok);
        assert!(output.starts_with("A0001 NO"));
    }

    #[tokio::test]
    async fn logout_sends_bye_before_ok() {
        let output = capture(async |s| handle_logout("X1", s).await).await;
        assert_eq!(output, "* BYE\r\nX1 OK LOGOUT completed\r\n");
    }

    #[tokio::test]
    async fn capability_lists_starttls() {
        let output = capture(async |s| handle_capability("A1", s).await).await;
        assert!(output.contains("* CAPABILITY IMAP4rev1 STARTTLS"));
    }
}
