//! Write helpers shared by the fake server handlers.
//!
//! Every write is flushed immediately so a response is visible to the
//! client before the handler returns.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Write a protocol line (the caller supplies the CRLF) and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    write_bytes(stream, line.as_bytes()).await
}

/// Write raw bytes, e.g. the payload of a literal, and flush.
pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

/// Send the tagged completion of a command.
pub async fn complete<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    tag: &str,
    status: &str,
    text: &str,
) {
    let _ = write_line(stream, &format!("{tag} {status} {text}\r\n")).await;
}

/// Run a handler against an in-memory stream and return its output.
#[cfg(test)]
pub async fn capture<F>(handler: F) -> String
where
    F: AsyncFnOnce(&mut BufReader<tokio::io::DuplexStream>),
{
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut stream = BufReader::new(server);
    handler(&mut stream).await;
    drop(stream);

    let mut buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
        .await
        .unwrap();
    String::from_utf8(buf).unwrap()
}
