//! Response serialization and SSE framing.

use riptide_router::{Response, Status};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes a response to the transport.
///
/// The writer owns the framing headers: `content-length` is always derived
/// from the body and `connection` reflects the session's keep-alive
/// decision, so handlers cannot desynchronize the connection state.
pub async fn write_response<T>(
    transport: &mut T,
    response: &Response,
    close: bool,
) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let mut wire = Vec::with_capacity(256 + response.body.len());
    wire.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            response.status.code(),
            response.status.reason()
        )
        .as_bytes(),
    );
    for (name, value) in &response.headers {
        wire.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    wire.extend_from_slice(format!("content-length: {}\r\n", response.body.len()).as_bytes());
    wire.extend_from_slice(if close {
        b"connection: close\r\n"
    } else {
        b"connection: keep-alive\r\n"
    });
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(&response.body);

    transport.write_all(&wire).await?;
    transport.flush().await
}

/// Writes the response head that switches a connection into an SSE stream,
/// followed by a `retry:` reconnection hint.
pub async fn write_sse_preamble<T>(transport: &mut T, retry_ms: u64) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         content-type: text/event-stream\r\n\
         cache-control: no-cache\r\n\
         connection: keep-alive\r\n\r\n\
         retry: {retry_ms}\n\n"
    );
    transport.write_all(head.as_bytes()).await?;
    transport.flush().await
}

/// Writes one SSE event block. Multi-line payloads become one `data:` line
/// per payload line, per the SSE framing rules.
pub async fn write_sse_frame<T>(transport: &mut T, name: &str, data: &str) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let mut frame = String::with_capacity(name.len() + data.len() + 16);
    frame.push_str("event: ");
    frame.push_str(name);
    frame.push('\n');
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');

    transport.write_all(frame.as_bytes()).await?;
    transport.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use riptide_router::Response;

    #[tokio::test]
    async fn response_carries_length_and_connection_headers() {
        let mut wire = Vec::new();
        let response = Response::text("hello").with_header("x-test", "1");
        write_response(&mut wire, &response, true).await.unwrap();

        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("x-test: 1\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn status_only_response_has_empty_body() {
        let mut wire = Vec::new();
        write_response(&mut wire, &Response::status(Status::NoContent), false)
            .await
            .unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("content-length: 0\r\n"));
        assert!(text.contains("connection: keep-alive\r\n"));
    }

    #[tokio::test]
    async fn sse_frames_split_multiline_data() {
        let mut wire = Vec::new();
        write_sse_frame(&mut wire, "tick", "line1\nline2").await.unwrap();
        assert_eq!(
            String::from_utf8(wire).unwrap(),
            "event: tick\ndata: line1\ndata: line2\n\n"
        );
    }
}
