//! Incremental HTTP/1.1 request parsing.
//!
//! The session keeps one read buffer per connection; `read_request` pulls
//! bytes from the transport until a full head (and body, when one is
//! declared) is buffered, parses it, and drains exactly the consumed bytes
//! so pipelined requests stay intact for the next call.

use crate::error::SessionError;
use riptide_router::{Method, Request, Version};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Limits applied while parsing a request.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    /// Maximum size of the request line plus headers, in bytes.
    pub max_head_bytes: usize,
    /// Maximum declared body size, in bytes.
    pub max_body_bytes: usize,
    /// Maximum number of headers.
    pub max_headers: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_head_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
            max_headers: 100,
        }
    }
}

/// Reads one request from the transport.
///
/// Returns `Ok(None)` on a clean close before the first byte of a new
/// request (the peer ended keep-alive). A close in the middle of a request,
/// or bytes that do not parse, is a [`SessionError::Malformed`]; transport
/// failures surface as [`SessionError::Transport`].
pub async fn read_request<T>(
    transport: &mut T,
    buf: &mut Vec<u8>,
    limits: &ParseLimits,
) -> Result<Option<Request>, SessionError>
where
    T: AsyncRead + Unpin,
{
    let head_end = loop {
        if let Some(pos) = find_head_end(buf) {
            break pos;
        }
        if buf.len() > limits.max_head_bytes {
            return Err(SessionError::Malformed(format!(
                "request head exceeds {} bytes",
                limits.max_head_bytes
            )));
        }
        let read = transport.read_buf(buf).await?;
        if read == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(SessionError::Malformed(
                "connection closed mid-request".to_string(),
            ));
        }
    };

    if head_end > limits.max_head_bytes {
        return Err(SessionError::Malformed(format!(
            "request head exceeds {} bytes",
            limits.max_head_bytes
        )));
    }

    let (method, path, query, version, headers) = parse_head(&buf[..head_end], limits)?;

    let body_len = content_length(&headers)?;
    if body_len > limits.max_body_bytes {
        return Err(SessionError::Malformed(format!(
            "request body of {} bytes exceeds {} byte limit",
            body_len, limits.max_body_bytes
        )));
    }

    let total = head_end + 4 + body_len;
    while buf.len() < total {
        let read = transport.read_buf(buf).await?;
        if read == 0 {
            return Err(SessionError::Malformed(
                "connection closed mid-body".to_string(),
            ));
        }
    }

    let body = buf[head_end + 4..total].to_vec();
    buf.drain(..total);

    Ok(Some(Request {
        method,
        path,
        query,
        version,
        headers,
        body,
    }))
}

/// Finds the end of the request head: the offset of the `\r\n\r\n`
/// separator, if fully buffered.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

type ParsedHead = (Method, String, Option<String>, Version, Vec<(String, String)>);

fn parse_head(head: &[u8], limits: &ParseLimits) -> Result<ParsedHead, SessionError> {
    let head = std::str::from_utf8(head)
        .map_err(|_| SessionError::Malformed("request head is not valid UTF-8".to_string()))?;

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| SessionError::Malformed("empty request head".to_string()))?;

    let mut parts = request_line.split(' ');
    let method_token = parts
        .next()
        .ok_or_else(|| SessionError::Malformed("missing request method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| SessionError::Malformed("missing request target".to_string()))?;
    let version_token = parts
        .next()
        .ok_or_else(|| SessionError::Malformed("missing HTTP version".to_string()))?;
    if parts.next().is_some() {
        return Err(SessionError::Malformed(
            "malformed request line".to_string(),
        ));
    }

    let method: Method = method_token
        .parse()
        .map_err(|err| SessionError::Malformed(format!("{err}")))?;

    let version = match version_token {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        other => {
            return Err(SessionError::Malformed(format!(
                "unsupported HTTP version '{other}'"
            )))
        }
    };

    if !target.starts_with('/') {
        return Err(SessionError::Malformed(format!(
            "unsupported request target '{target}'"
        )));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if headers.len() >= limits.max_headers {
            return Err(SessionError::Malformed(format!(
                "more than {} headers",
                limits.max_headers
            )));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| SessionError::Malformed(format!("malformed header line '{line}'")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok((method, path, query, version, headers))
}

fn content_length(headers: &[(String, String)]) -> Result<usize, SessionError> {
    if let Some((_, value)) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("transfer-encoding"))
    {
        if !value.eq_ignore_ascii_case("identity") {
            return Err(SessionError::Malformed(format!(
                "transfer-encoding '{value}' not supported"
            )));
        }
    }

    match headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value.trim().parse::<usize>().map_err(|_| {
            SessionError::Malformed(format!("invalid content-length '{value}'"))
        }),
        None => Ok(0),
    }
}
