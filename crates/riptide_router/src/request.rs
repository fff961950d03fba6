//! Parsed HTTP request representation.
//!
//! The request is a plain value produced by the server's parsing layer and
//! consumed by dispatch and handlers. Header lookup is case-insensitive;
//! header order is preserved as received.

use crate::method::Method;

/// HTTP protocol version of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// A parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Normalized path component of the request target (no query string).
    pub path: String,
    /// Raw query string, if the target carried one.
    pub query: Option<String>,
    /// Protocol version.
    pub version: Version,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Request body bytes (empty when the request carried none).
    pub body: Vec<u8>,
}

impl Request {
    /// Looks up the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the connection should stay open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless the client sent
    /// `Connection: close`; HTTP/1.0 closes unless it asked for
    /// `keep-alive` explicitly.
    pub fn wants_keep_alive(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        match self.version {
            Version::Http11 => !token_in_list(connection, "close"),
            Version::Http10 => token_in_list(connection, "keep-alive"),
        }
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self.header("upgrade").unwrap_or("");
        let connection = self.header("connection").unwrap_or("");
        upgrade.eq_ignore_ascii_case("websocket") && token_in_list(connection, "upgrade")
    }
}

/// Checks for a token in a comma-separated header value, case-insensitively.
fn token_in_list(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}
