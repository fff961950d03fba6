//! HTTP response representation and status codes.

use serde::Serialize;

/// Response status codes used by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    SwitchingProtocols,
    Ok,
    Created,
    NoContent,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    /// Numeric status code.
    pub fn code(&self) -> u16 {
        match self {
            Status::SwitchingProtocols => 101,
            Status::Ok => 200,
            Status::Created => 201,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::PayloadTooLarge => 413,
            Status::InternalServerError => 500,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Canonical reason phrase.
    pub fn reason(&self) -> &'static str {
        match self {
            Status::SwitchingProtocols => "Switching Protocols",
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::InternalServerError => "Internal Server Error",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// An HTTP response under construction.
///
/// Handlers produce these; the session layer serializes them to the wire and
/// owns the `Content-Length` and `Connection` headers.
#[derive(Debug, Clone)]
pub struct Response {
    /// Response status.
    pub status: Status,
    /// Extra headers in emission order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// An empty response with the given status.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A 200 response with a plain-text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: body.into().into_bytes(),
        }
    }

    /// A 200 response with a JSON body serialized from `value`.
    ///
    /// Serialization failures degrade to a 500 with a plain message; the
    /// caller never has to handle a serialization error inline.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status: Status::Ok,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body,
            },
            Err(err) => Self {
                status: Status::InternalServerError,
                headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
                body: format!("response serialization failed: {err}").into_bytes(),
            },
        }
    }

    /// Adds a header, keeping any already present.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the status on this response.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sets_content_type() {
        let response = Response::json(&serde_json::json!({"ok": true}));
        assert_eq!(response.status, Status::Ok);
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k == "content-type" && v == "application/json"));
        assert_eq!(response.body, br#"{"ok":true}"#);
    }

    #[test]
    fn status_codes_match_reasons() {
        assert_eq!(Status::MethodNotAllowed.code(), 405);
        assert_eq!(Status::MethodNotAllowed.reason(), "Method Not Allowed");
        assert_eq!(Status::NotFound.code(), 404);
    }
}
