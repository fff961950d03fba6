//! HTTP/1.1 wire handling: incremental request parsing and response
//! serialization over a byte-stream transport.

pub mod parser;
pub mod writer;

pub use parser::{read_request, ParseLimits};
pub use writer::{write_response, write_sse_frame, write_sse_preamble};
