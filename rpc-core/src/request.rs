use bytes::Bytes;

use crate::headers::Headers;

/// The canonical inbound/outbound unit.
///
/// `Body` is a one-shot byte stream: an inbound handler reads it to EOF
/// exactly once, and it must never be buffered by the framework except
/// where middleware explicitly wraps it. Since Rust has no ambient
/// mutable-by-default reference semantics, a `Request` is represented as
/// plain data (per §4.1) and passed by value through the call path;
/// middleware that wants to "substitute the body" simply replaces `body`
/// with a new value.
#[derive(Debug, Clone)]
pub struct Request {
    /// Originating service name.
    pub caller: String,
    /// Target service name.
    pub service: String,
    /// Fully-qualified method identifier, conventionally `<service>::<method>`.
    pub procedure: String,
    /// Opaque tag naming the payload encoding.
    pub encoding: String,
    pub headers: Headers,
    pub shard_key: Option<String>,
    pub routing_key: Option<String>,
    pub routing_delegate: Option<String>,
    pub body: Bytes,
}

impl Request {
    /// Construct a request with empty optional fields and an empty body.
    /// Callers fill in whatever the handshake requires.
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        procedure: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Request {
            caller: caller.into(),
            service: service.into(),
            procedure: procedure.into(),
            encoding: encoding.into(),
            headers: Headers::new(),
            shard_key: None,
            routing_key: None,
            routing_delegate: None,
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}
