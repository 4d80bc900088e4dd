use bytes::Bytes;

use crate::headers::Headers;

/// The result of a unary call.
///
/// `application_error` is orthogonal to transport/framework errors: a
/// handler can complete successfully (no [`crate::error::RpcError`]) while
/// still marking its result as a domain-level failure, in which case
/// `body` may carry an error payload in whatever shape the encoding
/// defines.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub headers: Headers,
    pub body: Bytes,
    pub application_error: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn mark_application_error(mut self) -> Self {
        self.application_error = true;
        self
    }
}

/// Acknowledgement returned by a oneway call: oneway has no response body,
/// only the fact that the transport accepted the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ack;
