use std::fmt;

/// All error types produced by the dispatch core.
///
/// Error kind is discoverable by structural inspection (matching on the
/// variant), never by string matching on [`RpcError`]'s rendered message.
#[derive(Debug)]
pub enum RpcError {
    /// The request was syntactically or semantically invalid.
    BadRequest(BadRequestError),

    /// A handler failed for a reason that is not the caller's fault.
    Unexpected(ProcedureFailed),

    /// The request context's deadline expired inside the handler; this is
    /// reported distinctly from a generic [`RpcError::Unexpected`] so
    /// caller-observed timeouts and handler-observed timeouts don't look
    /// the same on the wire.
    HandlerTimeout(HandlerTimeoutError),

    /// An encode/decode failure raised by encoding-layer code.
    Encoding(EncodingError),

    /// Raised unchanged by the wire layer; the core never interprets it.
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::BadRequest(e) => write!(f, "bad request: {e}"),
            RpcError::Unexpected(e) => write!(f, "unexpected error: {e}"),
            RpcError::HandlerTimeout(e) => write!(f, "{e}"),
            RpcError::Encoding(e) => write!(f, "{e}"),
            RpcError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Unexpected(e) => Some(&e.cause),
            RpcError::Encoding(e) => Some(e.cause.as_ref()),
            RpcError::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Convenience type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Bad-request sub-kinds. Kept as a nested enum (rather than flattening
/// into [`RpcError`]) so call sites can match on "is this a bad request"
/// without also matching every bad-request shape.
#[derive(Debug)]
pub enum BadRequestError {
    /// One or more required fields were empty. Names are listed in the
    /// order the validator checks them.
    MissingParameters(Vec<String>),

    /// A TTL string was empty, non-numeric, or negative.
    InvalidTtl {
        service: String,
        procedure: String,
        value: String,
    },

    /// `(service, procedure)` has no registered handler.
    UnrecognizedProcedure { service: String, procedure: String },

    /// A channel's per-procedure override exists but does not match the
    /// call shape being requested (e.g. a unary call against an override
    /// that only provides a oneway outbound).
    OutboundShapeMismatch {
        service: String,
        procedure: String,
        requested: &'static str,
    },
}

impl fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadRequestError::MissingParameters(names) => {
                write!(f, "missing parameters: {}", humanize_list(names))
            }
            BadRequestError::InvalidTtl {
                service,
                procedure,
                value,
            } => write!(
                f,
                "invalid TTL {value:?} for procedure {procedure} of service {service}"
            ),
            BadRequestError::UnrecognizedProcedure { service, procedure } => {
                write!(f, "unrecognized procedure {procedure:?} for service {service:?}")
            }
            BadRequestError::OutboundShapeMismatch {
                service,
                procedure,
                requested,
            } => write!(
                f,
                "no {requested} outbound available for procedure {procedure:?} of service {service:?}"
            ),
        }
    }
}

/// Joins field names the way a person would write them: "a", "a and b",
/// "a, b, and c".
pub(crate) fn humanize_list(names: &[String]) -> String {
    match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        2 => format!("{} and {}", names[0], names[1]),
        _ => {
            let (last, rest) = names.split_last().expect("checked len > 2");
            format!("{}, and {last}", rest.join(", "))
        }
    }
}

/// The inner cause carried by [`RpcError::Unexpected`]: identifies which
/// endpoint failed, distinct from the cause itself (a panic payload or an
/// I/O error surfaced by the handler).
#[derive(Debug)]
pub struct ProcedureFailed {
    pub service: String,
    pub procedure: String,
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for ProcedureFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "procedure {} of service {} failed: {}",
            self.procedure, self.service, self.cause
        )
    }
}

impl ProcedureFailed {
    pub fn new(
        service: impl Into<String>,
        procedure: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            service: service.into(),
            procedure: procedure.into(),
            cause: cause.into(),
        }
    }
}

#[derive(Debug)]
pub struct HandlerTimeoutError {
    pub caller: String,
    pub service: String,
    pub procedure: String,
    pub elapsed: std::time::Duration,
}

impl fmt::Display for HandlerTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "call to procedure {} of service {} from caller {} timed out in handler after {:?}",
            self.procedure, self.service, self.caller, self.elapsed
        )
    }
}

/// Which message a [`EncodingError`] was encoding or decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSide {
    Request,
    Response,
}

impl fmt::Display for MessageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageSide::Request => "request",
            MessageSide::Response => "response",
        })
    }
}

/// Which part of the message a [`EncodingError`] was encoding or decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePart {
    Headers,
    Body,
}

impl fmt::Display for MessagePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessagePart::Headers => "headers",
            MessagePart::Body => "body",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOp {
    Encode,
    Decode,
}

impl fmt::Display for CodecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodecOp::Encode => "encode",
            CodecOp::Decode => "decode",
        })
    }
}

/// One of the four concrete encoding-layer error shapes: crossing
/// (request|response) with (headers|body). `op` records whether the
/// failure happened while encoding or decoding; it is metadata set by the
/// call site, not a fifth axis.
#[derive(Debug)]
pub struct EncodingError {
    pub op: CodecOp,
    pub side: MessageSide,
    pub part: MessagePart,
    pub service: String,
    pub procedure: String,
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {} {} for procedure {} of service {}: {}",
            self.op, self.side, self.part, self.procedure, self.service, self.cause
        )
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport(Box::new(err))
    }
}
