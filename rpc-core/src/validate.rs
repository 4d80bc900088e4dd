use std::time::Duration;

use crate::context::Context;
use crate::error::{BadRequestError, Result, RpcError};
use crate::request::Request;

/// Which call shape a request is being validated for: unary calls require a
/// context deadline, oneway calls do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Unary,
    Oneway,
}

/// Check the unconditional required fields plus, for unary calls, the
/// context deadline. Missing fields are reported together, in the order
/// they're checked here, per the humanized-list contract on
/// [`BadRequestError::MissingParameters`].
pub fn validate_request(req: &Request, ctx: &Context, shape: CallShape) -> Result<()> {
    let mut missing = Vec::new();

    if req.service.is_empty() {
        missing.push("Service".to_string());
    }
    if req.procedure.is_empty() {
        missing.push("Procedure".to_string());
    }
    if req.caller.is_empty() {
        missing.push("Caller".to_string());
    }
    if req.encoding.is_empty() {
        missing.push("Encoding".to_string());
    }
    if shape == CallShape::Unary && !ctx.has_deadline() {
        missing.push("TTL".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RpcError::BadRequest(BadRequestError::MissingParameters(
            missing,
        )))
    }
}

/// Parse a decimal-millisecond TTL string and fold it into `ctx`'s deadline.
///
/// An empty string leaves `ctx` untouched; [`validate_request`] will then
/// report the missing TTL on its own. A non-numeric or negative string is
/// reported as `InvalidTtl` immediately, independent of field validation,
/// so the two error families don't mask each other.
pub fn parse_ttl(ctx: &Context, ttl: &str, service: &str, procedure: &str) -> Result<Context> {
    if ttl.is_empty() {
        return Ok(ctx.clone());
    }

    let millis: i64 = ttl.parse().map_err(|_| invalid_ttl(service, procedure, ttl))?;
    if millis < 0 {
        return Err(invalid_ttl(service, procedure, ttl));
    }

    Ok(ctx.with_timeout(Duration::from_millis(millis as u64)))
}

fn invalid_ttl(service: &str, procedure: &str, value: &str) -> RpcError {
    RpcError::BadRequest(BadRequestError::InvalidTtl {
        service: service.to_string(),
        procedure: procedure.to_string(),
        value: value.to_string(),
    })
}
