use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{BadRequestError, RpcError};
use crate::headers::Headers;

/// Sentinel returned when a [`Context`]'s deadline has passed. The
/// safe-call wrapper matches on this type specifically (via
/// [`std::error::Error`] downcasting) to distinguish "the handler noticed
/// its own deadline" from any other handler failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineExceeded;

impl fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("context deadline exceeded")
    }
}

impl std::error::Error for DeadlineExceeded {}

/// Returns `true` if `err` is (or wraps, one level deep) a
/// [`DeadlineExceeded`] sentinel.
pub fn is_deadline_exceeded(err: &(dyn std::error::Error + 'static)) -> bool {
    err.downcast_ref::<DeadlineExceeded>().is_some()
}

/// Per-call metadata attached to the request context: the deadline that
/// every unary suspension point honors, the headers a middleware wants to
/// write or has read back, routing hints, and a tracing span that follows
/// the call across middleware boundaries.
///
/// `Context` is cheap to clone (an `Arc` of its state) so that middleware
/// wrapping one context to shorten its deadline doesn't need to thread the
/// original through by reference.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    deadline: Option<Instant>,
    span: tracing::Span,
    shard_key: Option<String>,
    routing_key: Option<String>,
    routing_delegate: Option<String>,
    headers_out: Mutex<Headers>,
    headers_in: Mutex<Headers>,
    baggage: Mutex<HashMap<String, String>>,
}

impl Context {
    /// A context with no deadline and an empty span. Used by oneway calls,
    /// which do not require a deadline, and as the root for building up a
    /// call's metadata.
    pub fn background() -> Self {
        Context {
            inner: Arc::new(Inner {
                deadline: None,
                span: tracing::Span::none(),
                shard_key: None,
                routing_key: None,
                routing_delegate: None,
                headers_out: Mutex::new(Headers::new()),
                headers_in: Mutex::new(Headers::new()),
                baggage: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Derive a context with a deadline clamped to `now + timeout`. A
    /// middleware may call this to shorten an already-set deadline; the
    /// caller is responsible for not lengthening it (see
    /// [`Context::with_deadline_no_later_than`]).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline_no_later_than(Instant::now() + timeout)
    }

    /// Derive a context whose deadline is the earlier of `self`'s current
    /// deadline (if any) and `deadline`. This is how the framework enforces
    /// "middleware may shorten the deadline but not lengthen it": nothing
    /// in this API lets a deadline move later.
    pub fn with_deadline_no_later_than(&self, deadline: Instant) -> Self {
        let clamped = match self.inner.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Context {
            inner: Arc::new(Inner {
                deadline: Some(clamped),
                span: self.inner.span.clone(),
                shard_key: self.inner.shard_key.clone(),
                routing_key: self.inner.routing_key.clone(),
                routing_delegate: self.inner.routing_delegate.clone(),
                headers_out: Mutex::new(self.inner.headers_out.lock().clone()),
                headers_in: Mutex::new(self.inner.headers_in.lock().clone()),
                baggage: Mutex::new(self.inner.baggage.lock().clone()),
            }),
        }
    }

    pub fn with_span(&self, span: tracing::Span) -> Self {
        Context {
            inner: Arc::new(Inner {
                span,
                deadline: self.inner.deadline,
                shard_key: self.inner.shard_key.clone(),
                routing_key: self.inner.routing_key.clone(),
                routing_delegate: self.inner.routing_delegate.clone(),
                headers_out: Mutex::new(self.inner.headers_out.lock().clone()),
                headers_in: Mutex::new(self.inner.headers_in.lock().clone()),
                baggage: Mutex::new(self.inner.baggage.lock().clone()),
            }),
        }
    }

    pub fn with_shard_key(&self, key: impl Into<String>) -> Self {
        Context {
            inner: Arc::new(Inner {
                shard_key: Some(key.into()),
                deadline: self.inner.deadline,
                span: self.inner.span.clone(),
                routing_key: self.inner.routing_key.clone(),
                routing_delegate: self.inner.routing_delegate.clone(),
                headers_out: Mutex::new(self.inner.headers_out.lock().clone()),
                headers_in: Mutex::new(self.inner.headers_in.lock().clone()),
                baggage: Mutex::new(self.inner.baggage.lock().clone()),
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn has_deadline(&self) -> bool {
        self.inner.deadline.is_some()
    }

    pub fn span(&self) -> &tracing::Span {
        &self.inner.span
    }

    pub fn shard_key(&self) -> Option<&str> {
        self.inner.shard_key.as_deref()
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.inner.routing_key.as_deref()
    }

    pub fn routing_delegate(&self) -> Option<&str> {
        self.inner.routing_delegate.as_deref()
    }

    pub fn headers_out(&self) -> Headers {
        self.inner.headers_out.lock().clone()
    }

    pub fn set_header_out(&self, name: &str, value: impl Into<String>) {
        self.inner.headers_out.lock().set(name, value);
    }

    pub fn headers_in(&self) -> Headers {
        self.inner.headers_in.lock().clone()
    }

    pub fn set_headers_in(&self, headers: Headers) {
        *self.inner.headers_in.lock() = headers;
    }

    pub fn baggage_get(&self, key: &str) -> Option<String> {
        self.inner.baggage.lock().get(key).cloned()
    }

    pub fn baggage_set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.baggage.lock().insert(key.into(), value.into());
    }

    /// True once `deadline` has passed. A context with no deadline is
    /// never considered expired.
    pub fn is_expired(&self) -> bool {
        matches!(self.inner.deadline, Some(d) if d <= Instant::now())
    }

    /// Resolves once the deadline passes. A context with no deadline never
    /// resolves, modeling an uncancellable wait; callers combine this with
    /// their own work via `tokio::select!`.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// The error to report when `self` has no deadline and an operation
    /// requires one to bound its wait (e.g. the round-robin chooser).
    pub fn no_deadline_error(component: &str) -> RpcError {
        RpcError::BadRequest(BadRequestError::MissingParameters(vec![format!(
            "{component} requires a context deadline"
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_has_no_deadline() {
        let ctx = Context::background();
        assert!(!ctx.has_deadline());
        assert!(!ctx.is_expired());
    }

    #[tokio::test]
    async fn with_timeout_sets_deadline_in_future() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(ctx.has_deadline());
        assert!(!ctx.is_expired());
    }

    #[test]
    fn deadline_no_later_than_clamps_down_not_up() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let original_deadline = ctx.deadline().unwrap();
        let later = original_deadline + Duration::from_secs(60);
        let clamped = ctx.with_deadline_no_later_than(later);
        assert_eq!(clamped.deadline().unwrap(), original_deadline);
    }

    #[test]
    fn headers_out_round_trip() {
        let ctx = Context::background();
        ctx.set_header_out("x-trace", "abc");
        assert_eq!(ctx.headers_out().get("x-trace"), Some("abc"));
    }

    #[test]
    fn deadline_exceeded_sentinel_is_detected() {
        let err: Box<dyn std::error::Error> = Box::new(DeadlineExceeded);
        assert!(is_deadline_exceeded(err.as_ref()));

        let other: Box<dyn std::error::Error> = Box::new(std::io::Error::other("boom"));
        assert!(!is_deadline_exceeded(other.as_ref()));
    }
}
