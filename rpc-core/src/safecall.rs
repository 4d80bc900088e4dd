use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::context::{is_deadline_exceeded, Context};
use crate::error::{ProcedureFailed, Result, RpcError};
use crate::handler::{OnewayHandler, UnaryHandler};
use crate::request::Request;
use crate::transport::ResponseWriter;

/// Runs `handle` under panic containment, translating a caught panic or a
/// handler-observed deadline into the right [`RpcError`] shape. This is the
/// sole place where a panic crossing the handler boundary is converted to
/// an error: transports may rely on never seeing one escape.
async fn safe_call<F, Fut>(
    ctx: &Context,
    caller: &str,
    service: &str,
    procedure: &str,
    run: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let start = Instant::now();

    let outcome = AssertUnwindSafe(run()).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(translate_handler_error(
            ctx, caller, service, procedure, start, err,
        )),
        Err(panic) => {
            let message = panic_message(&panic);
            tracing::error!(service, procedure, caller, %message, "handler panicked");
            Err(RpcError::Unexpected(ProcedureFailed::new(
                service,
                procedure,
                format!("panic: {message}"),
            )))
        }
    }
}

/// Apply the deadline-substitution and classification rules from §4.4/§4.2:
/// a handler error that is really "my deadline expired" becomes
/// [`RpcError::HandlerTimeout`]; `BadRequest`/`Unexpected`/`HandlerTimeout`
/// otherwise survive unchanged; anything else (a raw transport or encoding
/// error bubbling out of a handler) is wrapped as `Unexpected`.
fn translate_handler_error(
    ctx: &Context,
    caller: &str,
    service: &str,
    procedure: &str,
    start: Instant,
    err: RpcError,
) -> RpcError {
    if ctx.is_expired() && error_is_deadline_sentinel(&err) {
        return RpcError::HandlerTimeout(crate::error::HandlerTimeoutError {
            caller: caller.to_string(),
            service: service.to_string(),
            procedure: procedure.to_string(),
            elapsed: start.elapsed(),
        });
    }

    match err {
        RpcError::BadRequest(_) | RpcError::Unexpected(_) | RpcError::HandlerTimeout(_) => err,
        RpcError::Transport(_) | RpcError::Encoding(_) => {
            RpcError::Unexpected(ProcedureFailed::new(service, procedure, Box::new(err)))
        }
    }
}

fn error_is_deadline_sentinel(err: &RpcError) -> bool {
    match err {
        RpcError::Unexpected(inner) => is_deadline_exceeded(inner.cause.as_ref()),
        RpcError::Transport(cause) => is_deadline_exceeded(cause.as_ref()),
        _ => false,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Dispatch one unary inbound call through panic/timeout containment.
pub async fn safe_call_unary(
    ctx: &Context,
    req: Request,
    handler: Arc<dyn UnaryHandler>,
    writer: &mut dyn ResponseWriter,
) -> Result<()> {
    let caller = req.caller.clone();
    let service = req.service.clone();
    let procedure = req.procedure.clone();

    safe_call(ctx, &caller, &service, &procedure, move || {
        handler.handle(ctx, req, writer)
    })
    .await
}

/// Dispatch one oneway inbound call through panic/timeout containment.
pub async fn safe_call_oneway(
    ctx: &Context,
    req: Request,
    handler: Arc<dyn OnewayHandler>,
) -> Result<()> {
    let caller = req.caller.clone();
    let service = req.service.clone();
    let procedure = req.procedure.clone();

    safe_call(ctx, &caller, &service, &procedure, move || {
        handler.handle_oneway(ctx, req)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeadlineExceeded;
    use crate::response::Response;
    use crate::transport::ResponseWriter as _;
    use async_trait::async_trait;
    use std::time::Duration;

    struct RecordingWriter {
        body: Vec<u8>,
        headers: crate::headers::Headers,
        application_error: bool,
    }

    impl RecordingWriter {
        fn new() -> Self {
            RecordingWriter {
                body: Vec::new(),
                headers: crate::headers::Headers::new(),
                application_error: false,
            }
        }

        fn into_response(self) -> Response {
            Response::new()
                .with_body(self.body)
                .with_headers(self.headers)
        }
    }

    impl ResponseWriter for RecordingWriter {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.body.extend_from_slice(bytes);
            Ok(())
        }

        fn add_headers(&mut self, headers: crate::headers::Headers) {
            for (k, v) in headers.items() {
                self.headers.set(k, v.to_string());
            }
        }

        fn set_application_error(&mut self) {
            self.application_error = true;
        }
    }

    struct Echo;

    #[async_trait]
    impl UnaryHandler for Echo {
        async fn handle(
            &self,
            _ctx: &Context,
            req: Request,
            writer: &mut dyn ResponseWriter,
        ) -> Result<()> {
            writer.write(&req.body)?;
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl UnaryHandler for Panics {
        async fn handle(
            &self,
            _ctx: &Context,
            _req: Request,
            _writer: &mut dyn ResponseWriter,
        ) -> Result<()> {
            panic!("boom");
        }
    }

    struct ReturnsDeadlineExceeded;

    #[async_trait]
    impl UnaryHandler for ReturnsDeadlineExceeded {
        async fn handle(
            &self,
            _ctx: &Context,
            _req: Request,
            _writer: &mut dyn ResponseWriter,
        ) -> Result<()> {
            Err(RpcError::Unexpected(ProcedureFailed::new(
                "kv",
                "GetValue",
                DeadlineExceeded,
            )))
        }
    }

    #[tokio::test]
    async fn happy_path_writes_response() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let req = Request::new("client", "kv", "kv::GetValue", "raw").with_body(&b"foo"[..]);
        let mut writer = RecordingWriter::new();

        safe_call_unary(&ctx, req, Arc::new(Echo), &mut writer)
            .await
            .unwrap();

        assert_eq!(writer.into_response().body.as_ref(), b"foo");
    }

    #[tokio::test]
    async fn panic_is_converted_to_unexpected_with_message() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let req = Request::new("client", "kv", "kv::GetValue", "raw");
        let mut writer = RecordingWriter::new();

        let err = safe_call_unary(&ctx, req, Arc::new(Panics), &mut writer)
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Unexpected(_)));
        assert!(err.to_string().contains("panic"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn expired_deadline_sentinel_becomes_handler_timeout() {
        let ctx = Context::background().with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let req = Request::new("kv-client", "kv", "kv::GetValue", "raw");
        let mut writer = RecordingWriter::new();

        let err = safe_call_unary(&ctx, req, Arc::new(ReturnsDeadlineExceeded), &mut writer)
            .await
            .unwrap_err();

        match err {
            RpcError::HandlerTimeout(e) => {
                assert_eq!(e.caller, "kv-client");
                assert_eq!(e.service, "kv");
                assert_eq!(e.procedure, "GetValue");
            }
            other => panic!("expected HandlerTimeout, got {other:?}"),
        }
    }
}
