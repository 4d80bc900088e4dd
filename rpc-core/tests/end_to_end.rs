//! End-to-end scenarios driven through a real channel boundary
//! (`rpc-inmemory`) plus the outbound chain retry scenario, which needs no
//! transport at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rpc_core::channel::IdentityChannel;
use rpc_core::client::{CallOptions, Client};
use rpc_core::context::Context;
use rpc_core::dispatcher::DispatcherBuilder;
use rpc_core::error::{ProcedureFailed, Result, RpcError};
use rpc_core::handler::{HandlerSpec, UnaryHandler};
use rpc_core::middleware::{ChainedUnaryOutbound, UnaryOutboundMiddleware, ValidatorMiddleware};
use rpc_core::request::Request;
use rpc_core::response::Response;
use rpc_core::router::{RouteEntry, Router};
use rpc_core::transport::{ResponseWriter, UnaryOutbound};

struct GetValue;

#[async_trait]
impl UnaryHandler for GetValue {
    async fn handle(
        &self,
        _ctx: &Context,
        req: Request,
        writer: &mut dyn ResponseWriter,
    ) -> Result<()> {
        assert_eq!(req.body.as_ref(), b"foo");
        writer.write(b"bar")?;
        Ok(())
    }
}

/// S1: a client call crossing the in-memory channel boundary reaches a
/// registered handler and the response comes back unmodified. The outbound
/// is wrapped in `ValidatorMiddleware`, so edge validation runs on the path
/// actually exercised here rather than only in isolated unit tests.
#[tokio::test]
async fn s1_kv_get_value_round_trips_through_the_channel() {
    let router = Arc::new(Router::new("kv"));
    router.register([RouteEntry::new("GetValue", HandlerSpec::unary(GetValue))]);

    let (inbound, outbound) = rpc_inmemory::in_memory_pair(8);
    let validated_outbound: Arc<dyn UnaryOutbound> = Arc::new(ChainedUnaryOutbound::new(
        vec![Arc::new(ValidatorMiddleware)],
        outbound,
    ));
    let dispatcher = DispatcherBuilder::new(router)
        .with_inbound(inbound)
        .with_unary_outbound(validated_outbound.clone())
        .build();
    dispatcher.start().await.unwrap();

    let channel = IdentityChannel::unary("kv-client", "kv", validated_outbound);
    let client = Client::new(Box::new(channel), "raw");

    let ctx = Context::background().with_timeout(Duration::from_secs(1));
    let resp = client
        .call(&ctx, "GetValue", b"foo".to_vec(), CallOptions::new())
        .await
        .unwrap();

    assert_eq!(resp.body.as_ref(), b"bar");
    assert!(!resp.application_error);

    dispatcher.stop().await.unwrap();
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

/// S3: a handler panic crossing the channel boundary still comes back as
/// an `Unexpected` error naming the panic and its payload, never as a
/// crashed task or a dropped reply.
#[tokio::test]
async fn s3_panicking_handler_becomes_unexpected_error_across_the_channel() {
    let router = Arc::new(Router::new("kv"));
    router.register([RouteEntry::new("GetValue", HandlerSpec::unary(Panics))]);

    let (inbound, outbound) = rpc_inmemory::in_memory_pair(8);
    let validated_outbound: Arc<dyn UnaryOutbound> = Arc::new(ChainedUnaryOutbound::new(
        vec![Arc::new(ValidatorMiddleware)],
        outbound,
    ));
    let dispatcher = DispatcherBuilder::new(router)
        .with_inbound(inbound)
        .with_unary_outbound(validated_outbound.clone())
        .build();
    dispatcher.start().await.unwrap();

    let channel = IdentityChannel::unary("kv-client", "kv", validated_outbound);
    let client = Client::new(Box::new(channel), "raw");

    let ctx = Context::background().with_timeout(Duration::from_secs(1));
    let err = client
        .call(&ctx, "GetValue", b"foo".to_vec(), CallOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Unexpected(_)));
    assert!(err.to_string().contains("panic"));
    assert!(err.to_string().contains("boom"));

    dispatcher.stop().await.unwrap();
}

struct CountBefore {
    n: Arc<AtomicUsize>,
}

#[async_trait]
impl UnaryOutboundMiddleware for CountBefore {
    async fn call(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn UnaryOutbound,
    ) -> Result<Response> {
        self.n.fetch_add(1, Ordering::SeqCst);
        next.call(ctx, req).await
    }
}

struct RetryOnceOnError;

#[async_trait]
impl UnaryOutboundMiddleware for RetryOnceOnError {
    async fn call(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn UnaryOutbound,
    ) -> Result<Response> {
        match next.call(ctx, req.clone()).await {
            Ok(resp) => Ok(resp),
            Err(_) => next.call(ctx, req).await,
        }
    }
}

struct CountAfter {
    n: Arc<AtomicUsize>,
}

#[async_trait]
impl UnaryOutboundMiddleware for CountAfter {
    async fn call(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn UnaryOutbound,
    ) -> Result<Response> {
        self.n.fetch_add(1, Ordering::SeqCst);
        next.call(ctx, req).await
    }
}

/// Fails on its first call, then succeeds on every call after that.
struct FailsOnceThenSucceeds {
    calls: AtomicUsize,
}

#[async_trait]
impl UnaryOutbound for FailsOnceThenSucceeds {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn call(&self, _ctx: &Context, _req: Request) -> Result<Response> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst);
        if call_number == 0 {
            Err(RpcError::Unexpected(ProcedureFailed::new(
                "kv",
                "GetValue",
                "transient failure",
            )))
        } else {
            Ok(Response::new().with_body(&b"second-response"[..]))
        }
    }

    async fn stop(&self) {}
}

/// S6: `[count_before, retry_once_on_error, count_after]` around an
/// outbound that fails once then succeeds. `count_before` is invoked once
/// per outer call (one client call in, regardless of retries inside);
/// `count_after`, sitting between the retry middleware and the terminal
/// outbound, is invoked once per underlying attempt: twice.
#[tokio::test]
async fn s6_retry_chain_retries_once_and_surfaces_the_second_response() {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let terminal = Arc::new(FailsOnceThenSucceeds {
        calls: AtomicUsize::new(0),
    });

    let chain = ChainedUnaryOutbound::new(
        vec![
            Arc::new(CountBefore { n: before.clone() }),
            Arc::new(RetryOnceOnError),
            Arc::new(CountAfter { n: after.clone() }),
        ],
        terminal,
    );

    let ctx = Context::background().with_timeout(Duration::from_secs(1));
    let req = Request::new("kv-client", "kv", "GetValue", "raw");
    let resp = chain.call(&ctx, req).await.unwrap();

    assert_eq!(resp.body.as_ref(), b"second-response");
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 2);
}
