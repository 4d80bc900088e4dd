//! Wires a router, a dispatcher, and the in-memory transport together and
//! runs a single `kv::GetValue` call end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rpc_core::channel::IdentityChannel;
use rpc_core::client::{CallOptions, Client};
use rpc_core::context::Context;
use rpc_core::dispatcher::DispatcherBuilder;
use rpc_core::error::Result;
use rpc_core::handler::{HandlerSpec, UnaryHandler};
use rpc_core::middleware::{ChainedUnaryOutbound, ValidatorMiddleware};
use rpc_core::request::Request;
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
        tracing::debug!(key = ?req.body, "looking up value");
        writer.write(b"bar")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let router = Arc::new(Router::new("kv"));
    router.register([RouteEntry::new("GetValue", HandlerSpec::unary(GetValue))]);

    let (inbound, outbound) = rpc_inmemory::in_memory_pair(8);

    // The edge of the outbound stack runs the same validation an inbound
    // call gets from safe-call, so a malformed call never reaches the wire.
    let validated_outbound: Arc<dyn UnaryOutbound> = Arc::new(ChainedUnaryOutbound::new(
        vec![Arc::new(ValidatorMiddleware)],
        outbound,
    ));

    let dispatcher = DispatcherBuilder::new(router)
        .with_inbound(inbound)
        .with_unary_outbound(validated_outbound.clone())
        .build();
    dispatcher.start().await?;

    let channel = IdentityChannel::unary("kv-client", "kv", validated_outbound);
    let client = Client::new(Box::new(channel), "raw");

    let ctx = Context::background().with_timeout(Duration::from_secs(1));
    let resp = client
        .call(&ctx, "GetValue", b"foo".to_vec(), CallOptions::new())
        .await?;

    println!("response body: {:?}", String::from_utf8_lossy(&resp.body));
    assert_eq!(resp.body.as_ref(), b"bar");

    dispatcher.stop().await?;
    Ok(())
}
