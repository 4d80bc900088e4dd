use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::headers::Headers;
use crate::request::Request;
use crate::response::{Ack, Response};
use crate::router::Router;
use std::sync::Arc;

/// What a concrete wire transport presents to a handler so it can write a
/// response without the core needing to know how bytes reach the wire.
///
/// Writes may be buffered by the transport until the handler returns;
/// headers must be finalized (via [`ResponseWriter::add_headers`]) before
/// the first call to [`ResponseWriter::write`].
pub trait ResponseWriter: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
    fn add_headers(&mut self, headers: Headers);
    fn set_application_error(&mut self);
}

/// A one-direction server capability bound to a particular wire transport.
///
/// `serve` begins accepting calls against `router` and MUST block while
/// serving; `stop` drains in-flight calls and returns once idle.
#[async_trait]
pub trait Inbound: Send + Sync {
    async fn serve(&self, router: Arc<Router>) -> Result<()>;
    async fn stop(&self);
}

/// A one-direction client capability bound to a particular wire transport,
/// for calls that expect a response.
///
/// `call` must be safe to invoke concurrently with itself from many tasks.
#[async_trait]
pub trait UnaryOutbound: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn call(&self, ctx: &Context, req: Request) -> Result<Response>;
    async fn stop(&self);
}

/// A one-direction client capability for fire-and-forget calls.
#[async_trait]
pub trait OnewayOutbound: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn call_oneway(&self, ctx: &Context, req: Request) -> Result<Ack>;
    async fn stop(&self);
}
