use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::request::Request;
use crate::response::{Ack, Response};
use crate::transport::{OnewayOutbound, UnaryOutbound};
use crate::validate::{validate_request, CallShape};

/// One link in a unary outbound chain. `next` is whatever remains of the
/// chain (either another middleware or the underlying transport), so a
/// middleware never needs to know its own position.
///
/// Every middleware MUST eventually resolve to an error or a response;
/// calling `next` zero or more times is allowed (a cache middleware may
/// never call it, a retry middleware may call it more than once).
#[async_trait]
pub trait UnaryOutboundMiddleware: Send + Sync {
    async fn call(&self, ctx: &Context, req: Request, next: &dyn UnaryOutbound) -> Result<Response>;
}

#[async_trait]
pub trait OnewayOutboundMiddleware: Send + Sync {
    async fn call_oneway(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn OnewayOutbound,
    ) -> Result<Ack>;
}

/// Pass-through middleware: invokes `next` unchanged. Building block and
/// identity element for composing chains.
pub struct NopUnary;

#[async_trait]
impl UnaryOutboundMiddleware for NopUnary {
    async fn call(&self, ctx: &Context, req: Request, next: &dyn UnaryOutbound) -> Result<Response> {
        next.call(ctx, req).await
    }
}

pub struct NopOneway;

#[async_trait]
impl OnewayOutboundMiddleware for NopOneway {
    async fn call_oneway(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn OnewayOutbound,
    ) -> Result<Ack> {
        next.call_oneway(ctx, req).await
    }
}

/// Runs [`validate_request`] before forwarding the call, so the same check
/// used on the inbound dispatch path also guards the outbound edge.
pub struct ValidatorMiddleware;

#[async_trait]
impl UnaryOutboundMiddleware for ValidatorMiddleware {
    async fn call(&self, ctx: &Context, req: Request, next: &dyn UnaryOutbound) -> Result<Response> {
        validate_request(&req, ctx, CallShape::Unary)?;
        next.call(ctx, req).await
    }
}

#[async_trait]
impl OnewayOutboundMiddleware for ValidatorMiddleware {
    async fn call_oneway(
        &self,
        ctx: &Context,
        req: Request,
        next: &dyn OnewayOutbound,
    ) -> Result<Ack> {
        validate_request(&req, ctx, CallShape::Oneway)?;
        next.call_oneway(ctx, req).await
    }
}

/// The remaining suffix of a unary chain, viewed as an outbound itself.
/// Built fresh for every call so that a chain is never mutated by calling
/// it; concurrent calls share the same `ChainedUnaryOutbound` safely.
struct UnaryLink<'a> {
    middlewares: &'a [Arc<dyn UnaryOutboundMiddleware>],
    terminal: &'a dyn UnaryOutbound,
}

#[async_trait]
impl<'a> UnaryOutbound for UnaryLink<'a> {
    async fn start(&self) -> Result<()> {
        self.terminal.start().await
    }

    async fn call(&self, ctx: &Context, req: Request) -> Result<Response> {
        match self.middlewares.split_first() {
            Some((head, rest)) => {
                let next = UnaryLink {
                    middlewares: rest,
                    terminal: self.terminal,
                };
                head.call(ctx, req, &next).await
            }
            None => self.terminal.call(ctx, req).await,
        }
    }

    async fn stop(&self) {
        self.terminal.stop().await
    }
}

struct OnewayLink<'a> {
    middlewares: &'a [Arc<dyn OnewayOutboundMiddleware>],
    terminal: &'a dyn OnewayOutbound,
}

#[async_trait]
impl<'a> OnewayOutbound for OnewayLink<'a> {
    async fn start(&self) -> Result<()> {
        self.terminal.start().await
    }

    async fn call_oneway(&self, ctx: &Context, req: Request) -> Result<Ack> {
        match self.middlewares.split_first() {
            Some((head, rest)) => {
                let next = OnewayLink {
                    middlewares: rest,
                    terminal: self.terminal,
                };
                head.call_oneway(ctx, req, &next).await
            }
            None => self.terminal.call_oneway(ctx, req).await,
        }
    }

    async fn stop(&self) {
        self.terminal.stop().await
    }
}

/// A unary outbound built by wrapping `terminal` with `m1, m2, ..., mN` in
/// declared order: `m1` runs first and decides whether/how to invoke `m2`,
/// and so on, down to `terminal`.
pub struct ChainedUnaryOutbound {
    middlewares: Vec<Arc<dyn UnaryOutboundMiddleware>>,
    terminal: Arc<dyn UnaryOutbound>,
}

impl ChainedUnaryOutbound {
    pub fn new(
        middlewares: Vec<Arc<dyn UnaryOutboundMiddleware>>,
        terminal: Arc<dyn UnaryOutbound>,
    ) -> Self {
        ChainedUnaryOutbound {
            middlewares,
            terminal,
        }
    }
}

#[async_trait]
impl UnaryOutbound for ChainedUnaryOutbound {
    async fn start(&self) -> Result<()> {
        self.terminal.start().await
    }

    async fn call(&self, ctx: &Context, req: Request) -> Result<Response> {
        let link = UnaryLink {
            middlewares: &self.middlewares,
            terminal: self.terminal.as_ref(),
        };
        link.call(ctx, req).await
    }

    async fn stop(&self) {
        self.terminal.stop().await
    }
}

pub struct ChainedOnewayOutbound {
    middlewares: Vec<Arc<dyn OnewayOutboundMiddleware>>,
    terminal: Arc<dyn OnewayOutbound>,
}

impl ChainedOnewayOutbound {
    pub fn new(
        middlewares: Vec<Arc<dyn OnewayOutboundMiddleware>>,
        terminal: Arc<dyn OnewayOutbound>,
    ) -> Self {
        ChainedOnewayOutbound {
            middlewares,
            terminal,
        }
    }
}

#[async_trait]
impl OnewayOutbound for ChainedOnewayOutbound {
    async fn start(&self) -> Result<()> {
        self.terminal.start().await
    }

    async fn call_oneway(&self, ctx: &Context, req: Request) -> Result<Ack> {
        let link = OnewayLink {
            middlewares: &self.middlewares,
            terminal: self.terminal.as_ref(),
        };
        link.call_oneway(ctx, req).await
    }

    async fn stop(&self) {
        self.terminal.stop().await
    }
}
