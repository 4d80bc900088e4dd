use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::request::Request;
use crate::transport::ResponseWriter;

/// A registered unary endpoint: receives a request, writes a response
/// through `writer`, and returns an error if it could not complete.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &Context,
        req: Request,
        writer: &mut dyn ResponseWriter,
    ) -> Result<()>;
}

/// A registered oneway endpoint: receives a request, produces no response.
#[async_trait]
pub trait OnewayHandler: Send + Sync {
    async fn handle_oneway(&self, ctx: &Context, req: Request) -> Result<()>;
}

/// A tagged variant over the two handler shapes a registry entry can hold.
///
/// There is no open-ended "any handler" variant: the framework models
/// handler kinds as this fixed set rather than runtime type-switching,
/// per the dynamic-dispatch design note.
#[derive(Clone)]
pub enum HandlerSpec {
    Unary(Arc<dyn UnaryHandler>),
    Oneway(Arc<dyn OnewayHandler>),
}

impl HandlerSpec {
    pub fn unary(handler: impl UnaryHandler + 'static) -> Self {
        HandlerSpec::Unary(Arc::new(handler))
    }

    pub fn oneway(handler: impl OnewayHandler + 'static) -> Self {
        HandlerSpec::Oneway(Arc::new(handler))
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, HandlerSpec::Unary(_))
    }

    pub fn is_oneway(&self) -> bool {
        matches!(self, HandlerSpec::Oneway(_))
    }
}
