use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BadRequestError, Result, RpcError};
use crate::transport::{OnewayOutbound, UnaryOutbound};

/// Names a caller/service pair and hands out the outbound to use for a
/// given procedure. Selection is synchronous and stateless: it never
/// blocks and never itself performs I/O.
pub trait Channel: Send + Sync {
    fn caller(&self) -> &str;
    fn service(&self) -> &str;
    fn unary_outbound(&self, procedure: &str) -> Result<Arc<dyn UnaryOutbound>>;
    fn oneway_outbound(&self, procedure: &str) -> Result<Arc<dyn OnewayOutbound>>;
}

fn shape_mismatch(service: &str, procedure: &str, requested: &'static str) -> RpcError {
    RpcError::BadRequest(BadRequestError::OutboundShapeMismatch {
        service: service.to_string(),
        procedure: procedure.to_string(),
        requested,
    })
}

/// Always vends the same fixed outbound, independent of procedure. Used by
/// simple clients that talk to a single outbound of one shape.
pub struct IdentityChannel {
    caller: String,
    service: String,
    unary: Option<Arc<dyn UnaryOutbound>>,
    oneway: Option<Arc<dyn OnewayOutbound>>,
}

impl IdentityChannel {
    pub fn unary(caller: impl Into<String>, service: impl Into<String>, outbound: Arc<dyn UnaryOutbound>) -> Self {
        IdentityChannel {
            caller: caller.into(),
            service: service.into(),
            unary: Some(outbound),
            oneway: None,
        }
    }

    pub fn oneway(caller: impl Into<String>, service: impl Into<String>, outbound: Arc<dyn OnewayOutbound>) -> Self {
        IdentityChannel {
            caller: caller.into(),
            service: service.into(),
            unary: None,
            oneway: Some(outbound),
        }
    }
}

impl Channel for IdentityChannel {
    fn caller(&self) -> &str {
        &self.caller
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn unary_outbound(&self, procedure: &str) -> Result<Arc<dyn UnaryOutbound>> {
        self.unary
            .clone()
            .ok_or_else(|| shape_mismatch(&self.service, procedure, "unary"))
    }

    fn oneway_outbound(&self, procedure: &str) -> Result<Arc<dyn OnewayOutbound>> {
        self.oneway
            .clone()
            .ok_or_else(|| shape_mismatch(&self.service, procedure, "oneway"))
    }
}

/// Holds a default unary outbound, a default oneway outbound, and
/// per-procedure overrides of either shape. An override registered only
/// for one shape is invisible to a request for the other: asking this
/// channel for a unary outbound on a procedure overridden oneway-only
/// fails with a shape-mismatch error rather than silently falling back to
/// the default.
#[derive(Default)]
pub struct MultiOutboundChannel {
    caller: String,
    service: String,
    default_unary: Option<Arc<dyn UnaryOutbound>>,
    default_oneway: Option<Arc<dyn OnewayOutbound>>,
    unary_overrides: HashMap<String, Arc<dyn UnaryOutbound>>,
    oneway_overrides: HashMap<String, Arc<dyn OnewayOutbound>>,
}

impl MultiOutboundChannel {
    pub fn new(caller: impl Into<String>, service: impl Into<String>) -> Self {
        MultiOutboundChannel {
            caller: caller.into(),
            service: service.into(),
            default_unary: None,
            default_oneway: None,
            unary_overrides: HashMap::new(),
            oneway_overrides: HashMap::new(),
        }
    }

    pub fn with_default_unary(mut self, outbound: Arc<dyn UnaryOutbound>) -> Self {
        self.default_unary = Some(outbound);
        self
    }

    pub fn with_default_oneway(mut self, outbound: Arc<dyn OnewayOutbound>) -> Self {
        self.default_oneway = Some(outbound);
        self
    }

    pub fn with_unary_override(
        mut self,
        procedure: impl Into<String>,
        outbound: Arc<dyn UnaryOutbound>,
    ) -> Self {
        self.unary_overrides.insert(procedure.into(), outbound);
        self
    }

    pub fn with_oneway_override(
        mut self,
        procedure: impl Into<String>,
        outbound: Arc<dyn OnewayOutbound>,
    ) -> Self {
        self.oneway_overrides.insert(procedure.into(), outbound);
        self
    }
}

impl Channel for MultiOutboundChannel {
    fn caller(&self) -> &str {
        &self.caller
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn unary_outbound(&self, procedure: &str) -> Result<Arc<dyn UnaryOutbound>> {
        if let Some(outbound) = self.unary_overrides.get(procedure) {
            return Ok(outbound.clone());
        }
        if self.oneway_overrides.contains_key(procedure) {
            return Err(shape_mismatch(&self.service, procedure, "unary"));
        }
        self.default_unary
            .clone()
            .ok_or_else(|| shape_mismatch(&self.service, procedure, "unary"))
    }

    fn oneway_outbound(&self, procedure: &str) -> Result<Arc<dyn OnewayOutbound>> {
        if let Some(outbound) = self.oneway_overrides.get(procedure) {
            return Ok(outbound.clone());
        }
        if self.unary_overrides.contains_key(procedure) {
            return Err(shape_mismatch(&self.service, procedure, "oneway"));
        }
        self.default_oneway
            .clone()
            .ok_or_else(|| shape_mismatch(&self.service, procedure, "oneway"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::request::Request;
    use crate::response::{Ack, Response};
    use async_trait::async_trait;

    struct FakeUnary(&'static str);

    #[async_trait]
    impl UnaryOutbound for FakeUnary {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn call(&self, _ctx: &Context, _req: Request) -> Result<Response> {
            Ok(Response::new().with_body(self.0.as_bytes().to_vec()))
        }
        async fn stop(&self) {}
    }

    struct FakeOneway;

    #[async_trait]
    impl OnewayOutbound for FakeOneway {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn call_oneway(&self, _ctx: &Context, _req: Request) -> Result<Ack> {
            Ok(Ack)
        }
        async fn stop(&self) {}
    }

    #[test]
    fn identity_channel_always_returns_same_outbound() {
        let channel = IdentityChannel::unary("c", "kv", Arc::new(FakeUnary("default")));
        assert!(channel.unary_outbound("GetValue").is_ok());
        assert!(channel.unary_outbound("SetValue").is_ok());
    }

    #[test]
    fn identity_channel_wrong_shape_is_mismatch() {
        let channel = IdentityChannel::unary("c", "kv", Arc::new(FakeUnary("default")));
        let err = channel.oneway_outbound("GetValue").unwrap_err();
        assert!(matches!(
            err,
            RpcError::BadRequest(BadRequestError::OutboundShapeMismatch { .. })
        ));
    }

    #[test]
    fn multi_outbound_override_takes_precedence_over_default() {
        let channel = MultiOutboundChannel::new("c", "kv")
            .with_default_unary(Arc::new(FakeUnary("default")))
            .with_unary_override("GetValue", Arc::new(FakeUnary("override")));

        assert!(channel.unary_outbound("GetValue").is_ok());
        assert!(channel.unary_outbound("SetValue").is_ok());
    }

    #[test]
    fn multi_outbound_shape_mismatch_on_oneway_only_override() {
        let channel = MultiOutboundChannel::new("c", "kv")
            .with_default_unary(Arc::new(FakeUnary("default")))
            .with_oneway_override("Publish", Arc::new(FakeOneway));

        let err = channel.unary_outbound("Publish").unwrap_err();
        assert!(matches!(
            err,
            RpcError::BadRequest(BadRequestError::OutboundShapeMismatch { .. })
        ));
    }

    #[test]
    fn multi_outbound_no_default_and_no_override_is_mismatch() {
        let channel = MultiOutboundChannel::new("c", "kv");
        assert!(channel.unary_outbound("GetValue").is_err());
    }
}
