use bytes::Bytes;

use crate::channel::Channel;
use crate::context::Context;
use crate::error::Result;
use crate::headers::Headers;
use crate::request::Request;
use crate::response::{Ack, Response};

/// Per-call knobs a caller may attach before a request is validated and
/// dispatched: headers, shard key, routing key, and routing delegate.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub headers: Headers,
    pub shard_key: Option<String>,
    pub routing_key: Option<String>,
    pub routing_delegate: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_shard_key(mut self, key: impl Into<String>) -> Self {
        self.shard_key = Some(key.into());
        self
    }

    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    pub fn with_routing_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.routing_delegate = Some(delegate.into());
        self
    }

    fn apply(&self, mut req: Request) -> Request {
        for (k, v) in self.headers.items() {
            req.headers.set(k, v.to_string());
        }
        req.shard_key = self.shard_key.clone().or(req.shard_key);
        req.routing_key = self.routing_key.clone().or(req.routing_key);
        req.routing_delegate = self.routing_delegate.clone().or(req.routing_delegate);
        req
    }
}

/// The caller-facing surface named in the external-interfaces contract:
/// wraps a [`Channel`] and turns a method name plus a raw body into a
/// dispatched call. Encoding-specific generated stubs build on top of
/// this rather than replacing it.
pub struct Client {
    channel: Box<dyn Channel>,
    encoding: String,
}

impl Client {
    pub fn new(channel: Box<dyn Channel>, encoding: impl Into<String>) -> Self {
        Client {
            channel,
            encoding: encoding.into(),
        }
    }

    pub async fn call(
        &self,
        ctx: &Context,
        method: &str,
        req_body: Vec<u8>,
        opts: CallOptions,
    ) -> Result<Response> {
        let outbound = self.channel.unary_outbound(method)?;
        let req = self.build_request(method, req_body, opts);
        outbound.call(ctx, req).await
    }

    pub async fn call_oneway(
        &self,
        ctx: &Context,
        method: &str,
        req_body: Vec<u8>,
        opts: CallOptions,
    ) -> Result<Ack> {
        let outbound = self.channel.oneway_outbound(method)?;
        let req = self.build_request(method, req_body, opts);
        outbound.call_oneway(ctx, req).await
    }

    fn build_request(&self, method: &str, body: Vec<u8>, opts: CallOptions) -> Request {
        let req = Request::new(
            self.channel.caller(),
            self.channel.service(),
            method,
            self.encoding.clone(),
        )
        .with_body(Bytes::from(body));
        opts.apply(req)
    }
}
