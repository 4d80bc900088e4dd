use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{ProcedureFailed, Result, RpcError};
use crate::router::Router;
use crate::transport::{Inbound, OnewayOutbound, UnaryOutbound};

/// Accumulates inbounds, outbounds, and the router before building a
/// running [`Dispatcher`] (the idiomatic equivalent of a config object):
/// nothing starts until [`DispatcherBuilder::build`] hands off to
/// [`Dispatcher::start`].
pub struct DispatcherBuilder {
    router: Arc<Router>,
    inbounds: Vec<Arc<dyn Inbound>>,
    unary_outbounds: Vec<Arc<dyn UnaryOutbound>>,
    oneway_outbounds: Vec<Arc<dyn OnewayOutbound>>,
}

impl DispatcherBuilder {
    pub fn new(router: Arc<Router>) -> Self {
        DispatcherBuilder {
            router,
            inbounds: Vec::new(),
            unary_outbounds: Vec::new(),
            oneway_outbounds: Vec::new(),
        }
    }

    pub fn with_inbound(mut self, inbound: Arc<dyn Inbound>) -> Self {
        self.inbounds.push(inbound);
        self
    }

    pub fn with_unary_outbound(mut self, outbound: Arc<dyn UnaryOutbound>) -> Self {
        self.unary_outbounds.push(outbound);
        self
    }

    pub fn with_oneway_outbound(mut self, outbound: Arc<dyn OnewayOutbound>) -> Self {
        self.oneway_outbounds.push(outbound);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            router: self.router,
            inbounds: self.inbounds,
            unary_outbounds: self.unary_outbounds,
            oneway_outbounds: self.oneway_outbounds,
            serve_handles: Mutex::new(Vec::new()),
        }
    }
}

/// Binds a router, a set of inbound transports, and a set of outbound
/// transports into one running system. `start` brings up outbounds before
/// inbounds so handlers on this side can dial out as soon as they start
/// receiving calls; `stop` runs the reverse order so inbounds finish
/// draining before the outbounds they might still be using are torn down.
pub struct Dispatcher {
    router: Arc<Router>,
    inbounds: Vec<Arc<dyn Inbound>>,
    unary_outbounds: Vec<Arc<dyn UnaryOutbound>>,
    oneway_outbounds: Vec<Arc<dyn OnewayOutbound>>,
    serve_handles: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl Dispatcher {
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Starts every outbound, then begins serving on every inbound. Each
    /// inbound's `serve` call blocks for as long as it accepts calls, so
    /// it runs on its own task; `serve_handles` lets `stop` confirm every
    /// one of them actually returned.
    pub async fn start(&self) -> Result<()> {
        for outbound in &self.unary_outbounds {
            outbound.start().await?;
        }
        for outbound in &self.oneway_outbounds {
            outbound.start().await?;
        }

        let mut handles = self.serve_handles.lock();
        for inbound in &self.inbounds {
            let inbound = inbound.clone();
            let router = self.router.clone();
            handles.push(tokio::spawn(async move { inbound.serve(router).await }));
        }

        Ok(())
    }

    /// Stops every inbound (unblocking its `serve` task), waits for those
    /// tasks to finish draining, then stops every outbound.
    pub async fn stop(&self) -> Result<()> {
        for inbound in &self.inbounds {
            inbound.stop().await;
        }

        let handles = std::mem::take(&mut *self.serve_handles.lock());
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(join_err) => {
                    return Err(RpcError::Unexpected(ProcedureFailed::new(
                        "dispatcher",
                        "serve",
                        join_err,
                    )))
                }
            }
        }

        for outbound in &self.oneway_outbounds {
            outbound.stop().await;
        }
        for outbound in &self.unary_outbounds {
            outbound.stop().await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::request::Request;
    use crate::response::Response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeInbound {
        serving: Arc<AtomicBool>,
        started: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Inbound for FakeInbound {
        async fn serve(&self, _router: Arc<Router>) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.serving.store(true, Ordering::SeqCst);
            while self.serving.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            Ok(())
        }

        async fn stop(&self) {
            self.serving.store(false, Ordering::SeqCst);
        }
    }

    struct FakeUnaryOutbound {
        start_order: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    #[async_trait]
    impl UnaryOutbound for FakeUnaryOutbound {
        async fn start(&self) -> Result<()> {
            self.start_order.lock().push(self.name);
            Ok(())
        }
        async fn call(&self, _ctx: &Context, _req: Request) -> Result<Response> {
            Ok(Response::new())
        }
        async fn stop(&self) {
            self.start_order.lock().push("stop-outbound");
        }
    }

    #[tokio::test]
    async fn start_brings_up_outbounds_before_inbounds_begin_serving() {
        let router = Arc::new(Router::new("kv"));
        let order = Arc::new(Mutex::new(Vec::new()));
        let serving = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicUsize::new(0));

        let dispatcher = DispatcherBuilder::new(router)
            .with_unary_outbound(Arc::new(FakeUnaryOutbound {
                start_order: order.clone(),
                name: "primary",
            }))
            .with_inbound(Arc::new(FakeInbound {
                serving: serving.clone(),
                started: started.clone(),
            }))
            .build();

        dispatcher.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*order.lock(), vec!["primary"]);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        dispatcher.stop().await.unwrap();
        assert!(!serving.load(Ordering::SeqCst));
        assert_eq!(*order.lock(), vec!["primary", "stop-outbound"]);
    }
}
