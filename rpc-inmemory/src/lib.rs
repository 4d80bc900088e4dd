//! An in-process transport and a raw-bytes codec, used to exercise the
//! dispatch core end to end without a real network.
//!
//! [`in_memory_pair`] returns a connected inbound/outbound pair backed by a
//! [`tokio::sync::mpsc`] channel: calling the outbound sends a message
//! across the channel, the inbound's `serve` loop receives it, dispatches
//! it through the given [`rpc_core::router::Router`] via
//! [`rpc_core::safecall`], and the result is sent back over a
//! [`tokio::sync::oneshot`] reply channel. A call genuinely crosses a
//! channel boundary this way, mirroring how a real wire transport behaves,
//! while staying entirely inside one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Notify};

use rpc_core::codec::Codec;
use rpc_core::context::Context;
use rpc_core::error::{ProcedureFailed, Result, RpcError};
use rpc_core::handler::HandlerSpec;
use rpc_core::headers::Headers;
use rpc_core::request::Request;
use rpc_core::response::{Ack, Response};
use rpc_core::router::Router;
use rpc_core::safecall::{safe_call_oneway, safe_call_unary};
use rpc_core::transport::{Inbound, OnewayOutbound, ResponseWriter, UnaryOutbound};

enum CallMessage {
    Unary {
        ctx: Context,
        req: Request,
        respond_to: oneshot::Sender<Result<Response>>,
    },
    Oneway {
        ctx: Context,
        req: Request,
        respond_to: oneshot::Sender<Result<Ack>>,
    },
}

/// Buffers the bytes and headers a handler writes, then hands them back as
/// a [`Response`] once the handler returns.
struct BufferingResponseWriter {
    body: Vec<u8>,
    headers: Headers,
    application_error: bool,
}

impl BufferingResponseWriter {
    fn new() -> Self {
        BufferingResponseWriter {
            body: Vec::new(),
            headers: Headers::new(),
            application_error: false,
        }
    }

    fn into_response(self) -> Response {
        let mut response = Response::new().with_body(self.body).with_headers(self.headers);
        if self.application_error {
            response = response.mark_application_error();
        }
        response
    }
}

impl ResponseWriter for BufferingResponseWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }

    fn add_headers(&mut self, headers: Headers) {
        for (k, v) in headers.items() {
            self.headers.set(k, v.to_string());
        }
    }

    fn set_application_error(&mut self) {
        self.application_error = true;
    }
}

/// The inbound half of an in-memory channel. `serve` must be given the
/// same router the dispatcher owns; it drains call messages until `stop`
/// is called.
pub struct InMemoryInbound {
    receiver: parking_lot::Mutex<Option<mpsc::Receiver<CallMessage>>>,
    stop_requested: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl InMemoryInbound {
    fn new(receiver: mpsc::Receiver<CallMessage>) -> Self {
        InMemoryInbound {
            receiver: parking_lot::Mutex::new(Some(receiver)),
            stop_requested: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Inbound for InMemoryInbound {
    async fn serve(&self, router: Arc<Router>) -> Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .expect("InMemoryInbound::serve called more than once");

        loop {
            let message = tokio::select! {
                msg = receiver.recv() => msg,
                _ = self.stop_requested.notified() => None,
            };

            let Some(message) = message else {
                break;
            };

            let router = router.clone();
            tokio::spawn(dispatch(router, message));

            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
        }

        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_requested.notify_waiters();
    }
}

async fn dispatch(router: Arc<Router>, message: CallMessage) {
    match message {
        CallMessage::Unary {
            ctx,
            req,
            respond_to,
        } => {
            tracing::debug!(service = %req.service, procedure = %req.procedure, "received unary call");
            let result = match router.get_handler_spec(&req.service, &req.procedure) {
                Ok(HandlerSpec::Unary(handler)) => {
                    let mut writer = BufferingResponseWriter::new();
                    match safe_call_unary(&ctx, req, handler, &mut writer).await {
                        Ok(()) => Ok(writer.into_response()),
                        Err(err) => Err(err),
                    }
                }
                Ok(HandlerSpec::Oneway(_)) => Err(RpcError::Unexpected(ProcedureFailed::new(
                    "channel",
                    "unary-call-on-oneway-handler",
                    "registered handler is oneway, not unary",
                ))),
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                tracing::debug!(%err, "unary call failed");
            }
            let _ = respond_to.send(result);
        }
        CallMessage::Oneway {
            ctx,
            req,
            respond_to,
        } => {
            tracing::debug!(service = %req.service, procedure = %req.procedure, "received oneway call");
            let result = match router.get_handler_spec(&req.service, &req.procedure) {
                Ok(HandlerSpec::Oneway(handler)) => {
                    safe_call_oneway(&ctx, req, handler).await.map(|()| Ack)
                }
                Ok(HandlerSpec::Unary(_)) => Err(RpcError::Unexpected(ProcedureFailed::new(
                    "channel",
                    "oneway-call-on-unary-handler",
                    "registered handler is unary, not oneway",
                ))),
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                tracing::debug!(%err, "oneway call failed");
            }
            let _ = respond_to.send(result);
        }
    }
}

/// The outbound half of an in-memory channel.
pub struct InMemoryOutbound {
    sender: mpsc::Sender<CallMessage>,
}

#[async_trait]
impl UnaryOutbound for InMemoryOutbound {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn call(&self, ctx: &Context, req: Request) -> Result<Response> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CallMessage::Unary {
                ctx: ctx.clone(),
                req,
                respond_to,
            })
            .await
            .map_err(|_| channel_closed())?;
        response.await.map_err(|_| channel_closed())?
    }

    async fn stop(&self) {}
}

#[async_trait]
impl OnewayOutbound for InMemoryOutbound {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn call_oneway(&self, ctx: &Context, req: Request) -> Result<Ack> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CallMessage::Oneway {
                ctx: ctx.clone(),
                req,
                respond_to,
            })
            .await
            .map_err(|_| channel_closed())?;
        response.await.map_err(|_| channel_closed())?
    }

    async fn stop(&self) {}
}

fn channel_closed() -> RpcError {
    RpcError::Transport(Box::new(std::io::Error::other(
        "in-memory transport channel closed",
    )))
}

/// Builds a connected in-memory inbound/outbound pair. `buffer` bounds the
/// number of in-flight call messages before `call`/`call_oneway` start
/// applying backpressure.
pub fn in_memory_pair(buffer: usize) -> (Arc<InMemoryInbound>, Arc<InMemoryOutbound>) {
    let (sender, receiver) = mpsc::channel(buffer);
    (
        Arc::new(InMemoryInbound::new(receiver)),
        Arc::new(InMemoryOutbound { sender }),
    )
}

/// The raw-bytes codec: encoding and decoding are both the identity
/// function. Stands in for a real schema-based codec in tests and demos.
pub struct RawBytesCodec;

impl Codec<Vec<u8>> for RawBytesCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
