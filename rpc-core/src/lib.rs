//! Transport-agnostic RPC dispatch core.
//!
//! This crate owns the request/response data model, the inbound router and
//! safe-call dispatch wrapper, request validation, the outbound middleware
//! chain, the channel/client call path, and the peer agent/chooser
//! subsystem. Concrete wire transports and encodings are external
//! collaborators that implement the traits in [`transport`].

pub mod channel;
pub mod chooser;
pub mod client;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod headers;
pub mod middleware;
pub mod options;
pub mod peer;
pub mod request;
pub mod response;
pub mod router;
pub mod safecall;
pub mod transport;
pub mod validate;

pub use channel::{Channel, IdentityChannel, MultiOutboundChannel};
pub use client::{CallOptions, Client};
pub use codec::Codec;
pub use context::Context;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BadRequestError, EncodingError, ProcedureFailed, Result, RpcError};
pub use handler::{HandlerSpec, OnewayHandler, UnaryHandler};
pub use headers::Headers;
pub use options::Options;
pub use request::Request;
pub use response::{Ack, Response};
pub use router::{Router, RouteEntry, ServiceProcedure};
pub use transport::{Inbound, OnewayOutbound, ResponseWriter, UnaryOutbound};
