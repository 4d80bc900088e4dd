use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{BadRequestError, Result, RpcError};
use crate::handler::HandlerSpec;

/// The registry key: a `(service, procedure)` pair. Uniqueness within a
/// [`Router`] is enforced: registering the same pair twice overwrites the
/// earlier entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceProcedure {
    pub service: String,
    pub procedure: String,
}

/// One entry passed to [`Router::register`]. `service` defaults to the
/// router's configured default service name when left unset, which
/// generated client/server code relies on to avoid repeating the service
/// name on every procedure.
pub struct RouteEntry {
    pub service: Option<String>,
    pub procedure: String,
    pub handler: HandlerSpec,
}

impl RouteEntry {
    pub fn new(procedure: impl Into<String>, handler: HandlerSpec) -> Self {
        RouteEntry {
            service: None,
            procedure: procedure.into(),
            handler,
        }
    }

    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Registers and resolves `(service, procedure) -> handler`.
///
/// Writes happen during registration, before [`crate::dispatcher::Dispatcher::start`];
/// reads happen continuously afterward. An `RwLock` keeps the steady-state
/// read path cheap without requiring registration to be single-threaded.
pub struct Router {
    default_service: String,
    entries: RwLock<HashMap<ServiceProcedure, HandlerSpec>>,
}

impl Router {
    pub fn new(default_service: impl Into<String>) -> Self {
        Router {
            default_service: default_service.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `entries`, filling in the default service name for any entry
    /// that didn't specify one. Re-registering the same `(service,
    /// procedure)` silently overwrites the previous handler.
    pub fn register(&self, entries: impl IntoIterator<Item = RouteEntry>) {
        let mut map = self.entries.write();
        for entry in entries {
            let service = entry.service.unwrap_or_else(|| self.default_service.clone());
            map.insert(
                ServiceProcedure {
                    service,
                    procedure: entry.procedure,
                },
                entry.handler,
            );
        }
    }

    /// Look up a handler, or a `BadRequest(UnrecognizedProcedure)` error if
    /// `(service, procedure)` was never registered.
    pub fn get_handler_spec(&self, service: &str, procedure: &str) -> Result<HandlerSpec> {
        self.entries
            .read()
            .get(&ServiceProcedure {
                service: service.to_string(),
                procedure: procedure.to_string(),
            })
            .cloned()
            .ok_or_else(|| {
                RpcError::BadRequest(BadRequestError::UnrecognizedProcedure {
                    service: service.to_string(),
                    procedure: procedure.to_string(),
                })
            })
    }

    /// All registered `(service, procedure)` pairs, sorted by service name
    /// ascending then procedure name ascending. Introspection and tests
    /// depend on this ordering being deterministic.
    pub fn procedures(&self) -> Vec<ServiceProcedure> {
        let mut keys: Vec<_> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::request::Request;
    use crate::transport::ResponseWriter;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl crate::handler::UnaryHandler for Noop {
        async fn handle(
            &self,
            _ctx: &Context,
            _req: Request,
            _writer: &mut dyn ResponseWriter,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_then_get_returns_same_handler() {
        let router = Router::new("kv");
        router.register([RouteEntry::new("GetValue", HandlerSpec::unary(Noop))]);

        let spec = router.get_handler_spec("kv", "GetValue").unwrap();
        assert!(spec.is_unary());
    }

    #[test]
    fn missing_service_defaults_to_router_default() {
        let router = Router::new("kv");
        router.register([RouteEntry::new("GetValue", HandlerSpec::unary(Noop))]);
        assert!(router.get_handler_spec("kv", "GetValue").is_ok());
    }

    #[test]
    fn reregistration_overwrites_silently() {
        let router = Router::new("kv");
        router.register([RouteEntry::new("GetValue", HandlerSpec::unary(Noop))]);
        router.register([RouteEntry::new("GetValue", HandlerSpec::unary(Noop))]);
        assert!(router.get_handler_spec("kv", "GetValue").is_ok());
    }

    #[test]
    fn unregistered_pair_is_unrecognized_procedure() {
        let router = Router::new("kv");
        let err = router.get_handler_spec("kv", "Missing").unwrap_err();
        assert!(matches!(
            err,
            RpcError::BadRequest(BadRequestError::UnrecognizedProcedure { .. })
        ));
    }

    #[test]
    fn procedures_are_sorted_by_service_then_procedure() {
        let router = Router::new("svc");
        router.register([
            RouteEntry::new("A", HandlerSpec::unary(Noop)).for_service("svc"),
            RouteEntry::new("B", HandlerSpec::unary(Noop)).for_service("svc"),
            RouteEntry::new("C", HandlerSpec::unary(Noop)).for_service("other"),
        ]);

        let procs = router.procedures();
        let pairs: Vec<(&str, &str)> = procs
            .iter()
            .map(|p| (p.service.as_str(), p.procedure.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("other", "C"), ("svc", "A"), ("svc", "B")]
        );
    }
}
