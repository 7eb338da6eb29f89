//! Named middleware with short-circuit semantics.
//!
//! A middleware inspects the request and either lets it continue or aborts
//! with its own response (a 401, a redirect, anything). Routes reference
//! middleware by name; the registry resolves names when routes are declared.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::http::{Request, Response};

/// What a middleware decides about a request.
pub enum Outcome {
    /// Pass through to the next middleware or the action.
    Continue,
    /// Stop here; this response is the whole output.
    Abort(Response),
}

/// Middleware signature. Read-only access to the request.
pub type MiddlewareFn = dyn Fn(&Request) -> Outcome + Send + Sync;

/// Name to middleware mapping, filled at startup.
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    entries: IndexMap<String, Arc<MiddlewareFn>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Request) -> Outcome + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(func));
    }

    pub fn get(&self, name: &str) -> Option<Arc<MiddlewareFn>> {
        self.entries.get(name).cloned()
    }
}

/// A middleware reference attached to a route. Resolution happens at
/// registration time when possible; a name unknown at that point stays
/// unresolved and fails the route at dispatch.
#[derive(Clone)]
pub struct MiddlewareRef {
    pub name: String,
    pub func: Option<Arc<MiddlewareFn>>,
}

impl MiddlewareRef {
    pub fn resolve(name: &str, registry: &MiddlewareRegistry) -> Self {
        Self {
            name: name.to_string(),
            func: registry.get(name),
        }
    }
}
