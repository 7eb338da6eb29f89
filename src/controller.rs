//! Controller actions and the registry that names them.
//!
//! An action is any function of `(params, payload, request) -> Response`.
//! Routes can hold the closure directly or refer to it by a
//! `"path/Name@method"` id; ids are registered up front so dispatch is a
//! plain map lookup. The `Controller` trait carries the response helpers
//! shared by handler implementations.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::http::{Payload, Request, Response};
use crate::router::pattern::Params;

/// Action signature: route params, decoded body, request metadata.
pub type Handler = dyn Fn(&Params, &Payload, &Request) -> Response + Send + Sync;

/// Maps normalized action ids to handlers.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    entries: IndexMap<String, Arc<Handler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an id like `"users/UserController@signup"`.
    /// The id is normalized, so `\` and `.` separators register the same
    /// entry as `/`.
    pub fn register<F>(&mut self, id: &str, handler: F)
    where
        F: Fn(&Params, &Payload, &Request) -> Response + Send + Sync + 'static,
    {
        self.entries
            .insert(normalize_action_id(id), Arc::new(handler));
    }

    /// Resolve a `"Controller@method"` action string.
    pub fn resolve(&self, action: &str) -> Result<Arc<Handler>, DispatchError> {
        if !action.contains('@') {
            return Err(DispatchError::InvalidAction(action.to_string()));
        }
        let id = normalize_action_id(action);
        self.entries
            .get(&id)
            .cloned()
            .ok_or_else(|| DispatchError::UnresolvedAction(action.to_string()))
    }
}

/// Fold `\`, `/` and `.` controller-path separators into `/`.
pub fn normalize_action_id(id: &str) -> String {
    let (path, method) = match id.split_once('@') {
        Some((p, m)) => (p, Some(m)),
        None => (id, None),
    };
    let path = path.replace(['\\', '.'], "/");
    match method {
        Some(m) => format!("{path}@{m}"),
        None => path,
    }
}

/// Response helpers shared by controllers.
pub trait Controller {
    /// JSON-encode `data`, set the content type and any extra headers.
    fn response_json(&self, data: &Value, status: u16, headers: &[(&str, &str)]) -> Response {
        let mut resp = Response::json(data, status);
        for (name, value) in headers {
            resp = resp.with_header(*name, *value);
        }
        resp
    }

    /// Raw passthrough with a status.
    fn response(&self, body: impl Into<String>, status: u16) -> Response {
        Response::new(status, body)
    }
}
