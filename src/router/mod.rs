//! Request routing: registration, grouping and dispatch.
//!
//! Routes are declared up front and matched in registration order; the first
//! match wins. `group` scopes a prefix and a middleware list over a block of
//! declarations, with groups nesting through a scope stack. Dispatch builds
//! the request, decodes the payload, runs the route's middleware chain and
//! invokes the action; a request with no matching route gets the canonical
//! 404 JSON response.

pub mod pattern;

use std::sync::Arc;

use crate::controller::{ActionRegistry, Handler};
use crate::error::DispatchError;
use crate::http::{Headers, Method, Payload, Request, Response};
use crate::middleware::{MiddlewareRef, MiddlewareRegistry, Outcome};
use pattern::{normalize_path, RoutePattern};

/// What a route runs on match.
#[derive(Clone)]
pub enum Action {
    /// Inline closure.
    Handler(Arc<Handler>),
    /// `"Controller@method"` id, resolved against the action registry at
    /// dispatch.
    Named(String),
}

impl Action {
    pub fn handler<F>(f: F) -> Action
    where
        F: Fn(&pattern::Params, &Payload, &Request) -> Response + Send + Sync + 'static,
    {
        Action::Handler(Arc::new(f))
    }

    pub fn named(id: impl Into<String>) -> Action {
        Action::Named(id.into())
    }
}

/// A registered route. Immutable once declared.
#[derive(Clone)]
pub struct Route {
    /// `None` matches any method.
    method: Option<Method>,
    /// Full URI the pattern was compiled from, for logging.
    uri: String,
    pattern: RoutePattern,
    action: Action,
    middleware: Vec<MiddlewareRef>,
}

/// Group attributes: a prefix and/or a middleware name list.
#[derive(Default, Clone)]
pub struct GroupAttributes {
    pub prefix: Option<String>,
    pub middleware: Vec<String>,
}

impl GroupAttributes {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn middleware(names: &[&str]) -> Self {
        Self {
            middleware: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_middleware(mut self, names: &[&str]) -> Self {
        self.middleware = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

#[derive(Clone)]
struct GroupScope {
    prefix: String,
    middleware: Vec<MiddlewareRef>,
}

/// The router itself. Declare middleware and actions first, then routes.
#[derive(Default)]
pub struct Router {
    base_url: String,
    routes: Vec<Route>,
    scope: Vec<GroupScope>,
    middleware: MiddlewareRegistry,
    actions: ActionRegistry,
    default_headers: Vec<(String, String)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix applied to every route registered afterwards.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    /// Headers added to every response that does not already set them.
    pub fn add_default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers.push((name.into(), value.into()));
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middleware
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn add_route(&mut self, method: Option<Method>, uri: &str, action: Action) {
        let prefix: String = self.scope.iter().map(|s| s.prefix.as_str()).collect();
        let mut full_uri = format!("{}{}{}", self.base_url, prefix, uri);
        // Incoming paths are matched without trailing slashes
        while full_uri.len() > 1 && full_uri.ends_with('/') {
            full_uri.pop();
        }
        let middleware = self
            .scope
            .iter()
            .flat_map(|s| s.middleware.iter().cloned())
            .collect();

        self.routes.push(Route {
            method,
            pattern: RoutePattern::compile(&full_uri),
            uri: full_uri,
            action,
            middleware,
        });
    }

    pub fn get(&mut self, uri: &str, action: Action) {
        self.add_route(Some(Method::Get), uri, action);
    }

    pub fn post(&mut self, uri: &str, action: Action) {
        self.add_route(Some(Method::Post), uri, action);
    }

    pub fn put(&mut self, uri: &str, action: Action) {
        self.add_route(Some(Method::Put), uri, action);
    }

    pub fn patch(&mut self, uri: &str, action: Action) {
        self.add_route(Some(Method::Patch), uri, action);
    }

    pub fn delete(&mut self, uri: &str, action: Action) {
        self.add_route(Some(Method::Delete), uri, action);
    }

    pub fn any(&mut self, uri: &str, action: Action) {
        self.add_route(None, uri, action);
    }

    /// Scope a prefix and middleware list over the routes declared inside
    /// `builder`. Restores the previous scope afterwards, so groups nest.
    pub fn group<F>(&mut self, attributes: GroupAttributes, builder: F)
    where
        F: FnOnce(&mut Router),
    {
        let middleware = attributes
            .middleware
            .iter()
            .map(|name| MiddlewareRef::resolve(name, &self.middleware))
            .collect();
        self.scope.push(GroupScope {
            prefix: attributes.prefix.unwrap_or_default(),
            middleware,
        });

        builder(self);

        self.scope.pop();
    }

    /// Walk routes in registration order and run the first match. `Ok` is
    /// the response to send, including the 404 when nothing matches; `Err`
    /// means a matched route is misconfigured.
    pub fn resolve(
        &self,
        method: Method,
        raw_path: &str,
        headers: Headers,
        body: &str,
    ) -> Result<Response, DispatchError> {
        let path = normalize_path(raw_path);

        for route in &self.routes {
            if let Some(expected) = route.method {
                if expected != method {
                    continue;
                }
            }
            let Some(params) = route.pattern.matches(&path) else {
                continue;
            };

            log::debug!("matched {} {}", method, route.uri);

            let request = Request::new(method, raw_path, headers);
            let payload = Payload::parse(body);

            for mw in &route.middleware {
                let func = match &mw.func {
                    Some(func) => Arc::clone(func),
                    None => self
                        .middleware
                        .get(&mw.name)
                        .ok_or_else(|| DispatchError::UnknownMiddleware(mw.name.clone()))?,
                };
                if let Outcome::Abort(resp) = func(&request) {
                    return Ok(self.finish(resp));
                }
            }

            let handler = match &route.action {
                Action::Handler(h) => Arc::clone(h),
                Action::Named(id) => self.actions.resolve(id)?,
            };
            return Ok(self.finish(handler(&params, &payload, &request)));
        }

        Ok(self.finish(Response::not_found()))
    }

    /// Dispatch and absorb configuration errors into a 500.
    pub fn handle(&self, method: Method, raw_path: &str, headers: Headers, body: &str) -> Response {
        match self.resolve(method, raw_path, headers, body) {
            Ok(resp) => resp,
            Err(err) => {
                log::error!("dispatch failed for {} {}: {}", method, raw_path, err);
                self.finish(Response::server_error())
            }
        }
    }

    /// Apply default headers that the response has not set itself.
    fn finish(&self, mut resp: Response) -> Response {
        for (name, value) in &self.default_headers {
            if !resp.headers.contains_key(name) {
                resp.headers.insert(name.clone(), value.clone());
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn text_action(body: &'static str) -> Action {
        Action::handler(move |_p, _b, _r| Response::text(body))
    }

    fn dispatch(router: &Router, method: Method, path: &str) -> Response {
        router.handle(method, path, Headers::new(), "")
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router.get("/users/{id}", text_action("first"));
        router.get("/users/{id}", text_action("second"));

        assert_eq!(dispatch(&router, Method::Get, "/users/1").body, "first");
    }

    #[test]
    fn test_method_filtering() {
        let mut router = Router::new();
        router.post("/users", text_action("created"));

        assert_eq!(dispatch(&router, Method::Post, "/users").body, "created");
        assert_eq!(dispatch(&router, Method::Get, "/users").status, 404);
    }

    #[test]
    fn test_any_matches_every_method() {
        let mut router = Router::new();
        router.any("/ping", text_action("pong"));

        assert_eq!(dispatch(&router, Method::Get, "/ping").body, "pong");
        assert_eq!(dispatch(&router, Method::Delete, "/ping").body, "pong");
    }

    #[test]
    fn test_no_match_is_canonical_404() {
        let router = Router::new();
        let resp = dispatch(&router, Method::Get, "/nowhere");
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, r#"{"error":"404 Not Found"}"#);
    }

    #[test]
    fn test_params_reach_the_action() {
        let mut router = Router::new();
        router.get(
            "/users/{id}/{limit?}",
            Action::handler(|params, _b, _r| {
                let id = params["id"].clone().unwrap_or_default();
                let limit = params["limit"].clone();
                Response::json(&json!({"id": id, "limit": limit}), 200)
            }),
        );

        let resp = dispatch(&router, Method::Get, "/users/7");
        assert_eq!(resp.body, r#"{"id":"7","limit":null}"#);
    }

    #[test]
    fn test_base_url_prefixes_routes() {
        let mut router = Router::new();
        router.set_base_url("/api/v1");
        router.get("/users", text_action("list"));

        assert_eq!(dispatch(&router, Method::Get, "/api/v1/users").body, "list");
        assert_eq!(dispatch(&router, Method::Get, "/users").status, 404);
    }

    #[test]
    fn test_group_prefix_and_nesting() {
        let mut router = Router::new();
        router.group(GroupAttributes::prefix("/admin"), |r| {
            r.get("/stats", text_action("stats"));
            r.group(GroupAttributes::prefix("/users"), |r| {
                r.get("/list", text_action("list"));
            });
        });
        router.get("/plain", text_action("plain"));

        assert_eq!(dispatch(&router, Method::Get, "/admin/stats").body, "stats");
        assert_eq!(
            dispatch(&router, Method::Get, "/admin/users/list").body,
            "list"
        );
        // Scope is restored after the group
        assert_eq!(dispatch(&router, Method::Get, "/plain").body, "plain");
    }

    #[test]
    fn test_group_middleware_aborts() {
        let mut router = Router::new();
        router.middleware_mut().register("auth", |req: &Request| {
            if req.header("Authorization").is_some() {
                Outcome::Continue
            } else {
                Outcome::Abort(Response::json(&json!({"error": "unauthorized"}), 401))
            }
        });

        router.group(GroupAttributes::prefix("/user").with_middleware(&["auth"]), |r| {
            r.get("/profile", text_action("profile"));
        });

        let denied = dispatch(&router, Method::Get, "/user/profile");
        assert_eq!(denied.status, 401);
        assert_eq!(denied.body, r#"{"error":"unauthorized"}"#);

        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let allowed = router.handle(Method::Get, "/user/profile", headers, "");
        assert_eq!(allowed.body, "profile");
    }

    #[test]
    fn test_unknown_middleware_is_a_500() {
        let mut router = Router::new();
        router.group(GroupAttributes::middleware(&["ghost"]), |r| {
            r.get("/secure", text_action("never"));
        });

        let resp = dispatch(&router, Method::Get, "/secure");
        assert_eq!(resp.status, 500);
    }

    #[test]
    fn test_named_action_dispatch() {
        let mut router = Router::new();
        router
            .actions_mut()
            .register("users/UserController@index", |_p, _b, _r| {
                Response::text("indexed")
            });
        router.get("/users", Action::named("users\\UserController@index"));

        assert_eq!(dispatch(&router, Method::Get, "/users").body, "indexed");
    }

    #[test]
    fn test_unregistered_named_action_is_a_500() {
        let mut router = Router::new();
        router.get("/broken", Action::named("Missing@action"));

        assert_eq!(dispatch(&router, Method::Get, "/broken").status, 500);
    }

    #[test]
    fn test_default_headers_applied_everywhere() {
        let mut router = Router::new();
        router.add_default_header("Access-Control-Allow-Origin", "*");
        router.get("/", text_action("home"));

        let hit = dispatch(&router, Method::Get, "/");
        assert_eq!(
            hit.headers.get("Access-Control-Allow-Origin").map(String::as_str),
            Some("*")
        );
        let miss = dispatch(&router, Method::Get, "/none");
        assert_eq!(
            miss.headers.get("Access-Control-Allow-Origin").map(String::as_str),
            Some("*")
        );
    }

    #[test]
    fn test_query_string_is_ignored_for_matching() {
        let mut router = Router::new();
        router.get("/search/{term}", Action::handler(|params, _b, _r| {
            Response::text(params["term"].clone().unwrap_or_default())
        }));

        assert_eq!(
            dispatch(&router, Method::Get, "/search/rust?page=2").body,
            "rust"
        );
    }

    #[test]
    fn test_payload_reaches_the_action() {
        let mut router = Router::new();
        router.post("/echo", Action::handler(|_p, payload, _r| {
            Response::text(payload.str_field("name").unwrap_or("").to_string())
        }));

        let resp = router.handle(
            Method::Post,
            "/echo",
            Headers::new(),
            r#"{"name":"ada"}"#,
        );
        assert_eq!(resp.body, "ada");
    }
}
