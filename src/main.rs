//! Demo JSON API wired from the framework pieces: a user signup/login flow
//! backed by the in-memory store, token-checked routes and both parameter
//! styles.

use std::net::SocketAddr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use gantry::crypt::{check_token, create_token, Encryptor};
use gantry::db::{DbConn, MemoryBackend, Row};
use gantry::http::{Response, Payload, Request};
use gantry::middleware::Outcome;
use gantry::router::pattern::Params;
use gantry::router::{Action, GroupAttributes, Router};
use gantry::validator::validate;

const TOKEN_MAX_AGE_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    log4rs::init_file("config/log4rs.yaml", Default::default())
        .expect("failed to initialize logging");

    let encryptor = Arc::new(Encryptor::new("change-me-in-production"));
    let backend = MemoryBackend::new();
    backend.create_table("users");
    let db = Arc::new(DbConn::new(backend));

    let router = Arc::new(build_router(db, encryptor));

    let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    gantry::serve::serve(router, addr).await
}

fn build_router(db: Arc<DbConn<MemoryBackend>>, encryptor: Arc<Encryptor>) -> Router {
    let mut router = Router::new();
    router.set_base_url("/api");

    router.add_default_header("Access-Control-Allow-Origin", "*");
    router.add_default_header(
        "Access-Control-Allow-Methods",
        "GET, POST, PUT, PATCH, DELETE, OPTIONS",
    );
    router.add_default_header("Access-Control-Allow-Headers", "Content-Type, Authorization");

    let auth_encryptor = Arc::clone(&encryptor);
    router.middleware_mut().register("auth", move |req: &Request| {
        let token = req
            .header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if check_token(token, &auth_encryptor, TOKEN_MAX_AGE_HOURS).is_ok() => {
                Outcome::Continue
            }
            _ => Outcome::Abort(Response::json(&json!({"error": "unauthorized"}), 401)),
        }
    });

    let signup_db = Arc::clone(&db);
    let signup_enc = Arc::clone(&encryptor);
    router.actions_mut().register(
        "users/UserController@signup",
        move |_params: &Params, payload: &Payload, _req: &Request| {
            signup(&signup_db, &signup_enc, payload)
        },
    );

    let list_db = Arc::clone(&db);
    router.actions_mut().register(
        "users/UserController@list",
        move |params: &Params, _payload: &Payload, _req: &Request| list_users(&list_db, params),
    );

    router.get("/", Action::handler(|_p, _b, _r| {
        Response::json(&json!({"status": "ok"}), 200)
    }));

    router.group(GroupAttributes::prefix("/user"), |r| {
        r.post("/signup", Action::named("users\\UserController@signup"));
    });

    router.group(
        GroupAttributes::prefix("/user").with_middleware(&["auth"]),
        |r| {
            r.get("/list/{id?}/{limit?}/{offset?}", Action::named("users/UserController@list"));
        },
    );

    // Legacy positional style kept for old clients
    let echo_db = Arc::clone(&db);
    router.get("/legacy/users/$id/$limit?", Action::handler(
        move |params: &Params, _b: &Payload, _r: &Request| list_users(&echo_db, params),
    ));

    router
}

fn signup(db: &DbConn<MemoryBackend>, encryptor: &Encryptor, payload: &Payload) -> Response {
    let mut data = IndexMap::new();
    for field in ["name", "email", "password"] {
        data.insert(
            field.to_string(),
            payload.get(field).cloned().unwrap_or(serde_json::Value::Null),
        );
    }
    let mut rules = IndexMap::new();
    rules.insert("name".to_string(), "required|min:3".to_string());
    rules.insert("email".to_string(), "required|email".to_string());
    rules.insert("password".to_string(), "required|min:8".to_string());

    let validation = validate(&data, &rules);
    if !validation.ok {
        return Response::json(&json!({"errors": validation.errors_json()}), 422);
    }

    let mut fields = Row::new();
    fields.insert("name".to_string(), data["name"].clone());
    fields.insert("email".to_string(), data["email"].clone());
    let result = db.insert_data("users", &fields, false);

    match result.get("insertid") {
        Some(id) => {
            let token = create_token(&json!({"id": id, "email": data["email"]}), encryptor);
            Response::json(&json!({"token": token}), 200)
        }
        None => Response::json(&result, 409),
    }
}

fn list_users(db: &DbConn<MemoryBackend>, params: &Params) -> Response {
    let mut query = String::from("SELECT * FROM users");
    if let Some(Some(id)) = params.get("id") {
        query.push_str(&format!(" WHERE id = '{id}'"));
    }
    let limit = params
        .get("limit")
        .and_then(|v| v.as_deref())
        .and_then(|v| v.parse().ok());
    let offset = params
        .get("offset")
        .and_then(|v| v.as_deref())
        .and_then(|v| v.parse().ok());

    Response::json(&db.select_data(&query, limit, offset), 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry::http::{Headers, Method};
    use pretty_assertions::assert_eq;

    fn demo_router() -> (Router, Arc<Encryptor>) {
        let encryptor = Arc::new(Encryptor::new("test key"));
        let backend = MemoryBackend::new();
        backend.create_table("users");
        let db = Arc::new(DbConn::new(backend));
        (build_router(db, Arc::clone(&encryptor)), encryptor)
    }

    #[test]
    fn test_root_route() {
        let (router, _) = demo_router();
        let resp = router.handle(Method::Get, "/api/", Headers::new(), "");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_signup_validation_failure() {
        let (router, _) = demo_router();
        let resp = router.handle(
            Method::Post,
            "/api/user/signup",
            Headers::new(),
            r#"{"name":"ab","email":"not-an-email","password":"short"}"#,
        );
        assert_eq!(resp.status, 422);
        assert!(resp.body.contains("must be at least 3 characters."));
        assert!(resp.body.contains("must be a valid email address."));
    }

    #[test]
    fn test_signup_then_authorized_listing() {
        let (router, _) = demo_router();
        let resp = router.handle(
            Method::Post,
            "/api/user/signup",
            Headers::new(),
            r#"{"name":"ada","email":"ada@example.com","password":"supersecret"}"#,
        );
        assert_eq!(resp.status, 200);
        let body: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        let token = body["token"].as_str().unwrap();

        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        let listing = router.handle(Method::Get, "/api/user/list", headers, "");
        assert_eq!(listing.status, 200);
        assert!(listing.body.contains("ada@example.com"));
    }

    #[test]
    fn test_listing_requires_token() {
        let (router, _) = demo_router();
        let resp = router.handle(Method::Get, "/api/user/list", Headers::new(), "");
        assert_eq!(resp.status, 401);
    }

    #[test]
    fn test_legacy_route_matches_positionally() {
        let (router, _) = demo_router();
        let resp = router.handle(Method::Get, "/api/legacy/users/1", Headers::new(), "");
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_cors_headers_present_on_404() {
        let (router, _) = demo_router();
        let resp = router.handle(Method::Get, "/api/nowhere", Headers::new(), "");
        assert_eq!(
            resp.headers
                .get("Access-Control-Allow-Origin")
                .map(String::as_str),
            Some("*")
        );
    }
}
