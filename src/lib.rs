//! gantry: a micro web framework.
//!
//! The pieces compose but stand alone:
//! - [`router`]: route registration with groups and middleware, pattern
//!   matching with brace-style (`{id}`, `{limit?}`) and legacy positional
//!   (`$id`, `$page?`) parameters, first-match dispatch.
//! - [`template`]: a directive template compiler (`{{ expr }}`, `@if`,
//!   `@foreach`, ...) with escaped and raw output.
//! - [`validator`]: pipe-separated field rules producing per-field error
//!   message lists.
//! - [`crypt`]: passphrase-keyed symmetric encryption and signed tokens.
//! - [`db`]: a backend trait plus a JSON-facing connection wrapper that
//!   reports errors as data.
//! - [`serve`]: a hyper adapter that turns the router into an HTTP server.

pub mod controller;
pub mod crypt;
pub mod db;
pub mod error;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod serve;
pub mod template;
pub mod validator;

pub use controller::{ActionRegistry, Controller};
pub use crypt::{check_token, create_token, Encryptor};
pub use error::{CryptoError, DbError, DispatchError, FrameworkError, TemplateError};
pub use http::{Headers, Method, Payload, Request, Response};
pub use middleware::{MiddlewareRegistry, Outcome};
pub use router::pattern::Params;
pub use router::{Action, GroupAttributes, Router};
pub use security::xss_remove;
pub use template::{CompiledTemplate, Engine, Scope, Template};
pub use validator::{validate, Validation};
