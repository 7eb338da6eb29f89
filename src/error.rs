//! Error types for all request-handling phases.

use thiserror::Error;

/// Dispatch errors: a matched route whose action or middleware configuration
/// cannot be resolved. These are the only framework errors that propagate out
/// of resolution; everything else is surfaced as response data.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no action registered for '{0}'")]
    UnresolvedAction(String),

    #[error("invalid route action '{0}': expected a handler or a 'Controller@method' string")]
    InvalidAction(String),

    #[error("middleware '{0}' is not registered")]
    UnknownMiddleware(String),
}

/// Template compilation and rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unclosed output tag")]
    UnclosedTag,

    #[error("unclosed @{0} block")]
    UnclosedBlock(&'static str),

    #[error("unexpected @{0} outside of a block")]
    UnexpectedDirective(String),

    #[error("invalid @{directive} argument '{arg}'")]
    InvalidArgument { directive: &'static str, arg: String },

    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),

    #[error("@while exceeded {0} iterations")]
    LoopLimit(usize),

    #[error("view '{0}' not found in {1}")]
    ViewNotFound(String, String),

    #[error("failed to read view: {0}")]
    Io(#[from] std::io::Error),
}

/// Encryption, decryption and token errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("ciphertext too short or not block-aligned")]
    InvalidCiphertext,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed token")]
    MalformedToken,

    #[error("token expired")]
    TokenExpired,
}

/// Database backend errors. Converted to `{"error": message}` values at the
/// `DbConn` boundary instead of propagating further.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("duplicate entry")]
    Duplicate,

    #[error("{0}")]
    Backend(String),
}

/// Umbrella error for callers that mix framework phases.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Db(#[from] DbError),
}
