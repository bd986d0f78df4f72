//! Error types for the webservice façade.
//!
//! # Design
//! `NetworkError` is the fixed taxonomy every completion and delegate sees.
//! `NoConnectivity`, `Unauthorized` and `NotFound` get dedicated variants
//! because callers branch on them; any other non-2xx status lands in
//! `BadResponseCode`. Transport failures that are not "offline" pass through
//! untouched in `Transport`, and authorization failures keep whatever error
//! the authorization capability produced.
//!
//! `NetworkError` is `Clone` so a single failure can be handed to both the
//! caller's completion and the general error delegate.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Failures reported by a transport before (or instead of) an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The device is not connected to any network.
    #[error("not connected to the internet")]
    NotConnected,

    /// The task was cancelled before it reached a terminal state.
    #[error("task cancelled")]
    Cancelled,

    #[error("request timed out")]
    TimedOut,

    #[error("{0}")]
    Other(String),
}

/// Error produced by an authorization capability, surfaced as-is.
#[derive(Clone)]
pub struct AuthorizationError(Arc<dyn StdError + Send + Sync>);

impl AuthorizationError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// The error the authorization capability returned.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthorizationError").field(&self.0).finish()
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl StdError for AuthorizationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Errors delivered to completions and delegates.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// The resource url could not be turned into a request.
    #[error("a problem with the server address occurred: {0}")]
    InvalidUrl(String),

    /// The caller-supplied parse function rejected an otherwise successful response.
    #[error("can't parse data: {0}")]
    ParseData(String),

    /// The server returned 401.
    #[error("unable to authorize")]
    Unauthorized,

    /// The server returned 404.
    #[error("the requested data does not exist")]
    NotFound,

    /// Any other status outside 200..300, or 0 when there was no usable response.
    #[error("server responded with unexpected response code {0}")]
    BadResponseCode(u16),

    #[error("no internet connection")]
    NoConnectivity,

    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Authorization(AuthorizationError),

    /// A finished download could not be placed in durable storage.
    #[error("unable to store {file_name}: {message}")]
    Storage { file_name: String, message: String },
}
