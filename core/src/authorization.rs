//! Pluggable authorization step run before a resource reaches the transport.
//!
//! The capability receives the built request and the resource's shared
//! surface, including its correlation id. Cancelling that id while the
//! capability is still working drops the result: no transport task is
//! created for it.

use crate::error::AuthorizationError;
use crate::http::HttpRequest;
use crate::resource::ResourceInfo;

pub type AuthorizationCompletion = Box<dyn FnOnce(Result<HttpRequest, AuthorizationError>) + Send>;

pub trait Authorization: Send + Sync {
    /// Decorate `request` (typically with an `Authorization` header) and call
    /// `completion` exactly once, from any thread.
    fn authorize(&self, request: HttpRequest, resource: &ResourceInfo, completion: AuthorizationCompletion);
}

/// Adds a fixed bearer token to every request.
#[derive(Debug, Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Authorization for BearerToken {
    fn authorize(&self, mut request: HttpRequest, _resource: &ResourceInfo, completion: AuthorizationCompletion) {
        request.set_header("Authorization", format!("Bearer {}", self.token));
        completion(Ok(request));
    }
}
