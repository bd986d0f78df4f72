//! Client-side networking facade over a pluggable HTTP transport.
//!
//! # Overview
//! Callers describe one operation as a resource (data, download or upload)
//! and hand it to a [`Webservice`]. The webservice builds the request, runs
//! the optional authorization step, creates a transport task tagged with a
//! [`TaskIdentifier`], and tracks it until the transport reports a terminal
//! event. Results come back through a completion closure (data) or the
//! download and upload delegates.
//!
//! The transport itself is a trait: the crate never opens a socket. Tests use
//! [`mock::MockTransport`]; hosts plug in a real HTTP client.
//!
//! # Design
//! - The task description string is the only state the transport keeps for
//!   us. It round-trips through [`TaskIdentifier::encode`] and
//!   [`TaskIdentifier::decode`], so tasks recreated after a restart can be
//!   adopted by `reconcile`.
//! - A correlation id covers both the authorization step and the network
//!   step; cancelling it stops whichever is running.
//! - Everything is callback-driven and thread-safe. Locks are never held while
//!   calling into the transport, a delegate or a caller closure.

pub mod authorization;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod file_store;
pub mod http;
pub mod image_cache;
pub mod mock;
pub mod registry;
pub mod resource;
pub mod task_identifier;
pub mod transport;
pub mod webservice;

pub use authorization::{Authorization, AuthorizationCompletion, BearerToken};
pub use config::WebserviceConfig;
pub use dispatch::classify;
pub use error::{AuthorizationError, NetworkError, TransportError};
pub use file_store::{DirectoryFileStore, FileStore};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use image_cache::{Image, ImageCache, ImageFormat};
pub use resource::{DataResource, DownloadResource, Headers, ImageHook, Resource, ResourceInfo, UploadResource};
pub use task_identifier::{TaskIdentifier, TaskKind};
pub use transport::{DataTaskCompletion, TaskHandle, TaskOutcome, Transport, TransportDelegate};
pub use webservice::{DownloadDelegate, UploadDelegate, Webservice, WebserviceBuilder, WebserviceDelegate};
