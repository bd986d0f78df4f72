//! Contract between the façade and the HTTP transport that executes tasks.
//!
//! # Design
//! The transport owns all network I/O and runs it on its own workers. It
//! hands out suspended `TaskHandle`s; the façade tags each handle with an
//! encoded `TaskIdentifier`, registers it, and only then resumes it, so a
//! transport that finishes instantly still finds the registration in place.
//!
//! Data tasks report through a completion closure. Download and upload tasks
//! report through the `TransportDelegate`, because a background transport
//! may deliver their events to a different process incarnation than the one
//! that created them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Result of a data task.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub body: Option<Vec<u8>>,
    pub response: Option<HttpResponse>,
    pub error: Option<TransportError>,
}

pub type DataTaskCompletion = Box<dyn FnOnce(&dyn TaskHandle, TaskOutcome) + Send>;

/// One cancellable unit of transport work.
pub trait TaskHandle: Send + Sync {
    /// Unique among all tasks of the transport that created it.
    fn task_id(&self) -> u64;

    fn original_request(&self) -> &HttpRequest;

    /// Response metadata, once headers have been received.
    fn response(&self) -> Option<HttpResponse>;

    fn task_description(&self) -> Option<String>;

    fn set_task_description(&self, description: String);

    fn resume(&self);

    /// Best effort; the task still delivers a terminal event.
    fn cancel(&self);
}

/// Receives download and upload events.
pub trait TransportDelegate: Send + Sync {
    /// A chunk of response body arrived for an upload or data task.
    fn did_receive_data(&self, task: &dyn TaskHandle, data: &[u8]);

    /// The body of a download task is complete at `location`. The file is
    /// deleted by the transport once this returns.
    fn did_finish_downloading(&self, task: &dyn TaskHandle, location: &Path);

    /// Terminal event for download and upload tasks.
    fn did_complete(&self, task: &dyn TaskHandle, error: Option<TransportError>);

    /// Every event queued for a background transport has been delivered.
    fn did_finish_background_events(&self);
}

pub trait Transport: Send + Sync {
    fn data_task(&self, request: HttpRequest, completion: DataTaskCompletion) -> Arc<dyn TaskHandle>;

    fn download_task(&self, request: HttpRequest) -> Arc<dyn TaskHandle>;

    /// Streams `file` as the request body.
    fn upload_task(&self, request: HttpRequest, file: PathBuf) -> Arc<dyn TaskHandle>;

    /// Every task the transport still considers outstanding.
    fn all_tasks(&self) -> Vec<Arc<dyn TaskHandle>>;

    fn set_delegate(&self, delegate: Weak<dyn TransportDelegate>);

    fn clear_cookies(&self) {}

    /// Whether tasks and their descriptions survive a process restart.
    fn is_background(&self) -> bool {
        false
    }
}
