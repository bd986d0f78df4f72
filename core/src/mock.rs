//! Deterministic in-process `Transport` for tests.
//!
//! # Design
//! Responses are canned per url. In immediate mode a task runs its whole
//! event sequence synchronously inside `resume()`; in manual mode tasks stay
//! outstanding until `complete_pending()`, which is how tests observe
//! in-flight state, cancellation and restart reconciliation.
//!
//! Event order per task follows a real transport: chunks, then
//! finished-downloading, then the terminal event. A url without a canned
//! response answers 200 with no body.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{DataTaskCompletion, TaskHandle, TaskOutcome, Transport, TransportDelegate};

/// What the mock answers for one url.
#[derive(Debug, Clone, Default)]
pub struct CannedResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    chunks: Option<Vec<Vec<u8>>>,
    error: Option<TransportError>,
}

impl CannedResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200).with_body(body)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A transport-level failure with no response.
    pub fn error(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Neither a response nor an error.
    pub fn no_response() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Deliver the body as these chunks instead of one piece.
    pub fn with_chunks<I, C>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.chunks = Some(chunks.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Combine a response with a transport error, e.g. offline with a stale response.
    pub fn with_error(mut self, error: TransportError) -> Self {
        self.error = Some(error);
        self
    }

    fn chunks(&self) -> Vec<Vec<u8>> {
        match (&self.chunks, &self.body) {
            (Some(chunks), _) => chunks.clone(),
            (None, Some(body)) => vec![body.clone()],
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Immediate,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Suspended,
    Running,
    Cancelled,
    Completed,
}

enum MockTaskKind {
    Data(Mutex<Option<DataTaskCompletion>>),
    Download,
    Upload(PathBuf),
}

struct MockTask {
    task_id: u64,
    request: HttpRequest,
    kind: MockTaskKind,
    description: Mutex<Option<String>>,
    response: Mutex<Option<HttpResponse>>,
    state: Mutex<TaskState>,
    transport: Weak<Inner>,
}

impl TaskHandle for MockTask {
    fn task_id(&self) -> u64 {
        self.task_id
    }

    fn original_request(&self) -> &HttpRequest {
        &self.request
    }

    fn response(&self) -> Option<HttpResponse> {
        self.response.lock().clone()
    }

    fn task_description(&self) -> Option<String> {
        self.description.lock().clone()
    }

    fn set_task_description(&self, description: String) {
        *self.description.lock() = Some(description);
    }

    fn resume(&self) {
        {
            let mut state = self.state.lock();
            if *state == TaskState::Suspended {
                *state = TaskState::Running;
            }
        }
        if let Some(inner) = self.transport.upgrade() {
            if inner.delivery == Delivery::Immediate {
                inner.deliver(self);
            }
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if *state == TaskState::Completed {
            return;
        }
        *state = TaskState::Cancelled;
        drop(state);
        if let Some(inner) = self.transport.upgrade() {
            inner.state.lock().cancelled.insert(self.task_id);
        }
    }
}

#[derive(Default)]
struct State {
    canned: HashMap<String, CannedResponse>,
    outstanding: Vec<Arc<MockTask>>,
    requests: Vec<HttpRequest>,
    uploaded: Vec<Vec<u8>>,
    cancelled: HashSet<u64>,
    cookies_cleared: usize,
}

struct Inner {
    delivery: Delivery,
    background: bool,
    temp_dir: PathBuf,
    next_task_id: AtomicU64,
    state: Mutex<State>,
    delegate: Mutex<Option<Weak<dyn TransportDelegate>>>,
}

impl Inner {
    fn delegate(&self) -> Option<Arc<dyn TransportDelegate>> {
        self.delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Run the task's event sequence. No lock is held while calling out.
    fn deliver(&self, task: &MockTask) {
        let cancelled = {
            let mut state = task.state.lock();
            match *state {
                TaskState::Completed | TaskState::Suspended => return,
                TaskState::Cancelled => {
                    *state = TaskState::Completed;
                    true
                }
                TaskState::Running => {
                    *state = TaskState::Completed;
                    false
                }
            }
        };

        let canned = {
            let mut state = self.state.lock();
            state.outstanding.retain(|t| t.task_id != task.task_id);
            if cancelled {
                CannedResponse::error(TransportError::Cancelled)
            } else {
                state
                    .canned
                    .get(task.request.url.as_str())
                    .cloned()
                    .unwrap_or_else(|| CannedResponse::status(200))
            }
        };
        debug!("mock transport completing task {} ({})", task.task_id, task.request.url);

        *task.response.lock() = canned.status.map(|status| HttpResponse {
            status,
            url: Some(task.request.url.clone()),
            headers: canned.headers.clone(),
        });

        match &task.kind {
            MockTaskKind::Data(completion) => {
                let completion = completion.lock().take();
                if let Some(completion) = completion {
                    let outcome = TaskOutcome {
                        body: canned.body.clone(),
                        response: task.response(),
                        error: canned.error.clone(),
                    };
                    completion(task, outcome);
                }
            }
            MockTaskKind::Download => {
                let delegate = self.delegate();
                if canned.error.is_none() {
                    let location = self.temp_dir.join(format!("mock-{}-{}.tmp", Uuid::new_v4(), task.task_id));
                    let written = fs::create_dir_all(&self.temp_dir)
                        .and_then(|_| fs::write(&location, canned.body.as_deref().unwrap_or_default()));
                    match written {
                        Ok(()) => {
                            if let Some(delegate) = &delegate {
                                delegate.did_finish_downloading(task, &location);
                            }
                            let _ = fs::remove_file(&location);
                        }
                        Err(e) => debug!("mock transport could not write {}: {e}", location.display()),
                    }
                }
                if let Some(delegate) = delegate {
                    delegate.did_complete(task, canned.error.clone());
                }
            }
            MockTaskKind::Upload(file) => {
                let mut error = canned.error.clone();
                if error.is_none() {
                    match fs::read(file) {
                        Ok(bytes) => self.state.lock().uploaded.push(bytes),
                        Err(e) => {
                            *task.response.lock() = None;
                            error = Some(TransportError::Other(format!("unable to read {}: {e}", file.display())));
                        }
                    }
                }
                let delegate = self.delegate();
                if let Some(delegate) = delegate {
                    if error.is_none() {
                        for chunk in canned.chunks() {
                            delegate.did_receive_data(task, &chunk);
                        }
                    }
                    delegate.did_complete(task, error);
                }
            }
        }
    }
}

/// In-process transport answering from canned responses.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Tasks complete synchronously when resumed.
    pub fn new() -> Self {
        Self::with_delivery(Delivery::Immediate, false)
    }

    /// Tasks stay outstanding until `complete_pending`.
    pub fn manual() -> Self {
        Self::with_delivery(Delivery::Manual, false)
    }

    /// A manual transport whose tasks survive restarts.
    pub fn background() -> Self {
        Self::with_delivery(Delivery::Manual, true)
    }

    fn with_delivery(delivery: Delivery, background: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                delivery,
                background,
                temp_dir: std::env::temp_dir().join("webservice-mock-transport"),
                next_task_id: AtomicU64::new(1),
                state: Mutex::new(State::default()),
                delegate: Mutex::new(None),
            }),
        }
    }

    /// Answer requests to `url` with `response`.
    pub fn respond(&self, url: &str, response: CannedResponse) {
        self.inner.state.lock().canned.insert(url.to_string(), response);
    }

    /// Register a running task as if the transport recreated it after a restart.
    pub fn seed_outstanding(&self, request: HttpRequest, description: Option<String>) -> Arc<dyn TaskHandle> {
        let task = self.make_task(request, MockTaskKind::Download);
        *task.description.lock() = description;
        *task.state.lock() = TaskState::Running;
        task
    }

    /// Deliver every resumed task. Returns how many completed.
    pub fn complete_pending(&self) -> usize {
        let pending: Vec<Arc<MockTask>> = self
            .inner
            .state
            .lock()
            .outstanding
            .iter()
            .filter(|task| matches!(*task.state.lock(), TaskState::Running | TaskState::Cancelled))
            .cloned()
            .collect();
        for task in &pending {
            self.inner.deliver(task);
        }
        pending.len()
    }

    /// Report that all background events were delivered.
    pub fn finish_background_events(&self) {
        if let Some(delegate) = self.inner.delegate() {
            delegate.did_finish_background_events();
        }
    }

    pub fn is_cancelled(&self, task_id: u64) -> bool {
        self.inner.state.lock().cancelled.contains(&task_id)
    }

    /// Every request handed to the transport, in creation order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.state.lock().requests.clone()
    }

    /// File contents read by completed upload tasks.
    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().uploaded.clone()
    }

    pub fn cookies_cleared(&self) -> usize {
        self.inner.state.lock().cookies_cleared
    }

    pub fn temp_dir(&self) -> &Path {
        &self.inner.temp_dir
    }

    fn make_task(&self, request: HttpRequest, kind: MockTaskKind) -> Arc<MockTask> {
        let task = Arc::new(MockTask {
            task_id: self.inner.next_task_id.fetch_add(1, Ordering::Relaxed),
            request: request.clone(),
            kind,
            description: Mutex::new(None),
            response: Mutex::new(None),
            state: Mutex::new(TaskState::Suspended),
            transport: Arc::downgrade(&self.inner),
        });
        let mut state = self.inner.state.lock();
        state.requests.push(request);
        state.outstanding.push(Arc::clone(&task));
        task
    }
}

impl Transport for MockTransport {
    fn data_task(&self, request: HttpRequest, completion: DataTaskCompletion) -> Arc<dyn TaskHandle> {
        self.make_task(request, MockTaskKind::Data(Mutex::new(Some(completion))))
    }

    fn download_task(&self, request: HttpRequest) -> Arc<dyn TaskHandle> {
        self.make_task(request, MockTaskKind::Download)
    }

    fn upload_task(&self, request: HttpRequest, file: PathBuf) -> Arc<dyn TaskHandle> {
        self.make_task(request, MockTaskKind::Upload(file))
    }

    fn all_tasks(&self) -> Vec<Arc<dyn TaskHandle>> {
        self.inner
            .state
            .lock()
            .outstanding
            .iter()
            .map(|task| Arc::clone(task) as Arc<dyn TaskHandle>)
            .collect()
    }

    fn set_delegate(&self, delegate: Weak<dyn TransportDelegate>) {
        *self.inner.delegate.lock() = Some(delegate);
    }

    fn clear_cookies(&self) {
        self.inner.state.lock().cookies_cleared += 1;
    }

    fn is_background(&self) -> bool {
        self.inner.background
    }
}
