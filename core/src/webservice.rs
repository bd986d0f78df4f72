//! The owner object coordinating resources, authorization and transports.
//!
//! # Design
//! `Webservice` owns the task registry, the upload response buffers and the
//! image cache; nothing outside it mutates them. It is always handled through
//! an `Arc` so transport callbacks can hold a `Weak` back-reference and
//! silently drop events that arrive after the owner is gone.
//!
//! Data requests run on the foreground transport. Downloads and uploads run
//! on the background transport when one is configured, otherwise on the
//! foreground transport as well.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::authorization::Authorization;
use crate::config::WebserviceConfig;
use crate::error::NetworkError;
use crate::file_store::FileStore;
use crate::http::{HttpRequest, HttpResponse};
use crate::image_cache::ImageCache;
use crate::resource::{DataResource, DownloadResource, Resource, UploadResource};
use crate::registry::TaskRegistry;
use crate::task_identifier::TaskIdentifier;
use crate::transport::{TaskHandle, Transport, TransportDelegate};

/// Receives every failed data request in addition to its completion.
pub trait WebserviceDelegate: Send + Sync {
    fn did_fail(&self, error: &NetworkError, request: &HttpRequest, data: Option<&[u8]>, task: &TaskIdentifier);
}

pub trait DownloadDelegate: Send + Sync {
    /// The download for `url` now lives at `location` under `file_name`.
    fn did_finish_download(&self, url: &str, location: &Path, file_name: &str, task: &TaskIdentifier);

    fn did_error_download(&self, url: &str, error: &NetworkError, task: &TaskIdentifier);
}

pub trait UploadDelegate: Send + Sync {
    /// `data` holds the response body accumulated while uploading, if any.
    fn did_finish_upload(&self, url: &str, file_path: &Path, task: &TaskIdentifier, data: Option<Vec<u8>>);

    fn did_error_upload(&self, url: &str, error: &NetworkError, task: &TaskIdentifier, data: Option<Vec<u8>>);
}

#[derive(Debug, Default)]
pub(crate) struct UploadBuffer {
    pub(crate) data: Vec<u8>,
    pub(crate) truncated: bool,
}

pub struct WebserviceBuilder {
    config: WebserviceConfig,
    session: Arc<dyn Transport>,
    background: Option<Arc<dyn Transport>>,
    file_store: Arc<dyn FileStore>,
    authorization: Option<Arc<dyn Authorization>>,
}

impl WebserviceBuilder {
    pub fn config(mut self, config: WebserviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Run downloads and uploads on `transport` instead of the foreground one.
    pub fn background_session(mut self, transport: Arc<dyn Transport>) -> Self {
        self.background = Some(transport);
        self
    }

    pub fn authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.authorization = Some(authorization);
        self
    }

    pub fn build(self) -> Arc<Webservice> {
        let WebserviceBuilder {
            config,
            session,
            background,
            file_store,
            authorization,
        } = self;

        let webservice = Arc::new_cyclic(|weak: &Weak<Webservice>| {
            let delegate: Weak<dyn TransportDelegate> = weak.clone();
            session.set_delegate(delegate.clone());
            if let Some(background) = &background {
                background.set_delegate(delegate);
            }
            Webservice {
                image_cache: ImageCache::new(config.image_cache_capacity),
                config,
                session,
                background,
                file_store,
                authorization,
                registry: TaskRegistry::new(),
                upload_buffers: Mutex::new(HashMap::new()),
                placements: Mutex::new(HashSet::new()),
                delegate: Mutex::new(None),
                download_delegate: Mutex::new(None),
                upload_delegate: Mutex::new(None),
                background_completion: Mutex::new(None),
            }
        });

        if webservice.config.reconcile_on_start {
            webservice.reconcile();
        }
        webservice
    }
}

pub struct Webservice {
    pub(crate) config: WebserviceConfig,
    pub(crate) session: Arc<dyn Transport>,
    pub(crate) background: Option<Arc<dyn Transport>>,
    pub(crate) file_store: Arc<dyn FileStore>,
    authorization: Option<Arc<dyn Authorization>>,
    pub(crate) registry: TaskRegistry,
    pub(crate) upload_buffers: Mutex<HashMap<Uuid, UploadBuffer>>,
    /// Downloads (correlation id, transport task id) that tried to write into the file store.
    pub(crate) placements: Mutex<HashSet<(Uuid, u64)>>,
    pub(crate) image_cache: ImageCache,
    delegate: Mutex<Option<Weak<dyn WebserviceDelegate>>>,
    download_delegate: Mutex<Option<Weak<dyn DownloadDelegate>>>,
    upload_delegate: Mutex<Option<Weak<dyn UploadDelegate>>>,
    pub(crate) background_completion: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Webservice {
    pub fn builder(session: Arc<dyn Transport>, file_store: Arc<dyn FileStore>) -> WebserviceBuilder {
        WebserviceBuilder {
            config: WebserviceConfig::default(),
            session,
            background: None,
            file_store,
            authorization: None,
        }
    }

    // ---------------------------------------------------------------------
    // Delegates
    // ---------------------------------------------------------------------

    /// Delegates are held weakly.
    pub fn set_delegate<D: WebserviceDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn WebserviceDelegate> = weak;
        *self.delegate.lock() = Some(weak);
    }

    pub fn set_download_delegate<D: DownloadDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn DownloadDelegate> = weak;
        *self.download_delegate.lock() = Some(weak);
    }

    pub fn set_upload_delegate<D: UploadDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn UploadDelegate> = weak;
        *self.upload_delegate.lock() = Some(weak);
    }

    /// Called once when the background transport has delivered all its events.
    pub fn set_background_completion_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.background_completion.lock() = Some(Box::new(handler));
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn WebserviceDelegate>> {
        self.delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn download_delegate(&self) -> Option<Arc<dyn DownloadDelegate>> {
        self.download_delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn upload_delegate(&self) -> Option<Arc<dyn UploadDelegate>> {
        self.upload_delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Issue a data request. `completion` receives `Ok(None)` when the
    /// response carried no body, e.g. after a DELETE.
    pub fn load_data<T, F>(self: &Arc<Self>, resource: &DataResource<T>, completion: F)
    where
        T: 'static,
        F: FnOnce(Result<Option<T>, NetworkError>, Option<HttpResponse>) + Send + 'static,
    {
        let request = match resource.info().build_request(resource.body().map(<[u8]>::to_vec)) {
            Ok(request) => request,
            Err(error) => return completion(Err(error), None),
        };

        if let Some(hook) = resource.image_hook() {
            if let Some(image) = self.image_cache.get(resource.info().url()) {
                debug!("serving {} from the image cache", resource.info().url());
                return completion(Ok(Some((hook.from_image)(&image))), None);
            }
        }

        let owned = resource.clone();
        self.authorize_then(request, resource, move |this, authorized| match authorized {
            Ok(request) => this.start_data_task(owned, request, completion),
            Err(error) => completion(Err(error), None),
        });
    }

    /// `load_data` without the response metadata.
    pub fn load_data_result<T, F>(self: &Arc<Self>, resource: &DataResource<T>, completion: F)
    where
        T: 'static,
        F: FnOnce(Result<Option<T>, NetworkError>) + Send + 'static,
    {
        self.load_data(resource, move |result, _| completion(result));
    }

    /// Start a download. Progress and results go to the download delegate;
    /// `on_preparation_error` only fires when no transport task could be created.
    pub fn load_download<F>(self: &Arc<Self>, resource: &DownloadResource, on_preparation_error: F)
    where
        F: FnOnce(NetworkError) + Send + 'static,
    {
        let request = match resource.info().build_request(resource.body().map(<[u8]>::to_vec)) {
            Ok(request) => request,
            Err(error) => return on_preparation_error(error),
        };
        let identifier = resource.task_identifier();
        self.authorize_then(request, resource, move |this, authorized| match authorized {
            Ok(request) => {
                let handle = this.transfer_session().download_task(request);
                this.start(identifier, handle);
            }
            Err(error) => on_preparation_error(error),
        });
    }

    /// Start an upload of the resource's file. Results go to the upload delegate.
    pub fn load_upload<F>(self: &Arc<Self>, resource: &UploadResource, on_preparation_error: F)
    where
        F: FnOnce(NetworkError) + Send + 'static,
    {
        let request = match resource.info().build_request(None) {
            Ok(request) => request,
            Err(error) => return on_preparation_error(error),
        };
        let identifier = resource.task_identifier();
        let file = resource.file_path().to_path_buf();
        self.authorize_then(request, resource, move |this, authorized| match authorized {
            Ok(request) => {
                let handle = this.transfer_session().upload_task(request, file);
                this.start(identifier, handle);
            }
            Err(error) => on_preparation_error(error),
        });
    }

    /// Runs the authorization step when the resource needs it and hands the
    /// outcome to `next`. The step is registered under the resource's
    /// correlation id so `cancel_task` also cancels it; an outcome arriving
    /// after cancellation is dropped.
    fn authorize_then<N>(self: &Arc<Self>, request: HttpRequest, resource: &dyn Resource, next: N)
    where
        N: FnOnce(&Arc<Self>, Result<HttpRequest, NetworkError>) + Send + 'static,
    {
        let info = resource.info();
        if !info.authorization_needed() {
            return next(self, Ok(request));
        }
        let Some(authorization) = self.authorization.clone() else {
            panic!(
                "{} requires authorization but no authorization capability is configured",
                info.url()
            );
        };

        let id = info.id();
        self.registry.begin_authorization(id, info.url(), resource.task_identifier());
        let this = Arc::downgrade(self);
        authorization.authorize(
            request,
            info,
            Box::new(move |result| {
                let Some(this) = this.upgrade() else {
                    return;
                };
                if !this.registry.end_authorization(id) {
                    debug!("task {id} was cancelled during authorization");
                    return;
                }
                next(&this, result.map_err(NetworkError::Authorization));
            }),
        );
    }

    fn start_data_task<T, F>(self: &Arc<Self>, resource: DataResource<T>, request: HttpRequest, completion: F)
    where
        T: 'static,
        F: FnOnce(Result<Option<T>, NetworkError>, Option<HttpResponse>) + Send + 'static,
    {
        let identifier = resource.task_identifier();
        let sent = request.clone();
        let this = Arc::downgrade(self);
        let handle = self.session.data_task(
            request,
            Box::new(move |task, outcome| {
                if let Some(this) = this.upgrade() {
                    this.finish_data_task(&resource, &sent, task, outcome, completion);
                }
            }),
        );
        self.start(identifier, handle);
    }

    /// Tag, register, then resume. Registration precedes `resume` so that a
    /// task completing synchronously still finds its entry.
    fn start(&self, identifier: TaskIdentifier, handle: Arc<dyn TaskHandle>) {
        handle.set_task_description(identifier.encode());
        self.registry.start(identifier.id, Arc::clone(&handle));
        debug!("starting {} task {}", identifier.kind, identifier.id);
        handle.resume();
    }

    pub(crate) fn transfer_session(&self) -> &Arc<dyn Transport> {
        self.background.as_ref().unwrap_or(&self.session)
    }

    fn sessions(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        std::iter::once(&self.session).chain(self.background.iter())
    }

    // ---------------------------------------------------------------------
    // Registry surface
    // ---------------------------------------------------------------------

    /// Cancel the task (or pending authorization) for `id`. Unknown ids are ignored.
    pub fn cancel_task(&self, id: Uuid) {
        self.registry.cancel(id);
    }

    pub fn is_task_active(&self, id: Uuid) -> bool {
        self.registry.is_active(id)
    }

    pub fn is_task_active_for_url(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| self.registry.is_active_for_url(&url))
    }

    /// Whether a download into `file_name` is in flight.
    pub fn is_task_active_for_file_name(&self, file_name: &str) -> bool {
        self.registry.is_active_for_auxiliary(file_name)
    }

    /// Adopt tasks the transports kept across a restart. Returns how many were adopted.
    pub fn reconcile(&self) -> usize {
        self.sessions()
            .map(|session| self.registry.reconcile(&**session))
            .sum()
    }

    /// Cancel all work, empty the image cache and drop the transports' cookies.
    pub fn reset(&self) {
        self.registry.cancel_all();
        for session in self.sessions() {
            for task in session.all_tasks() {
                task.cancel();
            }
            session.clear_cookies();
        }
        self.image_cache.invalidate();
        info!("webservice reset");
    }

    pub fn image_cache(&self) -> &ImageCache {
        &self.image_cache
    }

    pub fn file_store(&self) -> &Arc<dyn FileStore> {
        &self.file_store
    }

    pub fn config(&self) -> &WebserviceConfig {
        &self.config
    }
}
