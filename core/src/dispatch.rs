//! Terminal-event handling per task kind.
//!
//! # Design
//! `classify` maps a transport result onto the fixed error taxonomy, in
//! priority order: offline, other transport errors, missing response, 401,
//! 404, any other non-2xx status.
//!
//! Data tasks finish through their completion closure. Download and upload
//! tasks finish through the `TransportDelegate` impl below:
//!
//! - finished downloading: move the temp file into the file store; on
//!   failure remove any partial file and report a storage error.
//! - data received (uploads): append to the per-task response buffer.
//! - completed: drop the registry entry, then report errors or upload success
//!   with the buffered response. A failed download only removes the file when
//!   this task itself got as far as placing it.
//!
//! Every task this crate creates carries a task identifier; a task without
//! one means that invariant is broken and the handlers panic.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{NetworkError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::resource::DataResource;
use crate::task_identifier::{TaskIdentifier, TaskKind};
use crate::transport::{TaskHandle, TaskOutcome, TransportDelegate};
use crate::webservice::Webservice;

/// Map a transport result onto `NetworkError`. `Ok` means a 2xx response.
pub fn classify(response: Option<&HttpResponse>, error: Option<&TransportError>) -> Result<(), NetworkError> {
    match error {
        Some(TransportError::NotConnected) => return Err(NetworkError::NoConnectivity),
        Some(error) => return Err(NetworkError::Transport(error.clone())),
        None => {}
    }
    let Some(response) = response else {
        return Err(NetworkError::BadResponseCode(0));
    };
    match response.status {
        401 => Err(NetworkError::Unauthorized),
        404 => Err(NetworkError::NotFound),
        status if !response.is_success() => Err(NetworkError::BadResponseCode(status)),
        _ => Ok(()),
    }
}

fn identifier_of(task: &dyn TaskHandle) -> TaskIdentifier {
    match TaskIdentifier::from_description(task.task_description().as_deref()) {
        Some(identifier) => identifier,
        None => panic!(
            "transport task {} carries no task identifier (description: {:?})",
            task.task_id(),
            task.task_description()
        ),
    }
}

impl Webservice {
    pub(crate) fn finish_data_task<T, F>(
        &self,
        resource: &DataResource<T>,
        request: &HttpRequest,
        task: &dyn TaskHandle,
        outcome: TaskOutcome,
        completion: F,
    ) where
        F: FnOnce(Result<Option<T>, NetworkError>, Option<HttpResponse>),
    {
        let identifier = identifier_of(task);
        self.registry.finish(identifier.id, task.task_id());

        let TaskOutcome { body, response, error } = outcome;
        if let Err(error) = classify(response.as_ref(), error.as_ref()) {
            debug!("data task {} failed: {error}", identifier.id);
            completion(Err(error.clone()), response);
            if let Some(delegate) = self.delegate() {
                delegate.did_fail(&error, request, body.as_deref(), &identifier);
            }
            return;
        }

        let body = match body {
            Some(body) if !body.is_empty() => body,
            _ => return completion(Ok(None), response),
        };

        match resource.parse(&body) {
            Ok(value) => {
                if let (Some(hook), Some(value)) = (resource.image_hook(), value.as_ref()) {
                    if let Some(image) = (hook.to_image)(value) {
                        self.image_cache.add(resource.info().url(), image);
                    }
                }
                completion(Ok(value), response);
            }
            Err(e) => completion(Err(NetworkError::ParseData(e.to_string())), response),
        }
    }

    fn append_upload_data(&self, id: Uuid, data: &[u8]) {
        let mut buffers = self.upload_buffers.lock();
        let buffer = buffers.entry(id).or_default();
        let room = match self.config.max_upload_response_bytes {
            Some(cap) => cap.saturating_sub(buffer.data.len()),
            None => data.len(),
        };
        if room < data.len() && !buffer.truncated {
            buffer.truncated = true;
            warn!("upload {id} response exceeds the buffer cap, dropping the rest");
        }
        buffer.data.extend_from_slice(&data[..room.min(data.len())]);
    }

    fn take_upload_data(&self, id: Uuid) -> Option<Vec<u8>> {
        self.upload_buffers.lock().remove(&id).map(|buffer| buffer.data)
    }

    /// Best effort; a failure only gets logged.
    fn remove_partial_download(&self, file_name: &str) {
        if let Err(e) = self.file_store.remove(file_name) {
            warn!("unable to remove partial download {file_name}: {e}");
        }
    }
}

impl TransportDelegate for Webservice {
    fn did_receive_data(&self, task: &dyn TaskHandle, data: &[u8]) {
        match TaskIdentifier::from_description(task.task_description().as_deref()) {
            Some(identifier) if identifier.kind == TaskKind::Upload => self.append_upload_data(identifier.id, data),
            _ => {}
        }
    }

    fn did_finish_downloading(&self, task: &dyn TaskHandle, location: &Path) {
        let identifier = identifier_of(task);
        let Some(file_name) = identifier.auxiliary.as_deref() else {
            panic!("download task {} carries no file name", identifier.id);
        };
        // a non-2xx body is not the requested file; did_complete reports it
        if classify(task.response().as_ref(), None).is_err() {
            return;
        }

        let url = task.original_request().url.to_string();
        self.placements.lock().insert((identifier.id, task.task_id()));
        match self.file_store.move_into(location, file_name) {
            Ok(path) => {
                debug!("download {} stored at {}", identifier.id, path.display());
                if let Some(delegate) = self.download_delegate() {
                    delegate.did_finish_download(&url, &path, file_name, &identifier);
                }
            }
            Err(e) => {
                self.remove_partial_download(file_name);
                let error = NetworkError::Storage {
                    file_name: file_name.to_string(),
                    message: e.to_string(),
                };
                if let Some(delegate) = self.download_delegate() {
                    delegate.did_error_download(&url, &error, &identifier);
                }
            }
        }
    }

    fn did_complete(&self, task: &dyn TaskHandle, error: Option<TransportError>) {
        let identifier = identifier_of(task);
        self.registry.finish(identifier.id, task.task_id());
        let data = self.take_upload_data(identifier.id);
        let placed = self.placements.lock().remove(&(identifier.id, task.task_id()));
        let url = task.original_request().url.to_string();

        if let Err(error) = classify(task.response().as_ref(), error.as_ref()) {
            debug!("{} task {} failed: {error}", identifier.kind, identifier.id);
            match identifier.kind {
                TaskKind::Download => {
                    // only a file this task placed; an earlier download under the same name stays
                    if let (true, Some(file_name)) = (placed, identifier.auxiliary.as_deref()) {
                        self.remove_partial_download(file_name);
                    }
                    if let Some(delegate) = self.download_delegate() {
                        delegate.did_error_download(&url, &error, &identifier);
                    }
                }
                TaskKind::Upload => {
                    if let Some(delegate) = self.upload_delegate() {
                        delegate.did_error_upload(&url, &error, &identifier, data);
                    }
                }
                TaskKind::Data => {}
            }
            return;
        }

        if identifier.kind == TaskKind::Upload {
            let Some(file_path) = identifier.auxiliary.as_deref().map(PathBuf::from) else {
                panic!("upload task {} carries no file path", identifier.id);
            };
            if let Some(delegate) = self.upload_delegate() {
                delegate.did_finish_upload(&url, &file_path, &identifier, data);
            }
        }
    }

    fn did_finish_background_events(&self) {
        if !self.transfer_session().is_background() {
            return;
        }
        info!("background transfers finished");
        let handler = self.background_completion.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> HttpResponse {
        HttpResponse::new(status)
    }

    #[test]
    fn success_statuses_classify_ok() {
        assert!(classify(Some(&response(200)), None).is_ok());
        assert!(classify(Some(&response(204)), None).is_ok());
    }

    #[test]
    fn status_codes_map_to_dedicated_variants() {
        assert!(matches!(classify(Some(&response(401)), None), Err(NetworkError::Unauthorized)));
        assert!(matches!(classify(Some(&response(404)), None), Err(NetworkError::NotFound)));
        assert!(matches!(
            classify(Some(&response(500)), None),
            Err(NetworkError::BadResponseCode(500))
        ));
        assert!(matches!(
            classify(Some(&response(304)), None),
            Err(NetworkError::BadResponseCode(304))
        ));
    }

    #[test]
    fn missing_response_is_code_zero() {
        assert!(matches!(classify(None, None), Err(NetworkError::BadResponseCode(0))));
    }

    #[test]
    fn offline_wins_over_a_present_response() {
        let err = classify(Some(&response(200)), Some(&TransportError::NotConnected)).unwrap_err();
        assert!(matches!(err, NetworkError::NoConnectivity));
    }

    #[test]
    fn other_transport_errors_pass_through() {
        let err = classify(Some(&response(404)), Some(&TransportError::TimedOut)).unwrap_err();
        assert!(matches!(err, NetworkError::Transport(TransportError::TimedOut)));
    }
}
