//! Live map from correlation id to in-flight work.
//!
//! # Design
//! An entry is either `Authorizing` (the authorization capability is still
//! working and no transport task exists yet) or `Running` with the
//! transport handle. Cancelling removes either kind, so an authorization that
//! resolves for a cancelled id is dropped by `end_authorization`.
//!
//! Terminal removal goes through `finish`, which only removes the entry if it
//! still holds the handle that terminated. The terminal event of a cancelled
//! or replaced task therefore never evicts a newer entry with the same id.
//!
//! Each entry caches the url, auxiliary value and transport task id it was
//! registered with, so lookups never call into a task handle while the lock
//! is held. Handles are only touched (cancelled) after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::task_identifier::TaskIdentifier;
use crate::transport::{TaskHandle, Transport};

enum State {
    Authorizing,
    Running { task_id: u64, handle: Arc<dyn TaskHandle> },
}

struct Entry {
    url: Option<Url>,
    auxiliary: Option<String>,
    state: State,
}

impl Entry {
    /// Snapshot a handle's identity. Call without holding the registry lock.
    fn running(handle: Arc<dyn TaskHandle>, identifier: Option<&TaskIdentifier>) -> Self {
        let auxiliary = match identifier {
            Some(identifier) => identifier.auxiliary.clone(),
            None => TaskIdentifier::from_description(handle.task_description().as_deref())
                .and_then(|identifier| identifier.auxiliary),
        };
        Self {
            url: Some(handle.original_request().url.clone()),
            auxiliary,
            state: State::Running {
                task_id: handle.task_id(),
                handle,
            },
        }
    }

    fn running_task(&self) -> Option<(u64, &Arc<dyn TaskHandle>)> {
        match &self.state {
            State::Running { task_id, handle } => Some((*task_id, handle)),
            State::Authorizing => None,
        }
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a started task. A different handle already running under
    /// `id` is cancelled and replaced.
    pub fn start(&self, id: Uuid, handle: Arc<dyn TaskHandle>) {
        let entry = Entry::running(handle, None);
        let task_id = entry.running_task().map(|(task_id, _)| task_id);
        self.replace(id, entry);
        if let Some(task_id) = task_id {
            debug!("task {id} running as transport task {task_id}");
        }
    }

    /// Mark `id` as waiting for authorization. Like `start`, a task still
    /// running under `id` is cancelled.
    pub fn begin_authorization(&self, id: Uuid, url: &str, identifier: TaskIdentifier) {
        let entry = Entry {
            url: Url::parse(url).ok(),
            auxiliary: identifier.auxiliary,
            state: State::Authorizing,
        };
        self.replace(id, entry);
    }

    fn replace(&self, id: Uuid, entry: Entry) {
        let incoming = entry.running_task().map(|(task_id, _)| task_id);
        let previous = self.entries.lock().insert(id, entry);
        if let Some(State::Running { task_id, handle }) = previous.map(|entry| entry.state) {
            if Some(task_id) != incoming {
                warn!("task {id} started twice, cancelling transport task {task_id}");
                handle.cancel();
            }
        }
    }

    /// Clear the authorization mark. `false` when `id` was cancelled meanwhile.
    pub fn end_authorization(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        if matches!(entries.get(&id), Some(Entry { state: State::Authorizing, .. })) {
            entries.remove(&id);
            true
        } else {
            false
        }
    }

    /// Drop the entry for a terminated task. No-op when the entry is gone or
    /// belongs to another transport task.
    pub fn finish(&self, id: Uuid, task_id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&id).and_then(Entry::running_task) {
            Some((running, _)) if running == task_id => {
                entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, id: Uuid) {
        let removed = self.entries.lock().remove(&id);
        match removed.map(|entry| entry.state) {
            Some(State::Running { handle, .. }) => {
                debug!("cancelling task {id}");
                handle.cancel();
            }
            Some(State::Authorizing) => debug!("cancelling task {id} during authorization"),
            None => {}
        }
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn is_active_for_url(&self, url: &Url) -> bool {
        self.entries.lock().values().any(|entry| entry.url.as_ref() == Some(url))
    }

    /// True when a live task carries `name` as its auxiliary value, e.g. a
    /// download into that file name.
    pub fn is_active_for_auxiliary(&self, name: &str) -> bool {
        self.entries
            .lock()
            .values()
            .any(|entry| entry.auxiliary.as_deref() == Some(name))
    }

    /// Adopt every outstanding transport task with a decodable description
    /// that is not registered yet. Returns how many were adopted.
    pub fn reconcile(&self, transport: &dyn Transport) -> usize {
        let candidates: Vec<(TaskIdentifier, Entry)> = transport
            .all_tasks()
            .into_iter()
            .filter_map(|task| {
                let identifier = TaskIdentifier::from_description(task.task_description().as_deref())?;
                let entry = Entry::running(task, Some(&identifier));
                Some((identifier, entry))
            })
            .collect();

        let mut adopted = 0;
        {
            let mut entries = self.entries.lock();
            for (identifier, entry) in candidates {
                entries.entry(identifier.id).or_insert_with(|| {
                    adopted += 1;
                    entry
                });
            }
        }
        if adopted > 0 {
            info!("recovered {adopted} outstanding task(s) from transport");
        }
        adopted
    }

    /// Cancel and forget every entry.
    pub fn cancel_all(&self) {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            if let State::Running { handle, .. } = entry.state {
                handle.cancel();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
