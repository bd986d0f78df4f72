//! Tunables for a `Webservice`.

use serde::{Deserialize, Serialize};

use crate::image_cache::DEFAULT_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebserviceConfig {
    /// Number of decoded images kept in memory.
    pub image_cache_capacity: usize,

    /// Cap on the response bytes buffered per upload. `None` keeps everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_response_bytes: Option<usize>,

    /// Rebuild the task registry from the transports when the webservice is built.
    pub reconcile_on_start: bool,
}

impl Default for WebserviceConfig {
    fn default() -> Self {
        Self {
            image_cache_capacity: DEFAULT_CAPACITY,
            max_upload_response_bytes: None,
            reconcile_on_start: true,
        }
    }
}

impl WebserviceConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
