//! Bounded in-memory cache of decoded images keyed by url.
//!
//! # Design
//! `LruCache` is a small bounded map: a `HashMap` for lookups plus a
//! `BTreeMap` ordered by a monotonically increasing access tick, so the least
//! recently used key is always the first entry of the order map. Both reads
//! and writes refresh recency.
//!
//! `ImageCache` wraps one behind a mutex so it can be shared by transport
//! callbacks running on arbitrary threads. Callers must not rely on the exact
//! eviction order, only on the capacity bound.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of images kept in memory.
pub const DEFAULT_CAPACITY: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

#[derive(Debug, thiserror::Error)]
#[error("data is not a supported image ({len} bytes)")]
pub struct ImageDecodeError {
    len: usize,
}

/// A decoded image. Cheap to clone; the pixel data is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    format: ImageFormat,
    data: Arc<[u8]>,
}

impl Image {
    /// Recognize the image format from its signature.
    pub fn decode(data: &[u8]) -> Result<Self, ImageDecodeError> {
        let format = if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            ImageFormat::Png
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageFormat::Jpeg
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            ImageFormat::Gif
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            ImageFormat::WebP
        } else {
            return Err(ImageDecodeError { len: data.len() });
        };
        Ok(Self {
            format,
            data: Arc::from(data),
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Least-recently-used map with a fixed capacity.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, last_used) = self.entries.get_mut(key)?;
        self.order.remove(last_used);
        *last_used = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    /// Insert or replace `key`, evicting the least recently used entry when full.
    pub fn put(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let tick = self.next_tick();
        if let Some((_, last_used)) = self.entries.insert(key.clone(), (value, tick)) {
            self.order.remove(&last_used);
        }
        self.order.insert(tick, key);
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Decoded images keyed by the url they were loaded from.
#[derive(Debug)]
pub struct ImageCache {
    cache: Mutex<LruCache<String, Image>>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ImageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, url: &str) -> Option<Image> {
        self.cache.lock().get(&url.to_string())
    }

    pub fn add(&self, url: &str, image: Image) {
        self.cache.lock().put(url.to_string(), image);
    }

    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
