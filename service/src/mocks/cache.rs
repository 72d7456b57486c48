//! In-memory TTL'd key/value cache.

use super::guard;
use flashsale_core::providers::SharedCache;
use flashsale_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Mock shared cache with real expiry.
#[derive(Clone, Default)]
pub struct MockSharedCache {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MockSharedCache {
    /// Create an empty mock cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SharedCache for MockSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = guard(&self.entries)?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = guard(&self.entries)?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = guard(&self.entries)?;
        let now = Instant::now();

        let live = entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > now);
        if live {
            return Ok(false);
        }

        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = guard(&self.entries)?;
        entries.remove(key);
        Ok(())
    }
}
