//! In-memory sequence generator.

use super::guard;
use flashsale_core::providers::IdGenerator;
use flashsale_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock id generator: a strictly increasing counter per scope.
#[derive(Clone, Default)]
pub struct MockIdGenerator {
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl MockIdGenerator {
    /// Create a generator with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for MockIdGenerator {
    async fn next_id(&self, scope: &str) -> Result<i64> {
        let mut counters = guard(&self.counters)?;
        let counter = counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
