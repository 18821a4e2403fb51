use std::{collections::HashMap, sync::Mutex};

use tracing::{debug, info};

use crate::{
    collaborator::{BoxFuture, CollaboratorError, SequenceController},
    logging::category_sequence,
};

/// Per-request-key replay counters. Repeated identical requests advance the
/// counter so the replay pipeline can serve the next recorded tape.
#[derive(Default)]
pub struct SequenceManager {
    counters: Mutex<HashMap<String, u64>>,
}

impl SequenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index to serve for `key` and advances it.
    pub fn next(&self, key: &str) -> u64 {
        let mut guard = self.counters.lock().expect("sequence lock poisoned");
        let counter = guard.entry(key.to_string()).or_insert(0);
        let current = *counter;
        *counter += 1;
        debug!("{} key={key} index={current}", category_sequence());
        current
    }

    pub fn current(&self, key: &str) -> u64 {
        let guard = self.counters.lock().expect("sequence lock poisoned");
        guard.get(key).copied().unwrap_or(0)
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.lock().expect("sequence lock poisoned").len()
    }

    pub fn clear(&self) -> usize {
        let mut guard = self.counters.lock().expect("sequence lock poisoned");
        let cleared = guard.len();
        guard.clear();
        cleared
    }
}

impl SequenceController for SequenceManager {
    fn reset(&self) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let cleared = self.clear();
            info!("{} reset cleared {cleared} counters", category_sequence());
            Ok(())
        })
    }
}
