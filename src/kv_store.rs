use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::errors::LogBufResult;

/// Durable string-keyed storage the buffer and identity provider persist into.
///
/// Single-key operations are assumed atomic and immediately visible within the
/// process. Nothing here promises atomicity across keys, so callers that
/// update several keys together hold their own lock for the whole sequence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> LogBufResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> LogBufResult<()>;

    fn remove(&self, key: &str) -> LogBufResult<()>;

    /// Applies `ops` in order. The default issues them one by one and stops at
    /// the first error; backends with native batches apply them as one write.
    fn apply(&self, ops: &[WriteOp]) -> LogBufResult<()> {
        for op in ops {
            match op {
                WriteOp::Set(key, value) => self.set(key, value)?,
                WriteOp::Remove(key) => self.remove(key)?,
            }
        }
        Ok(())
    }
}

/// One write in a [`KeyValueStore::apply`] batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set(String, String),
    Remove(String),
}

/// Process-local store for tests and hosts that only need in-memory buffering.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted key listing, mostly useful for asserting on the key-space
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // every operation is a single map call, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> LogBufResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> LogBufResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> LogBufResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
