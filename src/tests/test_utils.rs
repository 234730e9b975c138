// Shared fakes for buffer, facade and sync engine tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::errors::{LogBufError, LogBufResult, TransportError};
use crate::kv_store::{KeyValueStore, MemoryStore};
use crate::log_buffer::LogBuffer;
use crate::log_event::{LogEvent, Severity};
use crate::transport::Transport;

pub fn event(n: usize) -> LogEvent {
    LogEvent::new(Severity::Info, "test", format!("event {n}"))
}

pub fn buffer_with(capacity: usize, events: usize) -> (Arc<MemoryStore>, Arc<LogBuffer>) {
    let store = Arc::new(MemoryStore::new());
    let buffer = Arc::new(LogBuffer::open(store.clone(), capacity).unwrap());
    for n in 0..events {
        buffer.append(&event(n)).unwrap();
    }
    (store, buffer)
}

/// Summaries of the pending events, in index order
pub fn summaries(buffer: &LogBuffer) -> Vec<String> {
    buffer
        .read_all()
        .unwrap()
        .iter()
        .map(|text| crate::event_codec::EventCodec::decode(text).unwrap().summary)
        .collect()
}

/// Holds a send in flight until the test releases it
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Transport that records every body and fails on demand
#[derive(Default)]
pub struct FakeTransport {
    pub bodies: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    fail: AtomicBool,
    gate: Option<Arc<Gate>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .lock()
            .unwrap()
            .push(String::from_utf8(body).expect("batch is utf-8"));

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

/// MemoryStore whose writes to matching keys can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_key: Mutex<Option<String>>,
    fail_remove_key: Mutex<Option<String>>,
}

impl FlakyStore {
    /// Fails both `set` and `remove` of `key`
    pub fn fail_writes_to(&self, key: Option<&str>) {
        *self.fail_key.lock().unwrap() = key.map(str::to_string);
    }

    pub fn fail_removes_of(&self, key: Option<&str>) {
        *self.fail_remove_key.lock().unwrap() = key.map(str::to_string);
    }

    fn check(failing: &Mutex<Option<String>>, key: &str) -> LogBufResult<()> {
        if failing.lock().unwrap().as_deref() == Some(key) {
            return Err(LogBufError::storage(
                format!("write {key}"),
                std::io::Error::other("injected failure"),
            ));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> LogBufResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> LogBufResult<()> {
        Self::check(&self.fail_key, key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> LogBufResult<()> {
        Self::check(&self.fail_key, key)?;
        Self::check(&self.fail_remove_key, key)?;
        self.inner.remove(key)
    }
}
