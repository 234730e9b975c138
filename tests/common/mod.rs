#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use logbuf::{LogEvent, Transport, TransportError};

/// Records delivered batches; fails every request while `failing` is set
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Vec<LogEvent>>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<LogEvent>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<LogEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable {
                message: format!("{url} unreachable"),
            });
        }
        let batch: Vec<LogEvent> =
            serde_json::from_slice(&body).expect("batch is a JSON array of events");
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }
}
