//! Periodic batched delivery of buffered events
//!
//! A flush cycle snapshots the pending slots, posts them as one JSON array
//! and, only when the collector acknowledged the batch, purges the slots that
//! were part of it. Failures are swallowed: the same batch goes out again on
//! the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::event_codec::EventCodec;
use crate::log_buffer::LogBuffer;
use crate::transport::{Transport, BATCH_CONTENT_TYPE};

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    /// Nothing was pending; no request was made
    NoOp,
    /// The batch was acknowledged and `purged` slots were removed
    Delivered { sent: usize, purged: usize },
    /// Snapshot, send or purge failed; the buffer keeps every pending slot
    Failed,
}

pub struct SyncEngine {
    buffer: Arc<LogBuffer>,
    transport: Arc<dyn Transport>,
    endpoint: String,
    in_flight: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        buffer: Arc<LogBuffer>,
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            transport,
            endpoint: endpoint.into(),
            in_flight: Mutex::new(()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Runs one cycle. Concurrent callers queue behind the cycle in progress.
    ///
    /// The snapshot and the purge are synchronous store calls made on the
    /// calling task's thread; only the send yields.
    pub async fn flush(&self) -> FlushResult {
        let _single_flight = self.in_flight.lock().await;

        let snapshot = match self.buffer.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "flush snapshot failed");
                return FlushResult::Failed;
            }
        };
        if snapshot.count == 0 {
            return FlushResult::NoOp;
        }

        let payload = EventCodec::batch(&snapshot.entries);
        if let Err(e) = self
            .transport
            .post(&self.endpoint, payload.into_bytes(), BATCH_CONTENT_TYPE)
            .await
        {
            debug!(error = %e, pending = snapshot.count, "batch not delivered");
            return FlushResult::Failed;
        }

        match self.buffer.purge_delivered(&snapshot) {
            Ok(purged) => {
                debug!(sent = snapshot.entries.len(), purged, "batch delivered");
                FlushResult::Delivered {
                    sent: snapshot.entries.len(),
                    purged,
                }
            }
            Err(e) => {
                debug!(error = %e, "purge after delivery failed");
                FlushResult::Failed
            }
        }
    }

    /// Starts the periodic task on the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// When called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn(self: Arc<Self>, every: Duration) -> SyncTask {
        self.spawn_on(&Handle::current(), every)
    }

    /// Starts the periodic task on `handle`: sleep `every`, flush, repeat.
    /// The next sleep only starts once the previous flush has completed.
    pub fn spawn_on(self: Arc<Self>, handle: &Handle, every: Duration) -> SyncTask {
        let signal = Arc::new(StopSignal::default());
        let task_signal = Arc::clone(&signal);

        let join = handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(every) => {}
                    _ = task_signal.notify.notified() => {}
                }
                if task_signal.stopped.load(Ordering::Acquire) {
                    break;
                }
                let result = self.flush().await;
                debug!(?result, "sync tick");
            }
        });

        SyncTask {
            signal,
            join,
            runtime: None,
        }
    }

    /// Starts the periodic task on a dedicated single-worker runtime, for
    /// hosts that register outside any tokio context.
    pub fn spawn_detached(self: Arc<Self>, every: Duration) -> std::io::Result<SyncTask> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("logbuf-sync")
            .enable_all()
            .build()?;
        let mut task = self.spawn_on(runtime.handle(), every);
        task.runtime = Some(BackgroundRuntime(Some(runtime)));
        Ok(task)
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

// Runtime::drop blocks and panics inside async contexts; shutdown_background does neither.
struct BackgroundRuntime(Option<Runtime>);

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Handle to a running periodic sync task
pub struct SyncTask {
    signal: Arc<StopSignal>,
    join: JoinHandle<()>,
    runtime: Option<BackgroundRuntime>,
}

impl SyncTask {
    /// Asks the task to exit. A flush in progress runs to completion first.
    pub fn stop(&self) {
        self.signal.stopped.store(true, Ordering::Release);
        // notify_one keeps a permit if the task is mid-flush and not yet waiting
        self.signal.notify.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the task and waits for it to exit
    pub async fn shutdown(mut self) {
        self.stop();
        let _ = (&mut self.join).await;
        drop(self.runtime.take());
    }
}
