//! Bounded durable queue of encoded events
//!
//! Slots live under `slot:{index}` with dense indices `0..count`, and the
//! count itself under `count`. One mutex serializes every sequence that reads
//! or changes the count, so concurrent appenders see a strict total order of
//! indices and a compaction never interleaves with an append.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::errors::{LogBufError, LogBufResult};
use crate::event_codec::EventCodec;
use crate::kv_store::{KeyValueStore, WriteOp};
use crate::log_event::LogEvent;

pub const COUNT_KEY: &str = "count";

pub fn slot_key(index: usize) -> String {
    format!("slot:{index}")
}

thread_local! {
    static HOLDS_BUFFER_LOCK: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug)]
struct BufferState {
    count: usize,
    /// Slots dropped by overflow eviction since open
    evicted: u64,
}

/// Pending slots captured atomically for one flush cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub count: usize,
    pub entries: Vec<String>,
    evicted: u64,
}

pub struct LogBuffer {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    state: Mutex<BufferState>,
}

impl LogBuffer {
    /// Opens the buffer on `store`, recovering the count left by a previous process.
    pub fn open(store: Arc<dyn KeyValueStore>, capacity: usize) -> LogBufResult<Self> {
        if capacity == 0 {
            return Err(LogBufError::config("buffer capacity must be at least 1"));
        }

        let count = match store.get(COUNT_KEY)? {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| LogBufError::corrupt_state(COUNT_KEY, raw.clone()))?,
            None => 0,
        };
        debug!(count, capacity, "opened log buffer");

        Ok(Self {
            store,
            capacity,
            state: Mutex::new(BufferState { count, evicted: 0 }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Persists `event` at the next index and returns that index.
    ///
    /// When the new count exceeds capacity the oldest `capacity / 2` slots
    /// are evicted before returning; the returned index is the one assigned
    /// before eviction shifted it.
    pub fn append(&self, event: &LogEvent) -> LogBufResult<usize> {
        let encoded = EventCodec::encode(event)?;

        let mut state = self.lock();
        let index = state.count;
        let key = slot_key(index);
        self.store.set(&key, &encoded)?;
        if let Err(e) = self.store.set(COUNT_KEY, &(index + 1).to_string()) {
            // the slot is beyond the persisted count; the next append reuses the index
            if let Err(rollback) = self.store.remove(&key) {
                warn!(slot = %key, error = %rollback, "stale slot left past the count");
            }
            return Err(e);
        }
        state.count = index + 1;

        if state.count > self.capacity {
            let evict = (self.capacity / 2).max(1);
            let before = state.count;
            let result = self.compact(&mut state, evict);
            // count it even when removing the vacated keys failed after the count moved
            state.evicted += (before - state.count) as u64;
            match result {
                Ok(()) => debug!(evicted = evict, remaining = state.count, "buffer over capacity"),
                // the append itself is durable; eviction is retried on the next append
                Err(e) => warn!(error = %e, "eviction failed"),
            }
        }

        Ok(index)
    }

    /// Encoded slots `0..count` in index order, omitting absent or undecodable slots.
    pub fn read_all(&self) -> LogBufResult<Vec<String>> {
        let state = self.lock();
        self.read_slots(state.count)
    }

    /// Removes the oldest `n` slots and shifts the rest down to index 0.
    ///
    /// # Panics
    ///
    /// If `n` exceeds the live count. That can only come from a caller
    /// tracking the count wrongly.
    pub fn purge(&self, n: usize) -> LogBufResult<()> {
        let mut state = self.lock();
        if n > state.count {
            let count = state.count;
            // release first so a panic hook that logs can take the lock
            drop(state);
            panic!("purge of {n} slots exceeds live count {count}");
        }
        self.compact(&mut state, n)
    }

    /// Count, eviction mark and slot contents read under one lock acquisition
    pub fn snapshot(&self) -> LogBufResult<Snapshot> {
        let state = self.lock();
        Ok(Snapshot {
            count: state.count,
            entries: self.read_slots(state.count)?,
            evicted: state.evicted,
        })
    }

    /// Purges the slots of `snapshot` that are still in the buffer.
    ///
    /// Without intervening eviction that is exactly `snapshot.count`. Slots
    /// appended after the snapshot are never touched. Returns how many slots
    /// were purged.
    pub fn purge_delivered(&self, snapshot: &Snapshot) -> LogBufResult<usize> {
        let mut state = self.lock();
        let evicted_since =
            usize::try_from(state.evicted.saturating_sub(snapshot.evicted)).unwrap_or(usize::MAX);
        let n = snapshot.count.saturating_sub(evicted_since).min(state.count);
        self.compact(&mut state, n)?;
        Ok(n)
    }

    /// True while the current thread is inside a buffer critical section.
    /// The panic hook checks this so it never waits on a lock its own thread holds.
    pub(crate) fn locked_by_current_thread() -> bool {
        HOLDS_BUFFER_LOCK.with(Cell::get)
    }

    fn read_slots(&self, count: usize) -> LogBufResult<Vec<String>> {
        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            match self.store.get(&slot_key(index))? {
                Some(text) => match EventCodec::decode(&text) {
                    Ok(_) => entries.push(text),
                    Err(e) => debug!(index, error = %e, "skipping undecodable slot"),
                },
                None => debug!(index, "skipping missing slot"),
            }
        }
        Ok(entries)
    }

    // Order: shift survivors down, persist the new count, then drop the vacated
    // top keys. Interrupted midway this leaves duplicates, never lost survivors.
    fn compact(&self, state: &mut BufferState, n: usize) -> LogBufResult<()> {
        if n == 0 {
            return Ok(());
        }
        let count = state.count;
        let remaining = count - n;

        let mut shift = Vec::with_capacity(remaining + 1);
        for from in n..count {
            let to = slot_key(from - n);
            shift.push(match self.store.get(&slot_key(from))? {
                Some(text) => WriteOp::Set(to, text),
                None => WriteOp::Remove(to),
            });
        }
        shift.push(WriteOp::Set(COUNT_KEY.to_string(), remaining.to_string()));
        self.store.apply(&shift)?;
        state.count = remaining;

        let vacated: Vec<WriteOp> = (remaining..count)
            .map(|index| WriteOp::Remove(slot_key(index)))
            .collect();
        self.store.apply(&vacated)
    }

    fn lock(&self) -> StateGuard<'_> {
        // the count only advances after the store accepted the write, so a
        // poisoned state is still the last durable one
        let inner = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        HOLDS_BUFFER_LOCK.with(|held| held.set(true));
        StateGuard { inner }
    }
}

struct StateGuard<'a> {
    inner: MutexGuard<'a, BufferState>,
}

impl Deref for StateGuard<'_> {
    type Target = BufferState;

    fn deref(&self) -> &BufferState {
        &self.inner
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut BufferState {
        &mut self.inner
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        HOLDS_BUFFER_LOCK.with(|held| held.set(false));
    }
}
