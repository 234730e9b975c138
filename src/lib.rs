//! Library root for the `logbuf` crate
//!
//! A client-side event buffer: events are appended to a bounded durable
//! queue and shipped to a collector in periodic batches.

// Error handling
pub mod errors;

// Storage capability
pub mod kv_store;
pub mod kv_store_sled;

// Event model & codec
pub mod event_codec;
pub mod failure;
pub mod log_event;

// Buffer & delivery
pub mod log_buffer;
pub mod sync_engine;
pub mod transport;

// Host-facing surface
pub mod config;
pub mod identity;
pub mod lifecycle;
pub mod logging_facade;

// Operator CLI
pub mod cli;


pub use config::{load_config, LogBufConfig};
pub use errors::{CodecError, LogBufError, LogBufResult, TransportError};
pub use failure::FailureDescriptor;
pub use kv_store::{KeyValueStore, MemoryStore, WriteOp};
pub use lifecycle::{register, register_default, LogService, Stores};
pub use log_buffer::LogBuffer;
pub use log_event::{LogEvent, Severity};
pub use sync_engine::{FlushResult, SyncEngine, SyncTask};
pub use transport::{HttpTransport, Transport};
