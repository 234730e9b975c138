//! One-time registration of the log buffer inside a host process
//!
//! `register` replaces process-wide statics with an owned [`LogService`]:
//! it recovers the buffer, restores identity, installs the crash hook and
//! starts the periodic sync task. Only the once-per-process guard is global.

use std::cell::Cell;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::config::LogBufConfig;
use crate::errors::{LogBufError, LogBufResult};
use crate::failure::FailureDescriptor;
use crate::identity::{Identity, IdentityProvider};
use crate::kv_store::{KeyValueStore, MemoryStore};
use crate::kv_store_sled::SledStore;
use crate::log_buffer::LogBuffer;
use crate::log_event::Severity;
use crate::logging_facade::LoggingFacade;
use crate::sync_engine::{FlushResult, SyncEngine, SyncTask};
use crate::transport::{HttpTransport, Transport};

pub const BUFFER_NAMESPACE: &str = "buffer";
pub const IDENTITY_NAMESPACE: &str = "identity";

static REGISTERED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static SUPPRESS_CRASH_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

/// Storage namespaces used by one registration
#[derive(Clone)]
pub struct Stores {
    pub buffer: Arc<dyn KeyValueStore>,
    pub identity: Arc<dyn KeyValueStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            buffer: Arc::new(MemoryStore::new()),
            identity: Arc::new(MemoryStore::new()),
        }
    }

    /// Both namespaces as trees of one sled database at `path`
    pub fn sled(path: impl AsRef<Path>) -> LogBufResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            LogBufError::storage(format!("open sled db at {}", path.display()), e)
        })?;
        Ok(Self {
            buffer: Arc::new(SledStore::with_db(&db, BUFFER_NAMESPACE)?),
            identity: Arc::new(SledStore::with_db(&db, IDENTITY_NAMESPACE)?),
        })
    }
}

/// The registered log buffer: the host's handle for logging and identity.
pub struct LogService {
    config: LogBufConfig,
    buffer: Arc<LogBuffer>,
    identity: Arc<IdentityProvider>,
    facade: LoggingFacade,
    engine: Option<Arc<SyncEngine>>,
    sync_task: Option<SyncTask>,
}

/// Registers the log buffer for this process.
///
/// Storage or configuration problems are returned and leave the process
/// unregistered, so the host may retry.
///
/// # Panics
///
/// If a registration already succeeded (or is in progress) in this process.
/// Nothing of the existing registration is touched.
pub fn register(
    config: LogBufConfig,
    stores: Stores,
    transport: Arc<dyn Transport>,
) -> LogBufResult<LogService> {
    claim_registration();
    release_on_error(build_service(config, stores, transport))
}

/// Registers with a sled database under `config.data_dir` and the HTTP transport.
///
/// # Panics
///
/// Like [`register`], before opening the database.
pub fn register_default(config: LogBufConfig) -> LogBufResult<LogService> {
    claim_registration();
    release_on_error(build_default_service(config))
}

fn claim_registration() {
    if REGISTERED.swap(true, Ordering::AcqRel) {
        // a host integration bug, not something the existing buffer should record
        SUPPRESS_CRASH_CAPTURE.with(|suppress| suppress.set(true));
        panic!("log buffer can only be registered once per process");
    }
}

fn release_on_error(service: LogBufResult<LogService>) -> LogBufResult<LogService> {
    if service.is_err() {
        REGISTERED.store(false, Ordering::Release);
    }
    service
}

fn build_default_service(config: LogBufConfig) -> LogBufResult<LogService> {
    config.validate()?;
    let stores = Stores::sled(&config.data_dir)?;
    let transport = HttpTransport::new(config.http_timeout())?;
    build_service(config, stores, Arc::new(transport))
}

fn build_service(
    config: LogBufConfig,
    stores: Stores,
    transport: Arc<dyn Transport>,
) -> LogBufResult<LogService> {
    config.validate()?;

    let buffer = Arc::new(LogBuffer::open(stores.buffer, config.maximum_log_count)?);
    let identity = Arc::new(IdentityProvider::new(stores.identity));
    if config.auto_generate_identity {
        identity.load_or_generate()?;
    }
    let facade = LoggingFacade::new(Arc::clone(&buffer), Arc::clone(&identity));

    let mut engine = None;
    let mut sync_task = None;
    if let Some(endpoint) = config.endpoint() {
        let sync = Arc::new(SyncEngine::new(Arc::clone(&buffer), transport, endpoint));
        let every = config.sync_frequency();
        let task = match Handle::try_current() {
            Ok(handle) => Arc::clone(&sync).spawn_on(&handle, every),
            Err(_) => Arc::clone(&sync)
                .spawn_detached(every)
                .map_err(|e| LogBufError::io("start sync runtime", e))?,
        };
        info!(endpoint, every_ms = config.sync_frequency_millis, "sync task started");
        engine = Some(sync);
        sync_task = Some(task);
    } else {
        info!("no sync endpoint configured, buffering locally only");
    }

    if config.capture_panics {
        install_crash_hook(facade.clone());
    }
    info!(
        pending = buffer.count(),
        capacity = buffer.capacity(),
        "log buffer registered"
    );

    Ok(LogService {
        config,
        buffer,
        identity,
        facade,
        engine,
        sync_task,
    })
}

// Panics anywhere in the process, including inside tokio tasks, pass through here.
fn install_crash_hook(facade: LoggingFacade) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let suppressed = SUPPRESS_CRASH_CAPTURE.with(|suppress| suppress.replace(false));
        if !suppressed && !LogBuffer::locked_by_current_thread() {
            let failure = FailureDescriptor::from_panic(info);
            let event = LoggingFacade::failure_event(&failure, None, Severity::Crash);
            let _ = facade.record(event);
        }
        previous(info);
    }));
}

impl LogService {
    pub fn config(&self) -> &LogBufConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    pub fn facade(&self) -> &LoggingFacade {
        &self.facade
    }

    pub fn sync_active(&self) -> bool {
        self.sync_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn log_failure(
        &self,
        failure: &FailureDescriptor,
        properties: Option<HashMap<String, String>>,
        severity: Option<Severity>,
    ) {
        self.facade.log_failure(failure, properties, severity);
    }

    /// Logs a Rust error value through [`FailureDescriptor::from_error`]
    pub fn log_error<E: Error + 'static>(
        &self,
        err: &E,
        properties: Option<HashMap<String, String>>,
        severity: Option<Severity>,
    ) {
        self.facade
            .log_failure(&FailureDescriptor::from_error(err), properties, severity);
    }

    pub fn log_message(
        &self,
        tag: &str,
        message: &str,
        detail: Option<&str>,
        properties: Option<HashMap<String, String>>,
        severity: Option<Severity>,
    ) {
        self.facade
            .log_message(tag, message, detail, properties, severity);
    }

    pub fn identify(&self, user_id: impl Into<String>, device_id: impl Into<String>) {
        self.identity.identify(user_id, device_id);
    }

    pub fn identify_user(&self, user_id: impl Into<String>) {
        self.identity.identify_user(user_id);
    }

    pub fn identify_device(&self, device_id: impl Into<String>) {
        self.identity.identify_device(device_id);
    }

    pub fn identity(&self) -> Identity {
        self.identity.current()
    }

    /// Runs one flush cycle now, serialized with the periodic task.
    /// `None` when no endpoint is configured.
    pub async fn flush_now(&self) -> Option<FlushResult> {
        match &self.engine {
            Some(engine) => Some(engine.flush().await),
            None => None,
        }
    }
}
