use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::errors::LogBufResult;
use crate::failure::FailureDescriptor;
use crate::identity::IdentityProvider;
use crate::log_buffer::LogBuffer;
use crate::log_event::{LogEvent, Severity};

/// Builds events from caller input and appends them to the buffer.
///
/// The `log_*` entry points never return an error: a failure to log must not
/// become a failure of the host. Append errors are traced and dropped.
#[derive(Clone)]
pub struct LoggingFacade {
    buffer: Arc<LogBuffer>,
    identity: Arc<IdentityProvider>,
}

impl LoggingFacade {
    pub fn new(buffer: Arc<LogBuffer>, identity: Arc<IdentityProvider>) -> Self {
        Self { buffer, identity }
    }

    /// Logs a caught failure. Severity defaults to `Error`.
    pub fn log_failure(
        &self,
        failure: &FailureDescriptor,
        properties: Option<HashMap<String, String>>,
        severity: Option<Severity>,
    ) {
        let event = Self::failure_event(failure, properties, severity.unwrap_or(Severity::Error));
        self.record_quietly(event);
    }

    /// Logs an explicit message. Severity defaults to `Info`.
    pub fn log_message(
        &self,
        tag: &str,
        message: &str,
        detail: Option<&str>,
        properties: Option<HashMap<String, String>>,
        severity: Option<Severity>,
    ) {
        let event = LogEvent::new(severity.unwrap_or(Severity::Info), tag, message)
            .with_detail(detail.map(str::to_string))
            .with_properties(properties.unwrap_or_default());
        self.record_quietly(event);
    }

    /// Stamps the current identity onto `event` and appends it, returning the
    /// assigned index.
    pub fn record(&self, event: LogEvent) -> LogBufResult<usize> {
        let identity = self.identity.current();
        let event = event.with_identity(identity.user_id, identity.device_id);
        self.buffer.append(&event)
    }

    pub(crate) fn failure_event(
        failure: &FailureDescriptor,
        properties: Option<HashMap<String, String>>,
        severity: Severity,
    ) -> LogEvent {
        LogEvent::new(severity, failure.kind.as_str(), failure.message.as_str())
            .with_detail(failure.trace.clone())
            .with_source(failure.origin.clone())
            .with_properties(failure.attributes.iter().cloned())
            .with_properties(properties.unwrap_or_default())
    }

    fn record_quietly(&self, event: LogEvent) {
        if let Err(e) = self.record(event) {
            warn!(error = %e, "dropping log event");
        }
    }
}
