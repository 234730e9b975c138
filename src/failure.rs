//! Value-type description of a failure, independent of how it was caught
//!
//! The facade never holds on to a live error or panic payload. Adapters here
//! turn what the host caught into a plain [`FailureDescriptor`] that the
//! facade maps onto a [`crate::log_event::LogEvent`].

use std::backtrace::Backtrace;
use std::error::Error;
use std::panic::PanicHookInfo;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FailureDescriptor {
    /// Short kind name, used as the event tag
    pub kind: String,
    pub message: String,
    /// Long-form text such as a backtrace or cause chain
    pub trace: Option<String>,
    /// Where the failure originated (module, file:line, component)
    pub origin: Option<String>,
    /// Failure-specific key/value data, applied before caller properties
    pub attributes: Vec<(String, String)>,
}

impl FailureDescriptor {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Describes a Rust error value.
    ///
    /// The kind is the unqualified type name of `E`, the origin its module
    /// path, and the trace the `source()` chain, one cause per line.
    pub fn from_error<E: Error + 'static>(err: &E) -> Self {
        let full_name = std::any::type_name::<E>();
        let (origin, kind) = split_type_name(full_name);

        let mut descriptor = Self::new(kind, err.to_string());
        if !origin.is_empty() {
            descriptor.origin = Some(origin.to_string());
        }

        let mut causes = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            causes.push(format!("caused by: {cause}"));
            current = cause.source();
        }
        if !causes.is_empty() {
            descriptor.trace = Some(causes.join("\n"));
        }
        descriptor
    }

    /// Describes a panic as seen from inside a panic hook.
    ///
    /// Runs during unwinding, so it only formats what the hook already has
    /// plus a forced backtrace of the panicking thread.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        let mut descriptor = Self::new("Panic", message)
            .with_trace(Backtrace::force_capture().to_string());
        if let Some(location) = info.location() {
            descriptor.origin = Some(format!("{}:{}", location.file(), location.line()));
        }
        if let Some(thread) = std::thread::current().name() {
            descriptor = descriptor.with_attribute("thread", thread);
        }
        descriptor
    }
}

// "a::b::Kind<T>" -> ("a::b", "Kind<T>"); generic arguments may contain "::" too
fn split_type_name(full: &str) -> (&str, &str) {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => (&full[..pos], &full[pos + 2..]),
        None => ("", full),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("upload rejected")]
    struct UploadRejected {
        #[source]
        cause: std::io::Error,
    }

    #[test]
    fn from_error_uses_type_name_and_cause_chain() {
        let err = UploadRejected {
            cause: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
        };
        let descriptor = FailureDescriptor::from_error(&err);

        assert_eq!(descriptor.kind, "UploadRejected");
        assert_eq!(descriptor.message, "upload rejected");
        assert!(descriptor.origin.as_deref().unwrap().ends_with("failure::tests"));
        assert_eq!(descriptor.trace.as_deref(), Some("caused by: read-only volume"));
    }

    #[test]
    fn from_error_without_source_has_no_trace() {
        let err = std::fmt::Error;
        let descriptor = FailureDescriptor::from_error(&err);
        assert_eq!(descriptor.kind, "Error");
        assert_eq!(descriptor.origin.as_deref(), Some("core::fmt"));
        assert!(descriptor.trace.is_none());
    }

    #[test]
    fn split_keeps_generic_arguments_intact() {
        assert_eq!(
            split_type_name("app::Wrapper<std::io::Error>"),
            ("app", "Wrapper<std::io::Error>")
        );
        assert_eq!(split_type_name("Plain"), ("", "Plain"));
    }
}
