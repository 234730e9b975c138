use std::collections::HashMap;
use std::sync::Arc;

use crate::event_codec::EventCodec;
use crate::failure::FailureDescriptor;
use crate::identity::IdentityProvider;
use crate::kv_store::MemoryStore;
use crate::log_buffer::{LogBuffer, COUNT_KEY};
use crate::log_event::{LogEvent, Severity};
use crate::logging_facade::LoggingFacade;
use crate::tests::test_utils::FlakyStore;

fn facade() -> (Arc<LogBuffer>, Arc<IdentityProvider>, LoggingFacade) {
    let buffer = Arc::new(LogBuffer::open(Arc::new(MemoryStore::new()), 50).unwrap());
    let identity = Arc::new(IdentityProvider::new(Arc::new(MemoryStore::new())));
    let facade = LoggingFacade::new(buffer.clone(), identity.clone());
    (buffer, identity, facade)
}

fn pending(buffer: &LogBuffer) -> Vec<LogEvent> {
    buffer
        .read_all()
        .unwrap()
        .iter()
        .map(|text| EventCodec::decode(text).unwrap())
        .collect()
}

#[test]
fn failure_fields_map_onto_the_event() {
    let (buffer, _identity, facade) = facade();
    let failure = FailureDescriptor::new("TimeoutError", "payment gateway timed out")
        .with_trace("at checkout::pay\nat checkout::submit")
        .with_origin("checkout")
        .with_attribute("gateway", "stripe")
        .with_attribute("attempt", "1");
    let overrides = HashMap::from([("attempt".to_string(), "3".to_string())]);

    facade.log_failure(&failure, Some(overrides), None);

    let events = pending(&buffer);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.severity, Severity::Error);
    assert_eq!(event.tag, "TimeoutError");
    assert_eq!(event.summary, "payment gateway timed out");
    assert_eq!(event.detail.as_deref(), Some("at checkout::pay\nat checkout::submit"));
    assert_eq!(event.source.as_deref(), Some("checkout"));
    assert_eq!(event.properties["gateway"], "stripe");
    assert_eq!(event.properties["attempt"], "3");
}

#[test]
fn explicit_messages_default_to_info() {
    let (buffer, _identity, facade) = facade();

    facade.log_message("startup", "cache warmed", None, None, None);
    facade.log_message("startup", "config reloaded", Some("3 keys"), None, Some(Severity::Error));

    let events = pending(&buffer);
    assert_eq!(events[0].severity, Severity::Info);
    assert_eq!(events[0].detail, None);
    assert!(events[0].properties.is_empty());
    assert_eq!(events[1].severity, Severity::Error);
    assert_eq!(events[1].detail.as_deref(), Some("3 keys"));
}

#[test]
fn identity_is_copied_at_log_time() {
    let (buffer, identity, facade) = facade();

    identity.identify("user-42", "device-9");
    facade.log_message("nav", "opened settings", None, None, None);
    identity.identify_user("user-43");
    facade.log_message("nav", "closed settings", None, None, None);

    let events = pending(&buffer);
    assert_eq!(events[0].user_id.as_deref(), Some("user-42"));
    assert_eq!(events[0].device_id.as_deref(), Some("device-9"));
    assert_eq!(events[1].user_id.as_deref(), Some("user-43"));
    assert_ne!(events[0].event_id, events[1].event_id);
}

#[test]
fn storage_failure_is_not_surfaced_to_the_caller() {
    let store = Arc::new(FlakyStore::default());
    let buffer = Arc::new(LogBuffer::open(store.clone(), 50).unwrap());
    let identity = Arc::new(IdentityProvider::new(Arc::new(MemoryStore::new())));
    let facade = LoggingFacade::new(buffer.clone(), identity);

    store.fail_writes_to(Some(COUNT_KEY));
    facade.log_message("disk", "full", None, None, None);
    assert!(buffer.is_empty());

    // the lower-level path does report it
    assert!(facade.record(LogEvent::new(Severity::Info, "disk", "full")).is_err());
}

#[test]
fn error_values_are_described_by_type() {
    let (buffer, _identity, facade) = facade();
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "settings.json missing");

    facade.log_failure(&FailureDescriptor::from_error(&err), None, Some(Severity::Crash));

    let event = &pending(&buffer)[0];
    assert_eq!(event.tag, "Error");
    assert_eq!(event.source.as_deref(), Some("std::io::error"));
    assert_eq!(event.summary, "settings.json missing");
    assert_eq!(event.severity, Severity::Crash);
}
