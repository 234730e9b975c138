use crate::errors::CodecError;
use crate::log_event::LogEvent;

/// JSON codec for stored slots and outgoing batches.
///
/// Encoded events are complete JSON objects, so a batch is plain
/// concatenation inside brackets with no re-escaping.
pub struct EventCodec;

impl EventCodec {
    pub fn encode(event: &LogEvent) -> Result<String, CodecError> {
        serde_json::to_string(event).map_err(CodecError::Encode)
    }

    pub fn decode(text: &str) -> Result<LogEvent, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }

    /// Joins already-encoded events into one `[e1,e2,...]` payload
    pub fn batch<I, S>(encoded: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut payload = String::from("[");
        for (i, item) in encoded.into_iter().enumerate() {
            if i > 0 {
                payload.push(',');
            }
            payload.push_str(item.as_ref());
        }
        payload.push(']');
        payload
    }
}
