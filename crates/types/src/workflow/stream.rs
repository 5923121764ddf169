//! Decoding of live-stream wire messages into [`StreamEvent`]s.
//!
//! A message looks like `{"runId": "...", "type": "step_log", "payload": {...}}`.
//! Decoding is strict: unknown `type` values and payloads missing required
//! fields are rejected instead of being read optimistically.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::{StepCompletePayload, StepLogPayload, StepStartPayload, StreamEvent, VariableChangePayload};

/// Reason a stream message could not be turned into a [`StreamEvent`].
#[derive(Debug, Error)]
pub enum StreamDecodeError {
    /// The text is not a JSON object with a `type` field.
    #[error("malformed stream message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The `type` field names an event kind this client does not know.
    #[error("unknown stream message type '{0}'")]
    UnknownType(String),
    /// The payload does not match the shape required by its `type`.
    #[error("invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded message together with the run it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    /// Run identifier echoed by the server, when present.
    pub run_id: Option<String>,
    pub event: StreamEvent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStreamMessage {
    #[serde(default)]
    run_id: Option<String>,
    r#type: String,
    #[serde(default)]
    payload: JsonValue,
}

/// Decodes one text frame from the run stream.
pub fn decode_stream_message(text: &str) -> Result<StreamMessage, StreamDecodeError> {
    let raw: RawStreamMessage = serde_json::from_str(text).map_err(StreamDecodeError::Malformed)?;
    let RawStreamMessage { run_id, r#type, payload } = raw;

    let event = match r#type.as_str() {
        "step_start" => StreamEvent::StepStart(typed_payload::<StepStartPayload>(&r#type, payload)?),
        "step_complete" => StreamEvent::StepComplete(typed_payload::<StepCompletePayload>(&r#type, payload)?),
        "step_log" => StreamEvent::StepLog(typed_payload::<StepLogPayload>(&r#type, payload)?),
        "variable_change" => StreamEvent::VariableChange(typed_payload::<VariableChangePayload>(&r#type, payload)?),
        _ => return Err(StreamDecodeError::UnknownType(r#type)),
    };

    Ok(StreamMessage { run_id, event })
}

fn typed_payload<T>(kind: &str, payload: JsonValue) -> Result<T, StreamDecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(payload).map_err(|source| StreamDecodeError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}
