//! Command protocol codec
//!
//! Turns one raw control-channel message into a typed [`Command`], and
//! serializes outbound [`ServerMessage`]s. Decoding never panics: every way a
//! message can be wrong maps to a [`DecodeError`] the session reports back
//! to the peer before reading the next message.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::dto::command::{Action, Command};
use crate::dto::message::ServerMessage;

/// Why an inbound message was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, not a JSON object, or a field of the wrong type
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing field `action`")]
    MissingAction,

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

/// Decodes one inbound control message
///
/// Unknown fields are ignored. `stage_id` is only read for `deploy_stage`.
pub fn decode(raw: &[u8]) -> Result<Command, DecodeError> {
    let fields: Map<String, Value> =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let action = match fields.get("action") {
        None | Some(Value::Null) => return Err(DecodeError::MissingAction),
        Some(Value::String(name)) => {
            Action::from_wire(name).ok_or_else(|| DecodeError::UnknownAction(name.clone()))?
        }
        Some(_) => {
            return Err(DecodeError::Malformed(
                "field `action` must be a string".to_string(),
            ));
        }
    };

    let pipeline_id = required_str(&fields, "pipeline_id")?;

    let command = match action {
        Action::StartPipeline => Command::StartPipeline { pipeline_id },
        Action::StopPipeline => Command::StopPipeline { pipeline_id },
        Action::DeployStage => Command::DeployStage {
            pipeline_id,
            stage_id: required_str(&fields, "stage_id")?,
        },
    };

    Ok(command)
}

/// Decodes a text frame
pub fn decode_str(raw: &str) -> Result<Command, DecodeError> {
    decode(raw.as_bytes())
}

/// Encodes a command for the wire (client side)
pub fn encode_command(command: &Command) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

/// Encodes a server message for the wire
pub fn encode_message(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decodes a server message (client side)
pub fn decode_message(raw: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

fn required_str(fields: &Map<String, Value>, name: &'static str) -> Result<String, DecodeError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(DecodeError::Malformed(format!(
            "field `{}` must be a string",
            name
        ))),
    }
}
