use checkers_domain::{Room, RoomId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed payload for {command}: {detail}")]
    MalformedPayload { command: String, detail: String },
}

/// Every frame between the gateway and the workers: a whitelisted command
/// and a command-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    pub command: String,
    pub value: T,
}

const COMMANDS: &[&str] = &[
    "create_room",
    "join_room",
    "ready_room",
    "leave_room",
    "game_info",
    "paired",
    "opponent_ready",
    "room_created",
    "queue_confirmation",
    "balance_update",
    "game_start",
    "game_timer",
    "game_update",
    "game_over",
    "move_piece",
    "opponent_left_room",
    "connected",
    "error",
];

#[must_use]
pub fn is_known_command(command: &str) -> bool {
    COMMANDS.contains(&command)
}

pub fn encode<T: Serialize>(command: &str, value: &T) -> Result<Vec<u8>, ProtocolError> {
    if !is_known_command(command) {
        return Err(ProtocolError::UnknownCommand(command.to_string()));
    }
    let message = Message {
        command: command.to_string(),
        value,
    };
    serde_json::to_vec(&message).map_err(|e| ProtocolError::MalformedPayload {
        command: command.to_string(),
        detail: e.to_string(),
    })
}

/// Decodes the envelope, leaving the payload undecoded.
pub fn decode_raw(bytes: &[u8]) -> Result<Message<Value>, ProtocolError> {
    let message: Message<Value> =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedPayload {
            command: "<envelope>".to_string(),
            detail: e.to_string(),
        })?;
    if !is_known_command(&message.command) {
        return Err(ProtocolError::UnknownCommand(message.command));
    }
    Ok(message)
}

/// Decodes the envelope against a known payload schema.
pub fn decode_typed<T: DeserializeOwned>(bytes: &[u8]) -> Result<Message<T>, ProtocolError> {
    let raw = decode_raw(bytes)?;
    let value = serde_json::from_value(raw.value).map_err(|e| ProtocolError::MalformedPayload {
        command: raw.command.clone(),
        detail: e.to_string(),
    })?;
    Ok(Message {
        command: raw.command,
        value,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedValue {
    pub color: u8,
    pub opponent: String,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCreatedValue {
    pub id: RoomId,
    pub player: String,
    pub currency: String,
    pub bet_value: f64,
}

pub fn paired_message(
    color: u8,
    opponent_name: &str,
    room_id: RoomId,
) -> Result<Vec<u8>, ProtocolError> {
    encode(
        "paired",
        &PairedValue {
            color,
            opponent: opponent_name.to_string(),
            room_id,
        },
    )
}

pub fn room_created_message(room: &Room) -> Result<Vec<u8>, ProtocolError> {
    encode(
        "room_created",
        &RoomCreatedValue {
            id: room.id,
            player: room.player1.name.clone(),
            currency: room.currency.clone(),
            bet_value: room.stake.major(),
        },
    )
}

pub fn opponent_ready_message(is_ready: bool) -> Result<Vec<u8>, ProtocolError> {
    encode("opponent_ready", &is_ready)
}

pub fn queue_confirmation_message(confirmed: bool) -> Result<Vec<u8>, ProtocolError> {
    encode("queue_confirmation", &confirmed)
}

/// Balance on the wire is decimal major units.
pub fn balance_update_message(balance_major: f64) -> Result<Vec<u8>, ProtocolError> {
    encode("balance_update", &balance_major)
}

pub fn opponent_left_room_message() -> Result<Vec<u8>, ProtocolError> {
    encode("opponent_left_room", &true)
}

pub fn error_message(reason: &str) -> Result<Vec<u8>, ProtocolError> {
    encode("error", &reason)
}
