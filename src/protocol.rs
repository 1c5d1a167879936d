//! Client-server messaging protocol for the lottery rooms.
//!
//! Every frame in either direction is a `{ "type": ..., "payload": ... }`
//! envelope with camelCase payload fields, matching what the browser client
//! sends and expects.

use serde::{Deserialize, Serialize};

/// Public view of a room member as serialized to clients. Member ids are
/// store row ids but always cross the wire as strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_vacation: bool,
    pub has_won: bool,
}

/// Messages that clients can send to the server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMsg {
    #[serde(rename = "JOIN", rename_all = "camelCase")]
    Join { room_id: String },
    #[serde(rename = "ADD_USER")]
    AddUser { name: String },
    #[serde(rename = "USER_VACATION", rename_all = "camelCase")]
    UserVacation { id: String, is_vacation: bool },
    #[serde(rename = "USER_WON", rename_all = "camelCase")]
    UserWon { id: String, has_won: bool },
    #[serde(rename = "DELETE_USER")]
    DeleteUser { id: String },
    #[serde(rename = "DRAW")]
    Draw {},
}

/// Messages that the server can send to clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMsg {
    #[serde(rename = "ROOM_STATE")]
    RoomState(Vec<User>),
    #[serde(rename = "USER_UPDATED")]
    UserUpdated(User),
    #[serde(rename = "LOTTERY_STARTED")]
    LotteryStarted {},
    #[serde(rename = "WINNER_SELECTED")]
    WinnerSelected(User),
    #[serde(rename = "ERROR")]
    Error(ErrorMsg),
}

impl ServerMsg {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMsg::Error(ErrorMsg {
            kind,
            message: message.into(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub kind: ErrorKind,
    pub message: String,
}

/// Stable error discriminator carried alongside the human-readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RoomNotFound,
    Validation,
    Store,
    Protocol,
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug)]
pub enum Decoded {
    Msg(ClientMsg),
    /// Well-formed envelope carrying a type we do not handle.
    Unknown(String),
    /// Not a usable message envelope at all.
    Malformed,
}

const KNOWN_TYPES: [&str; 6] = [
    "JOIN",
    "ADD_USER",
    "USER_VACATION",
    "USER_WON",
    "DELETE_USER",
    "DRAW",
];

/// Decode an inbound frame leniently. Unknown command types are reported
/// separately from malformed JSON so the gateway can drop the former and
/// answer the latter with a protocol error.
pub fn decode_client_msg(txt: &str) -> Decoded {
    match serde_json::from_str::<ClientMsg>(txt) {
        Ok(msg) => Decoded::Msg(msg),
        Err(_) => match serde_json::from_str::<serde_json::Value>(txt) {
            Ok(value) => match value.get("type").and_then(|t| t.as_str()) {
                Some(kind) if !KNOWN_TYPES.contains(&kind) => Decoded::Unknown(kind.to_string()),
                _ => Decoded::Malformed,
            },
            Err(_) => Decoded::Malformed,
        },
    }
}
