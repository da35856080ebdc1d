//! Wire protocol: every frame is `{"event": <name>, "data": <payload>}`.
//!
//! The inbound command set is closed; anything that does not decode into
//! `ClientEvent` is answered with a `BAD_REQUEST` error frame.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::game::engine::{GameStateView, Role};

/// Deserialize an integer that JSON clients may send either as a number or
/// as a string of digits. Floats and non-numeric strings are rejected.
fn int_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: TryFrom<i64> + TryFrom<u64> + std::str::FromStr,
{
    use std::marker::PhantomData;

    struct Visitor<T>(PhantomData<T>);

    impl<'de, T> serde::de::Visitor<'de> for Visitor<T>
    where
        T: TryFrom<i64> + TryFrom<u64> + std::str::FromStr,
    {
        type Value = T;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an integer or a string-encoded integer")
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom("integer out of range"))
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom("integer out of range"))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<T, E> {
            v.trim().parse().map_err(|_| E::custom("not an integer"))
        }
    }

    deserializer.deserialize_any(Visitor(PhantomData))
}

/// Commands a client may send over an authenticated socket.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    GetRooms,
    Ping,
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(deserialize_with = "int_or_string")]
        deck_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        #[serde(deserialize_with = "int_or_string")]
        room_id: u64,
        #[serde(deserialize_with = "int_or_string")]
        deck_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    DrawCards {
        #[serde(deserialize_with = "int_or_string")]
        room_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    PlayCard {
        #[serde(deserialize_with = "int_or_string")]
        room_id: u64,
        #[serde(deserialize_with = "int_or_string")]
        card_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    Attack {
        #[serde(deserialize_with = "int_or_string")]
        room_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    EndTurn {
        #[serde(deserialize_with = "int_or_string")]
        room_id: u64,
    },
}

impl ClientEvent {
    /// The wire name, used as the `event` field of error replies.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::GetRooms => "getRooms",
            ClientEvent::Ping => "ping",
            ClientEvent::CreateRoom { .. } => "createRoom",
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::DrawCards { .. } => "drawCards",
            ClientEvent::PlayCard { .. } => "playCard",
            ClientEvent::Attack { .. } => "attack",
            ClientEvent::EndTurn { .. } => "endTurn",
        }
    }
}

/// Waiting-list entry. Session ids and deck contents stay server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRoomView {
    pub id: u64,
    pub host_username: String,
    pub host_user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One side of a started match, as announced to both players.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSeat {
    pub role: Role,
    pub user_id: i64,
    pub deck_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    pub room_id: u64,
    pub you: MatchSeat,
    pub opponent: MatchSeat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnded {
    pub room_id: u64,
    pub winner_session_id: Uuid,
    pub host_score: u8,
    pub guest_score: u8,
}

/// Everything the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomsList(Vec<PublicRoomView>),
    RoomCreated(PublicRoomView),
    RoomsListUpdated(Vec<PublicRoomView>),
    GameStarted(GameStarted),
    GameStateUpdated(GameStateView),
    GameEnded(GameEnded),
    Pong,
    Error { event: String, message: String },
}

impl ServerEvent {
    pub fn error(event: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error { event: event.into(), message: message.into() }
    }
}

/// Result of decoding one inbound text frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Event(ClientEvent),
    /// Not a known command. Carries the `event` tag when one was present so
    /// the error reply can name it.
    Malformed { event: String },
}

pub fn decode_frame(text: &str) -> Decoded {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Decoded::Malformed { event: "message".into() },
    };
    let tag = value
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("message")
        .to_string();
    match serde_json::from_value::<ClientEvent>(value) {
        Ok(event) => Decoded::Event(event),
        Err(_) => Decoded::Malformed { event: tag },
    }
}
