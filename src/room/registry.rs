//! Process-wide registry of sessions, rooms, and running matches.
//!
//! All room and match mutations serialize on one mutex, so two events
//! touching the same room never interleave. The session table lives in a
//! `DashMap` so direct sends and broadcasts do not contend with room
//! mutations. No registry method awaits; deck loads happen in the handlers
//! between `joinable` and `complete_join`, which re-checks every
//! precondition.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::deck::GameCard;
use crate::game::engine::{AttackOutcome, GameState, GameStateView, Role, TurnError};
use crate::ws::events::{PublicRoomView, ServerEvent};

pub type SessionId = Uuid;

/// Outbound channel of a live authenticated connection. The identity that
/// authenticated it travels with the connection's `SessionCtx`.
type SessionSender = tokio::sync::mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    InGame,
}

/// One seat of a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub session_id: SessionId,
    pub user_id: i64,
    pub username: String,
    pub deck_id: i64,
}

#[derive(Debug)]
struct Room {
    id: u64,
    status: RoomStatus,
    host: Participant,
    guest: Option<Participant>,
    created_at: OffsetDateTime,
}

impl Room {
    fn public_view(&self) -> PublicRoomView {
        PublicRoomView {
            id: self.id,
            host_username: self.host.username.clone(),
            host_user_id: self.host.user_id,
            created_at: self.created_at,
        }
    }

    fn role_of(&self, session_id: SessionId) -> Option<Role> {
        if self.host.session_id == session_id {
            Some(Role::Host)
        } else if self.guest.as_ref().map(|g| g.session_id) == Some(session_id) {
            Some(Role::Guest)
        } else {
            None
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum JoinError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("ROOM_FULL")]
    RoomFull,
    #[error("SELF_JOIN")]
    SelfJoin,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ActionError {
    /// Unknown room, or the caller is not seated in it.
    #[error("BAD_REQUEST")]
    BadRequest,
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// Snapshot handed back by `joinable`, consumed after the deck loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingJoin {
    pub host_deck_id: i64,
    pub host_user_id: i64,
}

/// Everything the join handler needs to announce a started match.
#[derive(Debug, Clone)]
pub struct MatchStart {
    pub room_id: u64,
    pub host: Participant,
    pub guest: Participant,
}

/// Outcome of a game action, projected under the same lock as the mutation
/// so every emission observes a consistent state.
#[derive(Debug)]
pub enum ActionEffects {
    Update { updates: [(SessionId, GameStateView); 2] },
    Ended {
        winner_session: SessionId,
        host_session: SessionId,
        guest_session: SessionId,
        host_score: u8,
        guest_score: u8,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Draw,
    Play(usize),
    Attack,
    EndTurn,
}

#[derive(Default)]
struct RegistryInner {
    next_room_id: u64,
    rooms: HashMap<u64, Room>,
    games: HashMap<u64, GameState>,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
    sessions: DashMap<SessionId, SessionSender>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- sessions -----

    pub fn register_session(&self, session_id: SessionId, tx: SessionSender) {
        self.sessions.insert(session_id, tx);
    }

    /// Tear down a closed session: its rooms and matches go first, then the
    /// handle. Returns whether any room was removed.
    pub fn unregister_session(&self, session_id: SessionId) -> bool {
        let changed = self.remove_by_session(session_id);
        self.sessions.remove(&session_id);
        changed
    }

    /// Direct send. A full or closed channel only means the peer is on its
    /// way out; the disconnect path cleans up.
    pub fn send_to(&self, session_id: SessionId, event: ServerEvent) {
        if let Some(tx) = self.sessions.get(&session_id) {
            let _ = tx.send(event);
        }
    }

    pub fn broadcast(&self, event: ServerEvent) {
        for tx in self.sessions.iter() {
            let _ = tx.send(event.clone());
        }
    }

    // ----- rooms -----

    /// Store a new waiting room for a host whose deck has already been
    /// validated. Room ids are monotonic and never reused.
    pub fn create_room(
        &self,
        session_id: SessionId,
        user_id: i64,
        username: String,
        deck_id: i64,
    ) -> PublicRoomView {
        let mut inner = self.inner.lock();
        inner.next_room_id += 1;
        let id = inner.next_room_id;
        let room = Room {
            id,
            status: RoomStatus::Waiting,
            host: Participant { session_id, user_id, username, deck_id },
            guest: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let view = room.public_view();
        inner.rooms.insert(id, room);
        tracing::info!(room_id = id, user_id, "room created");
        view
    }

    /// Consistent snapshot of the waiting list, ascending room id.
    pub fn waiting_rooms(&self) -> Vec<PublicRoomView> {
        let inner = self.inner.lock();
        let mut views: Vec<PublicRoomView> = inner
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting)
            .map(Room::public_view)
            .collect();
        views.sort_by_key(|v| v.id);
        views
    }

    /// Precondition check before the join handler goes off to load decks.
    pub fn joinable(&self, room_id: u64, user_id: i64) -> Result<PendingJoin, JoinError> {
        let inner = self.inner.lock();
        let room = inner.rooms.get(&room_id).ok_or(JoinError::NotFound)?;
        if room.status != RoomStatus::Waiting || room.guest.is_some() {
            return Err(JoinError::RoomFull);
        }
        if room.host.user_id == user_id {
            return Err(JoinError::SelfJoin);
        }
        Ok(PendingJoin { host_deck_id: room.host.deck_id, host_user_id: room.host.user_id })
    }

    /// Seat the guest and start the match. Every precondition is re-checked:
    /// the room may have been removed or filled while the decks loaded.
    pub fn complete_join(
        &self,
        room_id: u64,
        guest: Participant,
        host_cards: Vec<GameCard>,
        guest_cards: Vec<GameCard>,
        rng: &mut impl Rng,
    ) -> Result<MatchStart, JoinError> {
        let mut inner = self.inner.lock();
        let room = inner.rooms.get_mut(&room_id).ok_or(JoinError::NotFound)?;
        if room.status != RoomStatus::Waiting || room.guest.is_some() {
            return Err(JoinError::RoomFull);
        }
        if room.host.user_id == guest.user_id {
            return Err(JoinError::SelfJoin);
        }
        if !self.sessions.contains_key(&room.host.session_id) {
            // Host vanished between check and commit; the disconnect sweep
            // owns the room record.
            return Err(JoinError::NotFound);
        }

        room.status = RoomStatus::InGame;
        room.guest = Some(guest.clone());
        let start = MatchStart { room_id, host: room.host.clone(), guest };
        inner.games.insert(room_id, GameState::new(host_cards, guest_cards, rng));
        tracing::info!(room_id, guest_user = start.guest.user_id, "match started");
        Ok(start)
    }

    // ----- match actions -----

    /// Apply one game action and project its consequences. On a winning
    /// attack the game state is dropped; the room record stays until a
    /// disconnect collects it (it is no longer `Waiting`, so it never shows
    /// up in listings).
    pub fn game_action(
        &self,
        room_id: u64,
        session_id: SessionId,
        action: Action,
    ) -> Result<ActionEffects, ActionError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let room = inner.rooms.get(&room_id).ok_or(ActionError::BadRequest)?;
        let role = room.role_of(session_id).ok_or(ActionError::BadRequest)?;
        let game = inner.games.get_mut(&room_id).ok_or(ActionError::BadRequest)?;
        let host_session = room.host.session_id;
        let guest_session = room
            .guest
            .as_ref()
            .map(|g| g.session_id)
            .ok_or(ActionError::BadRequest)?;

        let finished = match action {
            Action::Draw => {
                game.draw_cards(role)?;
                None
            }
            Action::Play(index) => {
                game.play_card(role, index)?;
                None
            }
            Action::Attack => match game.attack(role)? {
                AttackOutcome::Victory { damage, winner } => {
                    tracing::debug!(room_id, damage, "winning knockout");
                    Some(winner)
                }
                AttackOutcome::Knockout { damage } => {
                    tracing::debug!(room_id, damage, "knockout");
                    None
                }
                AttackOutcome::Hit { damage } => {
                    tracing::debug!(room_id, damage, "hit");
                    None
                }
            },
            Action::EndTurn => {
                game.end_turn(role)?;
                None
            }
        };

        if let Some(winner) = finished {
            let (host_score, guest_score) = game.scores();
            inner.games.remove(&room_id);
            tracing::info!(room_id, ?winner, "match ended");
            return Ok(ActionEffects::Ended {
                winner_session: match winner {
                    Role::Host => host_session,
                    Role::Guest => guest_session,
                },
                host_session,
                guest_session,
                host_score,
                guest_score,
            });
        }

        Ok(ActionEffects::Update {
            updates: [
                (host_session, game.view_for(Role::Host, host_session, guest_session)),
                (guest_session, game.view_for(Role::Guest, host_session, guest_session)),
            ],
        })
    }

    /// Drop every room (and its match) where the session holds a seat.
    /// Infallible: runs to completion regardless of emission failures.
    pub fn remove_by_session(&self, session_id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        let doomed: Vec<u64> = inner
            .rooms
            .values()
            .filter(|r| r.role_of(session_id).is_some())
            .map(|r| r.id)
            .collect();
        for id in &doomed {
            inner.rooms.remove(id);
            inner.games.remove(id);
            tracing::info!(room_id = *id, %session_id, "room removed");
        }
        !doomed.is_empty()
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    #[cfg(test)]
    pub fn game_count(&self) -> usize {
        self.inner.lock().games.len()
    }
}
