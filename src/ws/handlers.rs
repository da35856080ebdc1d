//! One handler per inbound event.
//!
//! Shared shape: validate, load decks with no lock held, re-check, mutate,
//! emit. Failures answer only the offending session with
//! `error {event, message}` and leave all state untouched.

use rand::thread_rng;

use crate::deck::load_deck;
use crate::game::engine::Role;
use crate::http::routes::AppState;
use crate::room::registry::{Action, ActionEffects, Participant, SessionId};
use crate::ws::events::{ClientEvent, GameEnded, GameStarted, MatchSeat, ServerEvent};

/// The authenticated caller of a handler, pinned at handshake time.
pub struct SessionCtx {
    pub session_id: SessionId,
    pub user_id: i64,
    pub email: String,
}

pub async fn dispatch(state: &AppState, ctx: &SessionCtx, event: ClientEvent) {
    let name = event.name();
    tracing::debug!(event = name, user = %ctx.email, "handling event");
    match event {
        ClientEvent::GetRooms => {
            let list = state.registry.waiting_rooms();
            state.registry.send_to(ctx.session_id, ServerEvent::RoomsList(list));
        }
        ClientEvent::Ping => state.registry.send_to(ctx.session_id, ServerEvent::Pong),
        ClientEvent::CreateRoom { deck_id } => on_create_room(state, ctx, deck_id).await,
        ClientEvent::JoinRoom { room_id, deck_id } => {
            on_join_room(state, ctx, room_id, deck_id).await
        }
        ClientEvent::DrawCards { room_id } => on_action(state, ctx, room_id, Action::Draw, name),
        ClientEvent::PlayCard { room_id, card_index } => {
            on_action(state, ctx, room_id, Action::Play(card_index as usize), name)
        }
        ClientEvent::Attack { room_id } => on_action(state, ctx, room_id, Action::Attack, name),
        ClientEvent::EndTurn { room_id } => on_action(state, ctx, room_id, Action::EndTurn, name),
    }
}

fn reply_error(state: &AppState, session_id: SessionId, event: &str, message: impl ToString) {
    state
        .registry
        .send_to(session_id, ServerEvent::error(event, message.to_string()));
}

fn broadcast_waiting_list(state: &AppState) {
    let list = state.registry.waiting_rooms();
    state.registry.broadcast(ServerEvent::RoomsListUpdated(list));
}

async fn on_create_room(state: &AppState, ctx: &SessionCtx, deck_id: i64) {
    let loaded = match load_deck(state.decks.as_ref(), deck_id, ctx.user_id).await {
        Ok(loaded) => loaded,
        Err(err) => return reply_error(state, ctx.session_id, "createRoom", err),
    };
    let view = state.registry.create_room(
        ctx.session_id,
        ctx.user_id,
        loaded.owner_username,
        deck_id,
    );
    state.registry.send_to(ctx.session_id, ServerEvent::RoomCreated(view));
    broadcast_waiting_list(state);
}

async fn on_join_room(state: &AppState, ctx: &SessionCtx, room_id: u64, deck_id: i64) {
    let pending = match state.registry.joinable(room_id, ctx.user_id) {
        Ok(pending) => pending,
        Err(err) => return reply_error(state, ctx.session_id, "joinRoom", err),
    };

    // Both decks load without any registry lock held; the host's cards are
    // re-fetched because the room only keeps the deck id.
    let guest_deck = match load_deck(state.decks.as_ref(), deck_id, ctx.user_id).await {
        Ok(deck) => deck,
        Err(err) => return reply_error(state, ctx.session_id, "joinRoom", err),
    };
    let host_deck =
        match load_deck(state.decks.as_ref(), pending.host_deck_id, pending.host_user_id).await {
            Ok(deck) => deck,
            Err(err) => return reply_error(state, ctx.session_id, "joinRoom", err),
        };

    let guest = Participant {
        session_id: ctx.session_id,
        user_id: ctx.user_id,
        username: guest_deck.owner_username,
        deck_id,
    };
    let start = match state.registry.complete_join(
        room_id,
        guest,
        host_deck.cards,
        guest_deck.cards,
        &mut thread_rng(),
    ) {
        Ok(start) => start,
        Err(err) => return reply_error(state, ctx.session_id, "joinRoom", err),
    };

    let host_seat = MatchSeat {
        role: Role::Host,
        user_id: start.host.user_id,
        deck_id: start.host.deck_id,
    };
    let guest_seat = MatchSeat {
        role: Role::Guest,
        user_id: start.guest.user_id,
        deck_id: start.guest.deck_id,
    };
    state.registry.send_to(
        start.host.session_id,
        ServerEvent::GameStarted(GameStarted {
            room_id: start.room_id,
            you: host_seat.clone(),
            opponent: guest_seat.clone(),
        }),
    );
    state.registry.send_to(
        start.guest.session_id,
        ServerEvent::GameStarted(GameStarted {
            room_id: start.room_id,
            you: guest_seat,
            opponent: host_seat,
        }),
    );
    broadcast_waiting_list(state);
}

fn on_action(state: &AppState, ctx: &SessionCtx, room_id: u64, action: Action, event: &str) {
    match state.registry.game_action(room_id, ctx.session_id, action) {
        Ok(ActionEffects::Update { updates }) => {
            for (session_id, view) in updates {
                state.registry.send_to(session_id, ServerEvent::GameStateUpdated(view));
            }
        }
        Ok(ActionEffects::Ended {
            winner_session,
            host_session,
            guest_session,
            host_score,
            guest_score,
        }) => {
            let payload = GameEnded {
                room_id,
                winner_session_id: winner_session,
                host_score,
                guest_score,
            };
            state
                .registry
                .send_to(host_session, ServerEvent::GameEnded(payload.clone()));
            state.registry.send_to(guest_session, ServerEvent::GameEnded(payload));
        }
        Err(err) => reply_error(state, ctx.session_id, event, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::deck::{starter_deck, DeckRecord, InMemoryDeckRepository};
    use crate::room::registry::Registry;
    use std::sync::Arc;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use uuid::Uuid;

    fn app_state(repo: InMemoryDeckRepository) -> AppState {
        AppState {
            registry: Arc::new(Registry::new()),
            decks: Arc::new(repo),
            auth: Authenticator::from_secret(Some("test")),
        }
    }

    fn demo_state() -> AppState {
        app_state(InMemoryDeckRepository::with_demo_decks())
    }

    fn connect(state: &AppState, user_id: i64) -> (SessionCtx, UnboundedReceiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        state.registry.register_session(session_id, tx);
        (SessionCtx { session_id, user_id, email: format!("user{user_id}@test") }, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn expect_error(events: &[ServerEvent], event: &str, message: &str) {
        assert!(
            events.iter().any(|e| matches!(
                e,
                ServerEvent::Error { event: ev, message: msg } if ev == event && msg == message
            )),
            "expected error {event}/{message}, got {events:?}"
        );
    }

    #[tokio::test]
    async fn happy_match_start() {
        let state = demo_state();
        let (host, mut host_rx) = connect(&state, 1);
        let (guest, mut guest_rx) = connect(&state, 2);

        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 1 }).await;
        let host_events = drain(&mut host_rx);
        match &host_events[0] {
            ServerEvent::RoomCreated(view) => {
                assert_eq!(view.id, 1);
                assert_eq!(view.host_username, "ash");
                assert_eq!(view.host_user_id, 1);
            }
            other => panic!("expected roomCreated, got {other:?}"),
        }
        assert!(matches!(&host_events[1], ServerEvent::RoomsListUpdated(list) if list.len() == 1));
        let guest_events = drain(&mut guest_rx);
        assert!(matches!(&guest_events[0], ServerEvent::RoomsListUpdated(list) if list.len() == 1));

        dispatch(&state, &guest, ClientEvent::JoinRoom { room_id: 1, deck_id: 2 }).await;
        let host_events = drain(&mut host_rx);
        match &host_events[0] {
            ServerEvent::GameStarted(started) => {
                assert_eq!(started.room_id, 1);
                assert_eq!(started.you.role, Role::Host);
                assert_eq!(started.opponent.role, Role::Guest);
                assert_eq!(started.opponent.user_id, 2);
            }
            other => panic!("expected gameStarted, got {other:?}"),
        }
        assert!(matches!(&host_events[1], ServerEvent::RoomsListUpdated(list) if list.is_empty()));
        let guest_events = drain(&mut guest_rx);
        match &guest_events[0] {
            ServerEvent::GameStarted(started) => {
                assert_eq!(started.you.role, Role::Guest);
                assert_eq!(started.opponent.user_id, 1);
            }
            other => panic!("expected gameStarted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_turn_draw_is_rejected_without_side_effects() {
        let state = demo_state();
        let (host, mut host_rx) = connect(&state, 1);
        let (guest, mut guest_rx) = connect(&state, 2);
        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 1 }).await;
        dispatch(&state, &guest, ClientEvent::JoinRoom { room_id: 1, deck_id: 2 }).await;
        drain(&mut host_rx);
        drain(&mut guest_rx);

        dispatch(&state, &guest, ClientEvent::DrawCards { room_id: 1 }).await;
        expect_error(&drain(&mut guest_rx), "drawCards", "NOT_YOUR_TURN");
        assert!(drain(&mut host_rx).is_empty());
    }

    #[tokio::test]
    async fn invalid_deck_creates_nothing_and_stays_quiet() {
        let mut repo = InMemoryDeckRepository::with_demo_decks();
        repo.insert(DeckRecord {
            id: 9,
            user_id: 1,
            owner_username: "ash".into(),
            cards: starter_deck(0).into_iter().take(9).collect(),
        });
        let state = app_state(repo);
        let (host, mut host_rx) = connect(&state, 1);
        let (_other, mut other_rx) = connect(&state, 2);

        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 9 }).await;
        expect_error(&drain(&mut host_rx), "createRoom", "INVALID_DECK");
        assert!(drain(&mut other_rx).is_empty(), "no broadcast on failure");

        dispatch(&state, &host, ClientEvent::GetRooms).await;
        assert!(matches!(
            drain(&mut host_rx).as_slice(),
            [ServerEvent::RoomsList(list)] if list.is_empty()
        ));
    }

    #[tokio::test]
    async fn deck_ownership_and_existence_are_enforced() {
        let state = demo_state();
        let (host, mut host_rx) = connect(&state, 1);

        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 404 }).await;
        expect_error(&drain(&mut host_rx), "createRoom", "NOT_FOUND");

        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 2 }).await;
        expect_error(&drain(&mut host_rx), "createRoom", "FORBIDDEN");
    }

    #[tokio::test]
    async fn join_validations() {
        let state = demo_state();
        let (host, mut host_rx) = connect(&state, 1);
        let (guest, mut guest_rx) = connect(&state, 2);
        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 1 }).await;
        drain(&mut host_rx);
        drain(&mut guest_rx);

        dispatch(&state, &guest, ClientEvent::JoinRoom { room_id: 99, deck_id: 2 }).await;
        expect_error(&drain(&mut guest_rx), "joinRoom", "NOT_FOUND");

        dispatch(&state, &host, ClientEvent::JoinRoom { room_id: 1, deck_id: 1 }).await;
        expect_error(&drain(&mut host_rx), "joinRoom", "SELF_JOIN");

        dispatch(&state, &guest, ClientEvent::JoinRoom { room_id: 1, deck_id: 2 }).await;
        drain(&mut guest_rx);
        let (third, mut third_rx) = connect(&state, 3);
        dispatch(&state, &third, ClientEvent::JoinRoom { room_id: 1, deck_id: 2 }).await;
        expect_error(&drain(&mut third_rx), "joinRoom", "ROOM_FULL");
    }

    #[tokio::test]
    async fn draw_updates_both_views_asymmetrically() {
        let state = demo_state();
        let (host, mut host_rx) = connect(&state, 1);
        let (guest, mut guest_rx) = connect(&state, 2);
        dispatch(&state, &host, ClientEvent::CreateRoom { deck_id: 1 }).await;
        dispatch(&state, &guest, ClientEvent::JoinRoom { room_id: 1, deck_id: 2 }).await;
        drain(&mut host_rx);
        drain(&mut guest_rx);

        dispatch(&state, &host, ClientEvent::DrawCards { room_id: 1 }).await;
        let host_events = drain(&mut host_rx);
        match &host_events[0] {
            ServerEvent::GameStateUpdated(view) => {
                assert_eq!(view.my_hand.len(), 5);
                assert_eq!(view.my_deck_count, 5);
                assert_eq!(view.current_player_session_id, host.session_id);
            }
            other => panic!("expected gameStateUpdated, got {other:?}"),
        }
        match &drain(&mut guest_rx)[0] {
            ServerEvent::GameStateUpdated(view) => {
                assert!(view.my_hand.is_empty());
                assert_eq!(view.opponent_deck_count, 5);
            }
            other => panic!("expected gameStateUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_pong() {
        let state = demo_state();
        let (ctx, mut rx) = connect(&state, 1);
        dispatch(&state, &ctx, ClientEvent::Ping).await;
        assert!(matches!(drain(&mut rx).as_slice(), [ServerEvent::Pong]));
    }
}
