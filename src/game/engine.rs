//! Per-room match state and the turn machine.
//!
//! The engine is transport-free: it validates and applies actions, and
//! projects per-player views. Emission and session bookkeeping belong to
//! the room registry.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::deck::GameCard;
use crate::game::typechart;

pub const HAND_LIMIT: usize = 5;
pub const WIN_SCORE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn opponent(self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }
}

#[derive(Debug)]
struct PlayerState {
    /// Drawn from the tail, so index 0 is the bottom of the shuffled pile.
    deck: Vec<GameCard>,
    hand: Vec<GameCard>,
    active: Option<GameCard>,
    score: u8,
}

impl PlayerState {
    fn new(deck: Vec<GameCard>) -> Self {
        Self { deck, hand: Vec::new(), active: None, score: 0 }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TurnError {
    #[error("NOT_YOUR_TURN")]
    NotYourTurn,
    #[error("INVALID_INDEX")]
    InvalidIndex,
    #[error("ALREADY_ACTIVE")]
    AlreadyActive,
    #[error("NO_ACTIVE_CARD")]
    NoActiveCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    Hit { damage: i32 },
    Knockout { damage: i32 },
    /// A knockout that brought the attacker to the winning score.
    Victory { damage: i32, winner: Role },
}

#[derive(Debug)]
pub struct GameState {
    host: PlayerState,
    guest: PlayerState,
    current: Role,
}

impl GameState {
    /// Start a match: both decks get a uniform shuffle, hands are empty,
    /// nothing is on the board, the host moves first.
    pub fn new(
        mut host_cards: Vec<GameCard>,
        mut guest_cards: Vec<GameCard>,
        rng: &mut impl Rng,
    ) -> Self {
        host_cards.shuffle(rng);
        guest_cards.shuffle(rng);
        Self {
            host: PlayerState::new(host_cards),
            guest: PlayerState::new(guest_cards),
            current: Role::Host,
        }
    }

    pub fn scores(&self) -> (u8, u8) {
        (self.host.score, self.guest.score)
    }

    fn player(&self, role: Role) -> &PlayerState {
        match role {
            Role::Host => &self.host,
            Role::Guest => &self.guest,
        }
    }

    fn player_mut(&mut self, role: Role) -> &mut PlayerState {
        match role {
            Role::Host => &mut self.host,
            Role::Guest => &mut self.guest,
        }
    }

    fn require_turn(&self, actor: Role) -> Result<(), TurnError> {
        if self.current != actor {
            return Err(TurnError::NotYourTurn);
        }
        Ok(())
    }

    /// Refill the actor's hand from the tail of their deck, up to the hand
    /// limit. Idempotent once the hand is full or the deck is empty; never
    /// advances the turn.
    pub fn draw_cards(&mut self, actor: Role) -> Result<(), TurnError> {
        self.require_turn(actor)?;
        let p = self.player_mut(actor);
        while p.hand.len() < HAND_LIMIT {
            match p.deck.pop() {
                Some(card) => p.hand.push(card),
                None => break,
            }
        }
        Ok(())
    }

    /// Move the hand card at `index` onto the board. The rest of the hand
    /// keeps its order; never advances the turn.
    pub fn play_card(&mut self, actor: Role, index: usize) -> Result<(), TurnError> {
        self.require_turn(actor)?;
        let p = self.player_mut(actor);
        if index >= p.hand.len() {
            return Err(TurnError::InvalidIndex);
        }
        if p.active.is_some() {
            return Err(TurnError::AlreadyActive);
        }
        let card = p.hand.remove(index);
        p.active = Some(card);
        Ok(())
    }

    /// Resolve one attack between the two actives. The turn passes to the
    /// opponent even on a knockout.
    pub fn attack(&mut self, actor: Role) -> Result<AttackOutcome, TurnError> {
        self.require_turn(actor)?;
        let attacker = self.player(actor).active.as_ref().ok_or(TurnError::NoActiveCard)?;
        let (attack, element) = (attacker.attack, attacker.element);

        let defender_state = self.player_mut(actor.opponent());
        let mut target = defender_state.active.take().ok_or(TurnError::NoActiveCard)?;
        let damage = typechart::damage(attack, element, target.element);
        target.hp -= damage;
        let knocked_out = target.hp <= 0;
        if !knocked_out {
            defender_state.active = Some(target);
        }

        let outcome = if knocked_out {
            let attacker_state = self.player_mut(actor);
            attacker_state.score += 1;
            if attacker_state.score >= WIN_SCORE {
                AttackOutcome::Victory { damage, winner: actor }
            } else {
                AttackOutcome::Knockout { damage }
            }
        } else {
            AttackOutcome::Hit { damage }
        };

        self.current = actor.opponent();
        Ok(outcome)
    }

    /// Hand the turn to the opponent. No other state changes.
    pub fn end_turn(&mut self, actor: Role) -> Result<(), TurnError> {
        self.require_turn(actor)?;
        self.current = actor.opponent();
        Ok(())
    }

    /// Project the state for one recipient. The opponent's hand and deck
    /// contents are structurally absent, not filtered at serialization time.
    pub fn view_for(&self, viewer: Role, host_session: Uuid, guest_session: Uuid) -> GameStateView {
        let me = self.player(viewer);
        let opponent = self.player(viewer.opponent());
        GameStateView {
            my_hand: me.hand.clone(),
            my_active: me.active.clone(),
            my_deck_count: me.deck.len(),
            my_score: me.score,
            opponent_active: opponent.active.clone(),
            opponent_deck_count: opponent.deck.len(),
            opponent_score: opponent.score,
            current_player_session_id: match self.current {
                Role::Host => host_session,
                Role::Guest => guest_session,
            },
        }
    }
}

/// What one player is allowed to see of the match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub my_hand: Vec<GameCard>,
    pub my_active: Option<GameCard>,
    pub my_deck_count: usize,
    pub my_score: u8,
    pub opponent_active: Option<GameCard>,
    pub opponent_deck_count: usize,
    pub opponent_score: u8,
    pub current_player_session_id: Uuid,
}
