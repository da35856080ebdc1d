//! Deck loading: the seam to the external deck store, plus validation.
//!
//! The relational store (users, cards, decks) lives outside this service;
//! the core only consumes `DeckRepository`. An in-memory implementation
//! backs the binary and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::game::typechart::ElementType;

/// A card as it exists inside a match. `hp` is mutated by damage; the rest
/// is frozen at match start.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameCard {
    pub id: i64,
    pub name: String,
    pub hp: i32,
    pub attack: i32,
    #[serde(rename = "type")]
    pub element: ElementType,
}

/// A deck row as the repository yields it.
#[derive(Debug, Clone)]
pub struct DeckRecord {
    pub id: i64,
    pub user_id: i64,
    pub owner_username: String,
    pub cards: Vec<GameCard>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("deck repository failure: {0}")]
pub struct RepoError(pub String);

#[async_trait]
pub trait DeckRepository: Send + Sync {
    async fn deck_by_id(&self, deck_id: i64) -> Result<Option<DeckRecord>, RepoError>;
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DeckError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("FORBIDDEN")]
    Forbidden,
    #[error("INVALID_DECK")]
    InvalidDeck,
    /// Repository failure; the detail stays in the log, the wire only sees
    /// the code.
    #[error("INTERNAL")]
    Repo(#[from] RepoError),
}

/// A validated deck ready to enter a match.
#[derive(Debug, Clone)]
pub struct LoadedDeck {
    pub owner_username: String,
    pub cards: Vec<GameCard>,
}

pub const DECK_SIZE: usize = 10;

/// Fetch `deck_id` on behalf of `for_user`: the deck must exist, belong to
/// that user, and hold exactly ten cards. Cards come back in repository
/// order; shuffling is the engine's job.
pub async fn load_deck(
    repo: &dyn DeckRepository,
    deck_id: i64,
    for_user: i64,
) -> Result<LoadedDeck, DeckError> {
    let record = repo.deck_by_id(deck_id).await?.ok_or(DeckError::NotFound)?;
    if record.user_id != for_user {
        return Err(DeckError::Forbidden);
    }
    if record.cards.len() != DECK_SIZE {
        return Err(DeckError::InvalidDeck);
    }
    Ok(LoadedDeck { owner_username: record.owner_username, cards: record.cards })
}

/// In-memory deck store, keyed by deck id.
#[derive(Default)]
pub struct InMemoryDeckRepository {
    decks: HashMap<i64, DeckRecord>,
}

impl InMemoryDeckRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: DeckRecord) {
        self.decks.insert(record.id, record);
    }

    /// A fixture store with two ready-to-play decks (deck 1 owned by user 1,
    /// deck 2 by user 2), drawn from the starter catalog.
    pub fn with_demo_decks() -> Self {
        let mut repo = Self::new();
        repo.insert(DeckRecord {
            id: 1,
            user_id: 1,
            owner_username: "ash".into(),
            cards: starter_deck(0),
        });
        repo.insert(DeckRecord {
            id: 2,
            user_id: 2,
            owner_username: "gary".into(),
            cards: starter_deck(100),
        });
        repo
    }
}

#[async_trait]
impl DeckRepository for InMemoryDeckRepository {
    async fn deck_by_id(&self, deck_id: i64) -> Result<Option<DeckRecord>, RepoError> {
        Ok(self.decks.get(&deck_id).cloned())
    }
}

/// Ten starter cards with ids offset by `id_base`.
pub fn starter_deck(id_base: i64) -> Vec<GameCard> {
    use ElementType::*;
    let roster: [(&str, i32, i32, ElementType); DECK_SIZE] = [
        ("Cindercub", 60, 50, Fire),
        ("Emberhound", 70, 45, Fire),
        ("Tidefin", 65, 40, Water),
        ("Wavelurker", 80, 35, Water),
        ("Thornling", 55, 45, Grass),
        ("Brackenboar", 75, 40, Grass),
        ("Voltmouse", 50, 55, Electric),
        ("Stormkite", 60, 50, Electric),
        ("Plainstrider", 90, 30, Normal),
        ("Dustbadger", 85, 35, Normal),
    ];
    roster
        .iter()
        .enumerate()
        .map(|(i, (name, hp, attack, element))| GameCard {
            id: id_base + i as i64 + 1,
            name: (*name).into(),
            hp: *hp,
            attack: *attack,
            element: *element,
        })
        .collect()
}
