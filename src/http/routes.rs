//! Shared app state and the plain-HTTP surface.
//!
//! Signup/signin, the card catalog, and deck CRUD are served by the
//! surrounding system; they mount their routes on the same router this
//! module's state feeds.

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::deck::DeckRepository;
use crate::room::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub decks: Arc<dyn DeckRepository>,
    pub auth: Authenticator,
}

pub async fn healthz() -> &'static str {
    "ok"
}
