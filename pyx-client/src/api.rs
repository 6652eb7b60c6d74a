//! The seams between the bridge and the backend.
//!
//! The gateway only ever talks to a [`GameBackend`] obtained from a [`BackendConnector`],
//! so the HTTP implementation can be replaced by an in-memory one in tests.

use crate::error::BackendError;
use crate::event::BackendEvent;
use crate::types::{GameDetails, GameId, GameInfo, ServerCapabilities, User, WhoisInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One logged in backend session.
#[async_trait]
pub trait GameBackend: Send + Sync {
    /// The identity the backend registered us with.
    fn user(&self) -> &User;

    fn capabilities(&self) -> &ServerCapabilities;

    /// The occupants of the global lobby, prefixed with their sigil.
    async fn names(&self) -> Result<Vec<String>, BackendError>;

    async fn game_list(&self) -> Result<Vec<GameInfo>, BackendError>;

    async fn game_info(&self, game_id: GameId) -> Result<GameDetails, BackendError>;

    async fn send_global_chat(&self, text: &str, emote: bool, wall: bool)
    -> Result<(), BackendError>;

    async fn send_game_chat(
        &self,
        game_id: GameId,
        text: &str,
        emote: bool,
    ) -> Result<(), BackendError>;

    async fn spectate_game(&self, game_id: GameId, password: &str) -> Result<(), BackendError>;

    async fn leave_game(&self, game_id: GameId) -> Result<(), BackendError>;

    async fn whois(&self, nickname: &str) -> Result<WhoisInfo, BackendError>;

    /// Ends the long poll and waits for it. Idempotent.
    async fn stop_polling(&self);

    async fn log_out(&self) -> Result<(), BackendError>;
}

/// A freshly established session together with its event stream.
///
/// The stream ends when the long poll terminates, for whatever reason.
pub struct BackendSession {
    pub backend: Arc<dyn GameBackend>,
    pub events: mpsc::Receiver<BackendEvent>,
}

/// Creates backend sessions.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Bootstraps a session and registers the nickname. An empty `id_code` registers
    /// without identification.
    async fn connect(&self, nickname: &str, id_code: &str) -> Result<BackendSession, BackendError>;
}
