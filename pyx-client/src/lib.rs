//! Client for the card game backend.
//!
//! The backend speaks form encoded requests answered with JSON plus a long poll for
//! events. [`HttpConnector`] establishes sessions, [`GameBackend`] is what a session offers.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod types;
pub mod wire;

pub use api::{BackendConnector, BackendSession, GameBackend};
pub use client::{HttpBackend, HttpConnector};
pub use config::BackendConfig;
pub use error::BackendError;
pub use event::{BackendEvent, ChatMessage, StateChange};
pub use types::{
    BlackCard, DisconnectReason, ErrorCode, GameDetails, GameId, GameInfo, GameOptions,
    GameState, PlayerInfo, PlayerStatus, ServerCapabilities, Sigil, User, WhiteCard, WhoisInfo,
};
