//! The per-connection session actor.
//!
//! One task owns the [`Session`] and handles both the client's lines and the backend's
//! events, so membership is only ever touched from one place. Everything it wants to send
//! goes through the outbound queue in the order it was produced.
//!
//! ```text
//! reader task --lines--> SessionActor --Outbound--> writer task
//!                              ^
//!          long poll --BackendEvent
//! ```

use crate::channels::game_channel;
use crate::state::AppState;
use futures_util::FutureExt;
use pyx_client::{BackendEvent, GameBackend, GameId, WhiteCard};
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the writer task gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Line(String),
    /// The last line of the connection. Written and flushed before the socket is shut down.
    Close(String),
}

/// Whether the connection survives a handled line or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Ends the connection with a closing line carrying the reason.
    Disconnect(String),
}

pub enum Registration {
    Unregistered,
    Registered(Arc<dyn GameBackend>),
    Closed,
}

/// The game the session is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub game_id: GameId,
    pub spectating: bool,
    /// Used to detect the host leaving.
    pub host: String,
    /// Suppresses the topic refresh for a round that was running when we joined.
    pub round_in_progress: bool,
    /// The groupings of the current judging phase, the round result only names a card id.
    pub played_cards: Vec<Vec<WhiteCard>>,
}

impl Membership {
    pub fn new(game_id: GameId, spectating: bool) -> Self {
        Membership {
            game_id,
            spectating,
            host: String::new(),
            round_in_progress: false,
            played_cards: Vec::new(),
        }
    }
}

pub struct Session {
    pub address: SocketAddr,
    pub nickname: Option<String>,
    /// Passed on to the backend as identification code.
    pub password: String,
    pub has_user: bool,
    pub registration: Registration,
    pub membership: Option<Membership>,
}

pub struct SessionActor {
    pub(crate) state: Arc<AppState>,
    pub(crate) id: u64,
    pub(crate) session: Session,
    outbound: mpsc::Sender<Outbound>,
    pub(crate) events: Option<mpsc::Receiver<BackendEvent>>,
}

async fn next_event(events: &mut Option<mpsc::Receiver<BackendEvent>>) -> Option<BackendEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Turns a panicking handler into a disconnect, so the session still gets torn down.
async fn guarded(session: u64, handler: impl Future<Output = Flow>) -> Flow {
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(flow) => flow,
        Err(_) => {
            tracing::error!(session, "Internal panic in session.");
            Flow::Disconnect("Internal error".to_string())
        }
    }
}

impl SessionActor {
    pub fn new(
        state: Arc<AppState>,
        id: u64,
        address: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        SessionActor {
            state,
            id,
            session: Session {
                address,
                nickname: None,
                password: String::new(),
                has_user: false,
                registration: Registration::Unregistered,
                membership: None,
            },
            outbound,
            events: None,
        }
    }

    /// Processes lines and events until one of them ends the session or the client goes away.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) -> &'static str {
        let reason = loop {
            let flow = tokio::select! {
                // Backend events first, so a command never overtakes an event that already arrived.
                biased;
                event = next_event(&mut self.events) => match event {
                    Some(event) => guarded(self.id, self.handle_event(event)).await,
                    None => {
                        tracing::info!(session = self.id, "Backend event stream ended.");
                        self.events = None;
                        Flow::Disconnect("Disconnected from PYX.".to_string())
                    }
                },
                line = inbound.recv() => match line {
                    Some(line) => guarded(self.id, self.handle_line(&line)).await,
                    None => break "Connection lost.",
                },
            };
            if let Flow::Disconnect(why) = flow {
                self.send_closing(&why).await;
                break "Session closed.";
            }
        };
        self.teardown().await;
        reason
    }

    /// Stops the long poll and logs out. Failures only get logged.
    async fn teardown(&mut self) {
        let registration = std::mem::replace(&mut self.session.registration, Registration::Closed);
        if let Registration::Registered(backend) = registration {
            backend.stop_polling().await;
            if let Err(error) = backend.log_out().await {
                tracing::warn!(session = self.id, ?error, "Backend log out failed.");
            }
        }
        self.session.membership = None;
        tracing::info!(session = self.id, nickname = self.nick(), "Session torn down.");
    }

    /// The nickname as the client knows it, `*` before one was given.
    pub(crate) fn nick(&self) -> &str {
        self.session.nickname.as_deref().unwrap_or("*")
    }

    pub(crate) fn backend(&self) -> Option<Arc<dyn GameBackend>> {
        match &self.session.registration {
            Registration::Registered(backend) => Some(backend.clone()),
            _ => None,
        }
    }

    pub(crate) async fn send(&self, line: String) {
        if self.outbound.send(Outbound::Line(line)).await.is_err() {
            tracing::debug!(session = self.id, "Outbound queue closed, dropping line.");
        }
    }

    /// `:<server> <code> <nick> <body>`
    pub(crate) async fn reply(&self, code: &str, body: impl Display) {
        let line = self.state.replies.format(code, self.nick(), body);
        self.send(line).await;
    }

    /// `:<server> <code> <nick> :<message>`
    pub(crate) async fn reply_simple(&self, code: &str, message: impl Display) {
        let line = self.state.replies.simple(code, self.nick(), message);
        self.send(line).await;
    }

    async fn send_closing(&self, why: &str) {
        let line = format!(
            "ERROR :Closing Link: {}[{}] ({})",
            self.nick(),
            self.session.address.ip(),
            why
        );
        if self.outbound.send(Outbound::Close(line)).await.is_err() {
            tracing::debug!(session = self.id, "Outbound queue closed before closing line.");
        }
    }

    pub(crate) fn bot_mask(&self) -> String {
        let config = &self.state.config;
        format!(
            "{}!{}@{}",
            config.bot_nick, config.bot_username, config.bot_hostname
        )
    }

    pub(crate) fn user_mask(&self, nick: &str) -> String {
        format!(
            "{}!{}@{}",
            nick,
            user_name(nick),
            self.state.config.user_hostname
        )
    }

    /// The channel of the current game, if any.
    pub(crate) fn current_game_channel(&self) -> Option<String> {
        self.session
            .membership
            .as_ref()
            .map(|membership| game_channel(&self.state.config, membership.game_id, membership.spectating))
    }

    pub(crate) fn current_game_id(&self) -> Option<GameId> {
        self.session
            .membership
            .as_ref()
            .map(|membership| membership.game_id)
    }
}

/// The user part of a mask: the nickname, lower case and cut to ten characters.
pub fn user_name(nick: &str) -> String {
    nick.chars().take(10).collect::<String>().to_ascii_lowercase()
}
