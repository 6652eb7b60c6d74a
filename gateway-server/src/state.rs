//! The state shared by all connections.
//! It provides:
//! - [`AppState`]: configuration, reply formatter, backend connector and the session registry
//! - [`SessionEntry`]: what the registry knows about one connection

use crate::config::GatewayConfig;
use protocol::ReplyFormatter;
use pyx_client::BackendConnector;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

/// The registry entry of one connection.
pub struct SessionEntry {
    pub address: SocketAddr,
    /// Set once the session registered with the backend.
    pub nickname: Option<String>,
    pub connected_at: Instant,
}

/// The application state.
pub struct AppState {
    pub config: GatewayConfig,
    pub replies: ReplyFormatter,
    pub connector: Arc<dyn BackendConnector>,
    /// All live connections by session id.
    pub sessions: Mutex<HashMap<u64, SessionEntry>>,
    next_session_id: AtomicU64,
}

impl AppState {
    pub fn new(config: GatewayConfig, connector: Arc<dyn BackendConnector>) -> Self {
        let replies = ReplyFormatter::new(config.advertised_name.clone());
        AppState {
            config,
            replies,
            connector,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Adds a fresh connection and returns its session id.
    pub async fn register(&self, address: SocketAddr) -> u64 {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().await.insert(
            id,
            SessionEntry {
                address,
                nickname: None,
                connected_at: Instant::now(),
            },
        );
        id
    }

    pub async fn set_nickname(&self, id: u64, nickname: &str) {
        if let Some(entry) = self.sessions.lock().await.get_mut(&id) {
            entry.nickname = Some(nickname.to_string());
        }
    }

    pub async fn unregister(&self, id: u64) {
        if self.sessions.lock().await.remove(&id).is_none() {
            tracing::warn!(session = id, "Unregistering unknown session.");
        }
    }

    /// One line per live session, ordered by session id.
    pub async fn listing(&self) -> String {
        let sessions = self.sessions.lock().await;
        let mut entries: Vec<_> = sessions.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        entries
            .into_iter()
            .map(|(id, entry)| {
                format!(
                    "Session: {:05} Address: {:<22} Nickname: {:<30} Connected for: {}s",
                    id,
                    entry.address.to_string(),
                    entry.nickname.as_deref().unwrap_or("*"),
                    entry.connected_at.elapsed().as_secs()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
