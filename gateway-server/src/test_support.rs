//! A scripted backend and a harness that drives one session actor without a socket.

use crate::config::GatewayConfig;
use crate::session::{Outbound, SessionActor};
use crate::state::AppState;
use async_trait::async_trait;
use protocol::CHANNEL_BUFFER_SIZE;
use pyx_client::{
    BackendConnector, BackendError, BackendEvent, BackendSession, ErrorCode, GameBackend,
    GameDetails, GameId, GameInfo, GameOptions, GameState, PlayerInfo, PlayerStatus,
    ServerCapabilities, Sigil, User, WhoisInfo,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);
const SYNC_TOKEN: &str = "sync";

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        advertised_name: "irc.test".into(),
        bot_hostname: "bot.test".into(),
        user_hostname: "users.test".into(),
        ..GatewayConfig::default()
    }
}

/// Hosted by carol with dave playing, carol judging.
pub fn sample_game(id: GameId, state: GameState) -> GameDetails {
    GameDetails {
        game: GameInfo {
            id,
            host: "carol".into(),
            players: vec!["carol".into(), "dave".into()],
            spectators: Vec::new(),
            state,
            options: GameOptions {
                player_limit: 6,
                spectator_limit: 10,
                score_limit: 8,
            },
            has_password: false,
            created: 1_600_000,
        },
        players: vec![
            PlayerInfo {
                name: "carol".into(),
                score: 3,
                status: PlayerStatus::Judge,
            },
            PlayerInfo {
                name: "dave".into(),
                score: 1,
                status: PlayerStatus::Playing,
            },
        ],
    }
}

/// Records every call that changes something and fails the operations it is told to.
pub struct MockBackend {
    pub user: User,
    pub capabilities: ServerCapabilities,
    pub names: Mutex<Vec<String>>,
    games: Mutex<HashMap<GameId, GameDetails>>,
    whois: Mutex<HashMap<String, WhoisInfo>>,
    failures: Mutex<HashMap<&'static str, ErrorCode>>,
    panics: Mutex<Option<&'static str>>,
    calls: Mutex<Vec<String>>,
    connects: Mutex<Vec<(String, String)>>,
    stopped: AtomicBool,
    logged_out: AtomicBool,
}

impl MockBackend {
    pub fn new(nickname: &str) -> Self {
        MockBackend {
            user: User {
                name: nickname.into(),
                sigil: Sigil::NormalUser,
                id_code: String::new(),
            },
            capabilities: ServerCapabilities {
                global_chat_enabled: true,
                broadcasting_users: false,
                server_started: 1_500_000,
            },
            names: Mutex::new(vec!["@admin".into(), nickname.into()]),
            games: Mutex::new(HashMap::new()),
            whois: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            panics: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn add_game(&self, details: GameDetails) {
        self.games.lock().unwrap().insert(details.game.id, details);
    }

    pub fn update_game(&self, game_id: GameId, update: impl FnOnce(&mut GameDetails)) {
        update(self.games.lock().unwrap().get_mut(&game_id).unwrap());
    }

    pub fn remove_game(&self, game_id: GameId) {
        self.games.lock().unwrap().remove(&game_id);
    }

    pub fn add_whois(&self, info: WhoisInfo) {
        self.whois
            .lock()
            .unwrap()
            .insert(info.nickname.clone(), info);
    }

    /// Makes every later call of `operation` fail with `code`.
    pub fn fail(&self, operation: &'static str, code: ErrorCode) {
        self.failures.lock().unwrap().insert(operation, code);
    }

    /// Makes the next call of `operation` panic.
    pub fn panic_in(&self, operation: &'static str) {
        *self.panics.lock().unwrap() = Some(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<(String, String)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, operation: &str) -> Result<(), BackendError> {
        let panicking = self.panics.lock().unwrap().take_if(|name| *name == operation);
        if panicking.is_some() {
            panic!("{} blew up", operation);
        }
        match self.failures.lock().unwrap().get(operation) {
            Some(code) => Err(BackendError::Application(code.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GameBackend for MockBackend {
    fn user(&self) -> &User {
        &self.user
    }

    fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    async fn names(&self) -> Result<Vec<String>, BackendError> {
        self.check("names")?;
        Ok(self.names.lock().unwrap().clone())
    }

    async fn game_list(&self) -> Result<Vec<GameInfo>, BackendError> {
        self.check("game_list")?;
        let mut games: Vec<GameInfo> = self
            .games
            .lock()
            .unwrap()
            .values()
            .map(|details| details.game.clone())
            .collect();
        games.sort_by_key(|game| game.id);
        Ok(games)
    }

    async fn game_info(&self, game_id: GameId) -> Result<GameDetails, BackendError> {
        self.check("game_info")?;
        self.games
            .lock()
            .unwrap()
            .get(&game_id)
            .cloned()
            .ok_or(BackendError::Application(ErrorCode::InvalidGame))
    }

    async fn send_global_chat(&self, text: &str, emote: bool, wall: bool) -> Result<(), BackendError> {
        self.record(format!("global '{}' emote={} wall={}", text, emote, wall));
        self.check("global")
    }

    async fn send_game_chat(&self, game_id: GameId, text: &str, emote: bool) -> Result<(), BackendError> {
        self.record(format!("game {} '{}' emote={}", game_id, text, emote));
        self.check("game")
    }

    async fn spectate_game(&self, game_id: GameId, password: &str) -> Result<(), BackendError> {
        self.record(format!("spectate {} '{}'", game_id, password));
        self.check("spectate")?;
        let mut games = self.games.lock().unwrap();
        let details = games
            .get_mut(&game_id)
            .ok_or(BackendError::Application(ErrorCode::InvalidGame))?;
        details.game.spectators.push(self.user.name.clone());
        Ok(())
    }

    async fn leave_game(&self, game_id: GameId) -> Result<(), BackendError> {
        self.record(format!("leave {}", game_id));
        self.check("leave")?;
        if let Some(details) = self.games.lock().unwrap().get_mut(&game_id) {
            details.game.spectators.retain(|name| *name != self.user.name);
        }
        Ok(())
    }

    async fn whois(&self, nickname: &str) -> Result<WhoisInfo, BackendError> {
        self.check("whois")?;
        self.whois
            .lock()
            .unwrap()
            .get(nickname)
            .cloned()
            .ok_or(BackendError::Application(ErrorCode::NoSuchUser))
    }

    async fn stop_polling(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn log_out(&self) -> Result<(), BackendError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the mock backend once, together with the harness' event stream.
pub struct MockConnector {
    backend: Arc<MockBackend>,
    events: Mutex<Option<mpsc::Receiver<BackendEvent>>>,
    refusal: Option<ErrorCode>,
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self, nickname: &str, id_code: &str) -> Result<BackendSession, BackendError> {
        self.backend
            .connects
            .lock()
            .unwrap()
            .push((nickname.to_string(), id_code.to_string()));
        if let Some(code) = &self.refusal {
            return Err(BackendError::Application(code.clone()));
        }
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BackendError::SessionInProgress(nickname.to_string()))?;
        Ok(BackendSession {
            backend: self.backend.clone(),
            events,
        })
    }
}

/// One session actor wired to channels instead of a socket.
pub struct Harness {
    backend: Arc<MockBackend>,
    inbound: mpsc::Sender<String>,
    outbound: mpsc::Receiver<Outbound>,
    events: Option<mpsc::Sender<BackendEvent>>,
    actor: JoinHandle<&'static str>,
}

impl Harness {
    pub async fn start(backend: MockBackend) -> Self {
        Self::launch(backend, None).await
    }

    /// A harness whose backend login fails with `code`.
    pub async fn start_refusing(code: ErrorCode) -> Self {
        Self::launch(MockBackend::new("alice"), Some(code)).await
    }

    async fn launch(backend: MockBackend, refusal: Option<ErrorCode>) -> Self {
        let backend = Arc::new(backend);
        let (event_sender, event_receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let connector = MockConnector {
            backend: backend.clone(),
            events: Mutex::new(Some(event_receiver)),
            refusal,
        };
        let state = Arc::new(AppState::new(test_config(), Arc::new(connector)));
        let address: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let id = state.register(address).await;

        let (outbound_sender, outbound) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (inbound, inbound_receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let actor = SessionActor::new(state, id, address, outbound_sender);
        let actor = tokio::spawn(actor.run(inbound_receiver));

        Harness {
            backend,
            inbound,
            outbound,
            events: Some(event_sender),
            actor,
        }
    }

    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    pub async fn send(&self, line: &str) {
        self.inbound.send(line.to_string()).await.unwrap();
    }

    pub async fn event(&self, event: BackendEvent) {
        self.events
            .as_ref()
            .unwrap()
            .send(event)
            .await
            .unwrap();
    }

    /// Ends the backend event stream, as a dying long poll does.
    pub fn close_events(&mut self) {
        self.events = None;
    }

    /// Everything produced until a ping sent now is answered. Events already delivered
    /// are handled before the ping.
    pub async fn sync(&mut self) -> Vec<String> {
        self.send(&format!("PING :{}", SYNC_TOKEN)).await;
        let pong = format!(":irc.test PONG irc.test :{}", SYNC_TOKEN);
        let mut lines = Vec::new();
        loop {
            let next = tokio::time::timeout(WAIT, self.outbound.recv())
                .await
                .expect("no answer from the session");
            match next {
                Some(Outbound::Line(line)) if line == pong => break,
                // Not registered yet, the ping is refused.
                Some(Outbound::Line(line)) if line.contains(" 451 ") && line.contains(" PING ") => {
                    break;
                }
                Some(Outbound::Line(line)) => lines.push(line),
                Some(Outbound::Close(line)) => {
                    lines.push(line);
                    break;
                }
                None => break,
            }
        }
        lines
    }

    /// Sends a line and returns everything it produced.
    pub async fn exchange(&mut self, line: &str) -> Vec<String> {
        self.send(line).await;
        self.sync().await
    }

    /// Registers under the backend user's name and discards the welcome burst.
    pub async fn register(&mut self) {
        let nickname = self.backend.user.name.clone();
        self.exchange(&format!("NICK {}", nickname)).await;
        let lines = self
            .exchange(&format!("USER {} 0 * :{}", nickname, nickname))
            .await;
        assert!(lines[0].contains(" 001 "), "not registered: {:?}", lines);
    }

    /// Everything until the session closes the outbound queue.
    pub async fn until_closed(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let next = tokio::time::timeout(WAIT, self.outbound.recv())
                .await
                .expect("session did not close");
            match next {
                Some(Outbound::Line(line)) | Some(Outbound::Close(line)) => lines.push(line),
                None => return lines,
            }
        }
    }

    /// The reason the actor ended with.
    pub async fn finish(&mut self) -> &'static str {
        tokio::time::timeout(WAIT, &mut self.actor)
            .await
            .expect("session did not end")
            .unwrap()
    }
}

/// Shared state whose connector logs in as alice, without events.
pub fn test_state() -> Arc<AppState> {
    let (_, events) = mpsc::channel(1);
    let connector = MockConnector {
        backend: Arc::new(MockBackend::new("alice")),
        events: Mutex::new(Some(events)),
        refusal: None,
    };
    Arc::new(AppState::new(test_config(), Arc::new(connector)))
}
