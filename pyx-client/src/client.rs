//! The HTTP implementation of the backend seams.
//!
//! # Lifecycle
//!
//! ```text
//! GET game.jsp -> GET cah.config.js -> POST first load -> POST register -> long poll ...
//! ```
//!
//! The bootstrap runs inside [`HttpConnector::connect`]. After a successful registration
//! the long poll loop is spawned. It pushes every event except no-ops into the event
//! channel and ends on the first transport failure, on an error object or on an
//! undecodable body. Ending the loop drops the sender, which is how the consumer learns
//! that the backend session is gone.

use crate::api::{BackendConnector, BackendSession, GameBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::event::{BackendEvent, decode_poll_body};
use crate::types::{GameDetails, GameId, GameInfo, ServerCapabilities, User, WhoisInfo};
use crate::wire::{
    BROADCASTING_USERS_SETTING, GLOBAL_CHAT_ENABLED_SETTING, SESSION_COOKIE, op, path, request,
    response,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Events the consumer has not picked up yet before the long poll waits.
const EVENT_BUFFER_SIZE: usize = 256;

/// Shared between the session handle and its long poll task.
struct Transport {
    http: reqwest::Client,
    config: BackendConfig,
    /// Next request serial, the backend rejects repeated ones.
    serial: AtomicU64,
}

impl Transport {
    fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Transport {
            http,
            config,
            serial: AtomicU64::new(0),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, BackendError> {
        let url = self.config.url(path);
        debug!(%url, "GET");
        Ok(self
            .http
            .get(url)
            .timeout(self.config.request_timeout())
            .send()
            .await?)
    }

    /// Posts a form with a fresh serial. Only requests that could not connect at all are
    /// retried, anything else might already have had an effect.
    async fn post(
        &self,
        path: &str,
        timeout: Duration,
        fields: &[(&str, &str)],
    ) -> Result<String, BackendError> {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed).to_string();
        let mut form = fields.to_vec();
        form.push((request::SERIAL, serial.as_str()));
        let url = self.config.url(path);

        let mut attempt = 1;
        loop {
            let result = self
                .http
                .post(&url)
                .timeout(timeout)
                .form(&form)
                .send()
                .await;
            match result {
                Ok(response) => return Ok(response.text().await?),
                Err(error) if error.is_connect() && attempt < self.config.retry_count => {
                    warn!(?error, attempt, %url, "Backend not reachable, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Runs one operation and checks the answer for an application error.
    async fn call(&self, operation: &str, fields: &[(&str, &str)]) -> Result<Value, BackendError> {
        let mut form = vec![(request::OP, operation)];
        form.extend_from_slice(fields);
        debug!(operation, "Backend call");
        let body = self
            .post(path::AJAX, self.config.request_timeout(), &form)
            .await?;
        let answer: Value = serde_json::from_str(&body)?;
        if answer
            .get(response::ERROR)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let code = answer
                .get(response::ERROR_CODE)
                .and_then(Value::as_str)
                .unwrap_or_default();
            debug!(operation, code, "Backend refused");
            return Err(BackendError::Application(code.to_owned().into()));
        }
        Ok(answer)
    }

    /// Obtains the session cookie and the server settings, returns the session id.
    async fn bootstrap(&self) -> Result<(String, ServerCapabilities), BackendError> {
        let page = self.get(path::GAME_PAGE).await?;
        let session_id = page
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_owned())
            .unwrap_or_default();

        let script = self.get(path::CONFIG_SCRIPT).await?.text().await?;
        let mut capabilities = ServerCapabilities {
            global_chat_enabled: script_flag(&script, GLOBAL_CHAT_ENABLED_SETTING),
            broadcasting_users: script_flag(&script, BROADCASTING_USERS_SETTING),
            server_started: 0,
        };

        let first_load = self.call(op::FIRST_LOAD, &[]).await?;
        if first_load
            .get(response::IN_PROGRESS)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let next = first_load
                .get(response::NEXT)
                .and_then(Value::as_str)
                .unwrap_or_default();
            warn!(%session_id, next, "Session already in progress");
            return Err(BackendError::SessionInProgress(session_id));
        }
        capabilities.server_started = first_load
            .get(response::SERVER_STARTED)
            .and_then(Value::as_i64)
            .unwrap_or_default();
        Ok((session_id, capabilities))
    }

    async fn register(&self, nickname: &str, id_code: &str) -> Result<User, BackendError> {
        let mut fields = vec![(request::NICKNAME, nickname)];
        if !id_code.is_empty() {
            fields.push((request::ID_CODE, id_code));
        }
        let answer = self.call(op::REGISTER, &fields).await?;
        Ok(serde_json::from_value(answer)?)
    }
}

/// Reads a boolean setting like `cah.GLOBAL_CHAT_ENABLED = true;` out of the config script.
fn script_flag(script: &str, setting: &str) -> bool {
    script
        .lines()
        .filter_map(|line| line.trim().strip_prefix(setting))
        .filter_map(|rest| rest.trim_start().strip_prefix('='))
        .any(|value| value.trim_start().starts_with("true"))
}

/// Moves one key out of an answer and decodes it.
fn take_field<T: DeserializeOwned>(mut answer: Value, key: &str) -> Result<T, BackendError> {
    match answer.get_mut(key) {
        Some(field) => Ok(serde_json::from_value(field.take())?),
        None => Err(BackendError::NonConforming(format!("answer without {key}"))),
    }
}

async fn poll_loop(
    transport: Arc<Transport>,
    session_id: String,
    events: mpsc::Sender<BackendEvent>,
    mut stop: watch::Receiver<bool>,
) {
    info!(%session_id, "Starting long poll");
    loop {
        let result = tokio::select! {
            _ = stop.changed() => break,
            result = transport.post(path::LONG_POLL, transport.config.long_poll_timeout(), &[]) => result,
        };
        let batch = match result.and_then(|body| decode_poll_body(&body)) {
            Ok(batch) => batch,
            Err(error) => {
                error!(%session_id, ?error, "Long poll failed");
                break;
            }
        };
        for event in batch {
            if matches!(event, BackendEvent::Noop) {
                continue;
            }
            debug!(%session_id, ?event, "Backend event");
            tokio::select! {
                _ = stop.changed() => {
                    info!(%session_id, "Stopping long poll");
                    return;
                }
                sent = events.send(event) => {
                    if sent.is_err() {
                        debug!(%session_id, "Event consumer gone");
                        return;
                    }
                }
            }
        }
    }
    info!(%session_id, "Stopping long poll");
}

/// A registered backend session talking HTTP.
pub struct HttpBackend {
    transport: Arc<Transport>,
    session_id: String,
    user: User,
    capabilities: ServerCapabilities,
    stop: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl GameBackend for HttpBackend {
    fn user(&self) -> &User {
        &self.user
    }

    fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    async fn names(&self) -> Result<Vec<String>, BackendError> {
        let answer = self.transport.call(op::NAMES, &[]).await?;
        take_field(answer, response::NAMES)
    }

    async fn game_list(&self) -> Result<Vec<GameInfo>, BackendError> {
        let answer = self.transport.call(op::GAME_LIST, &[]).await?;
        take_field(answer, response::GAMES)
    }

    async fn game_info(&self, game_id: GameId) -> Result<GameDetails, BackendError> {
        let game_id = game_id.to_string();
        let answer = self
            .transport
            .call(op::GAME_INFO, &[(request::GAME_ID, game_id.as_str())])
            .await?;
        Ok(serde_json::from_value(answer)?)
    }

    async fn send_global_chat(
        &self,
        text: &str,
        emote: bool,
        wall: bool,
    ) -> Result<(), BackendError> {
        let emote = emote.to_string();
        let wall = wall.to_string();
        self.transport
            .call(
                op::CHAT,
                &[
                    (request::MESSAGE, text),
                    (request::EMOTE, emote.as_str()),
                    (request::WALL, wall.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn send_game_chat(
        &self,
        game_id: GameId,
        text: &str,
        emote: bool,
    ) -> Result<(), BackendError> {
        let game_id = game_id.to_string();
        let emote = emote.to_string();
        self.transport
            .call(
                op::GAME_CHAT,
                &[
                    (request::GAME_ID, game_id.as_str()),
                    (request::MESSAGE, text),
                    (request::EMOTE, emote.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn spectate_game(&self, game_id: GameId, password: &str) -> Result<(), BackendError> {
        let game_id = game_id.to_string();
        self.transport
            .call(
                op::SPECTATE_GAME,
                &[
                    (request::GAME_ID, game_id.as_str()),
                    (request::PASSWORD, password),
                ],
            )
            .await?;
        Ok(())
    }

    async fn leave_game(&self, game_id: GameId) -> Result<(), BackendError> {
        let game_id = game_id.to_string();
        self.transport
            .call(op::LEAVE_GAME, &[(request::GAME_ID, game_id.as_str())])
            .await?;
        Ok(())
    }

    async fn whois(&self, nickname: &str) -> Result<WhoisInfo, BackendError> {
        let answer = self
            .transport
            .call(op::WHOIS, &[(request::NICKNAME, nickname)])
            .await?;
        Ok(serde_json::from_value(answer)?)
    }

    async fn stop_polling(&self) {
        self.stop.send_replace(true);
        let handle = self.poll_task.lock().await.take();
        if let Some(handle) = handle
            && let Err(error) = handle.await
        {
            error!(session_id = %self.session_id, ?error, "Internal panic in long poll");
        }
    }

    async fn log_out(&self) -> Result<(), BackendError> {
        info!(session_id = %self.session_id, "Logging out");
        self.transport.call(op::LOG_OUT, &[]).await?;
        Ok(())
    }
}

/// Creates [`HttpBackend`] sessions against one backend.
pub struct HttpConnector {
    config: BackendConfig,
}

impl HttpConnector {
    pub fn new(config: BackendConfig) -> Self {
        HttpConnector { config }
    }
}

#[async_trait]
impl BackendConnector for HttpConnector {
    async fn connect(&self, nickname: &str, id_code: &str) -> Result<BackendSession, BackendError> {
        let transport = Arc::new(Transport::new(self.config.clone())?);
        let (session_id, capabilities) = transport.bootstrap().await?;
        let user = transport.register(nickname, id_code).await?;
        info!(%session_id, nickname = %user.name, "Registered with backend");

        let (event_sender, events) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (stop, stop_receiver) = watch::channel(false);
        let poll_task = tokio::spawn(poll_loop(
            transport.clone(),
            session_id.clone(),
            event_sender,
            stop_receiver,
        ));

        let backend = HttpBackend {
            transport,
            session_id,
            user,
            capabilities,
            stop,
            poll_task: Mutex::new(Some(poll_task)),
        };
        Ok(BackendSession {
            backend: Arc::new(backend),
            events,
        })
    }
}
