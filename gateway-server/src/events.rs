//! Translation of backend events into protocol lines.
//!
//! Game scoped events are only shown when they concern the game the session is in, and
//! the game lifecycle (lobby, playing, judging) is followed through the membership.

use crate::channels::game_topic;
use crate::session::{Flow, SessionActor};
use protocol::{
    JOIN, KICK, KILL, MODE, NAMES_LINE_BUDGET, NOTICE, PART, PRIVMSG, QUIT, TOPIC, join_into_lines,
    make_emote,
};
use pyx_client::{BackendEvent, ChatMessage, ErrorCode, GameBackend, GameId, Sigil, StateChange, WhiteCard};

const KICKED_MESSAGE: &str = "You have been kicked by the server administrator.";
const BANNED_MESSAGE: &str = "You have been banned by the server administrator.";

/// `[card] [card]`
fn render_cards(cards: &[WhiteCard]) -> String {
    cards
        .iter()
        .map(|card| format!("[{}]", card))
        .collect::<Vec<_>>()
        .join(" ")
}

impl SessionActor {
    pub(crate) async fn handle_event(&mut self, event: BackendEvent) -> Flow {
        let Some(backend) = self.backend() else {
            tracing::debug!(session = self.id, ?event, "Event without a backend session.");
            return Flow::Continue;
        };
        let backend = backend.as_ref();
        tracing::trace!(session = self.id, ?event, "Backend event");

        match event {
            BackendEvent::Chat(chat) => self.forward_chat(backend, chat).await,
            BackendEvent::FilteredChat(mut chat) => {
                chat.message = format!("(Filtered) {}", chat.message);
                if let Some(game_id) = chat
                    .game_id
                    .filter(|game_id| self.current_game_id() != Some(*game_id))
                {
                    // Administrators get to see these for every game, show them globally.
                    chat.message = format!("[game {}] {}", game_id, chat.message);
                    chat.game_id = None;
                }
                self.forward_chat(backend, chat).await;
            }
            BackendEvent::NewPlayer {
                nickname, sigil, ..
            } => self.announce_arrival(backend, &nickname, sigil).await,
            BackendEvent::PlayerLeave { nickname, reason } => {
                if nickname != backend.user().name {
                    let line = format!(
                        ":{} {} :{}",
                        self.user_mask(&nickname),
                        QUIT,
                        reason.describe()
                    );
                    self.send(line).await;
                }
            }
            // Our own joins and parts come back from the backend after membership already changed.
            BackendEvent::GamePlayerJoin { nickname, .. }
            | BackendEvent::GameSpectatorJoin { nickname, .. }
            | BackendEvent::GamePlayerLeave { nickname, .. }
            | BackendEvent::GameSpectatorLeave { nickname, .. }
            | BackendEvent::GamePlayerKickedIdle { nickname, .. }
                if nickname == backend.user().name =>
            {
                tracing::trace!(session = self.id, "Own membership change echoed.");
            }
            BackendEvent::GamePlayerJoin { game_id, nickname } => {
                self.announce_game_join(backend, game_id, &nickname, true)
                    .await
            }
            BackendEvent::GameSpectatorJoin { game_id, nickname } => {
                self.announce_game_join(backend, game_id, &nickname, false)
                    .await
            }
            BackendEvent::GamePlayerLeave { game_id, nickname }
            | BackendEvent::GameSpectatorLeave { game_id, nickname } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.process_leave(backend, game_id, &channel, &nickname, "Leaving")
                        .await;
                }
            }
            BackendEvent::GamePlayerKickedIdle { game_id, nickname } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.game_notice(&channel, &format!("{} was kicked for being idle.", nickname))
                        .await;
                    self.process_leave(
                        backend,
                        game_id,
                        &channel,
                        &nickname,
                        "Kicked for being idle",
                    )
                    .await;
                }
            }
            BackendEvent::KickedFromGameIdle { game_id } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.remove_from_game(&channel, "Kicked for being idle.")
                        .await;
                }
            }
            BackendEvent::GamePlayerSkipped { game_id, nickname } => {
                self.notify_game(
                    game_id,
                    &format!("{} was skipped this round for being idle.", nickname),
                )
                .await
            }
            BackendEvent::GameJudgeSkipped { game_id, nickname } => {
                self.notify_game(
                    game_id,
                    &format!(
                        "{} was skipped as judge for being idle. A new round will start.",
                        nickname
                    ),
                )
                .await
            }
            BackendEvent::GameJudgeLeft { game_id } => {
                self.notify_game(game_id, "The judge left the game. A new round will start.")
                    .await
            }
            BackendEvent::GameBlackReshuffle { game_id } => {
                self.notify_game(game_id, "The black card deck has been reshuffled.")
                    .await
            }
            BackendEvent::GameWhiteReshuffle { game_id } => {
                self.notify_game(game_id, "The white card discard pile has been reshuffled.")
                    .await
            }
            BackendEvent::GameOptionsChanged { game_id } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.refresh_topic(backend, game_id, &channel).await;
                }
            }
            BackendEvent::GameStateChange { game_id, change } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.change_state(backend, game_id, &channel, change).await;
                }
            }
            BackendEvent::GameRoundComplete {
                game_id,
                round_winner,
                winning_card,
            } => {
                if let Some(channel) = self.game_target(game_id) {
                    self.complete_round(backend, game_id, &channel, &round_winner, winning_card)
                        .await;
                }
            }
            BackendEvent::Kicked => return self.kill(KICKED_MESSAGE).await,
            BackendEvent::Banned => return self.kill(BANNED_MESSAGE).await,
            BackendEvent::GameListRefresh
            | BackendEvent::GamePlayerInfoChange
            | BackendEvent::HandDeal
            | BackendEvent::Noop => {}
            BackendEvent::Unrecognized { kind, raw } => {
                tracing::warn!(session = self.id, kind = %kind, "Unhandled event.");
                let line = format!(
                    ":{} {} {} :Unhandled event {}: {}",
                    self.bot_mask(),
                    PRIVMSG,
                    self.nick(),
                    kind,
                    raw
                );
                self.send(line).await;
            }
        }
        Flow::Continue
    }

    /// The channel of `game_id` if it is the current game. Events for any other game are
    /// a desync and get dropped.
    fn game_target(&self, game_id: GameId) -> Option<String> {
        if self.current_game_id() == Some(game_id) {
            return self.current_game_channel();
        }
        tracing::error!(
            session = self.id,
            game_id,
            joined = ?self.current_game_id(),
            "Event for a game we are not in."
        );
        None
    }

    async fn game_notice(&self, channel: &str, text: &str) {
        let line = format!(":{} {} {} :{}", self.bot_mask(), PRIVMSG, channel, text);
        self.send(line).await;
    }

    async fn notify_game(&self, game_id: GameId, text: &str) {
        if let Some(channel) = self.game_target(game_id) {
            self.game_notice(&channel, text).await;
        }
    }

    async fn forward_chat(&self, backend: &dyn GameBackend, chat: ChatMessage) {
        if chat.from == backend.user().name {
            return;
        }
        let sender = self.user_mask(&chat.from);
        if chat.wall {
            let line = format!(
                ":{} {} {} :Global notice: {}",
                sender,
                NOTICE,
                self.nick(),
                chat.message
            );
            self.send(line).await;
            return;
        }

        let target = match chat.game_id {
            None => self.state.config.global_channel.clone(),
            Some(game_id) => match self.game_target(game_id) {
                Some(channel) => channel,
                None => return,
            },
        };
        let text = if chat.emote {
            make_emote(&chat.message)
        } else {
            chat.message
        };
        self.send(format!(":{} {} {} :{}", sender, PRIVMSG, target, text))
            .await;
    }

    async fn announce_arrival(&self, backend: &dyn GameBackend, nickname: &str, sigil: Sigil) {
        if nickname == backend.user().name {
            return;
        }
        let global = &self.state.config.global_channel;
        let line = format!(":{} {} :{}", self.user_mask(nickname), JOIN, global);
        self.send(line).await;

        let mode = match sigil {
            Sigil::Admin => "+o",
            Sigil::IdCode => "+v",
            Sigil::NormalUser => return,
        };
        let line = format!(
            ":{} {} {} {} {}",
            self.bot_mask(),
            MODE,
            global,
            mode,
            nickname
        );
        self.send(line).await;
    }

    async fn announce_game_join(
        &mut self,
        backend: &dyn GameBackend,
        game_id: GameId,
        nickname: &str,
        player: bool,
    ) {
        let Some(channel) = self.game_target(game_id) else {
            return;
        };
        let line = format!(":{} {} {}", self.user_mask(nickname), JOIN, channel);
        self.send(line).await;
        if player {
            let line = format!(":{} {} {} +v {}", self.bot_mask(), MODE, channel, nickname);
            self.send(line).await;
        }
        self.refresh_topic(backend, game_id, &channel).await;
    }

    /// Someone left our game. When it was the host, the backend either names a new one or
    /// has dissolved the game, which it does not tell spectators otherwise.
    async fn process_leave(
        &mut self,
        backend: &dyn GameBackend,
        game_id: GameId,
        channel: &str,
        nickname: &str,
        reason: &str,
    ) {
        let line = format!(":{} {} {} :{}", self.user_mask(nickname), PART, channel, reason);
        self.send(line).await;

        let was_host = self
            .session
            .membership
            .as_ref()
            .is_some_and(|membership| membership.host == nickname);
        if was_host {
            match backend.game_info(game_id).await {
                Err(error) if error.code() == Some(&ErrorCode::InvalidGame) => {
                    tracing::info!(session = self.id, game_id, "Game dissolved after the host left.");
                    self.remove_from_game(channel, "Forcibly removed by server.")
                        .await;
                    return;
                }
                Err(error) => {
                    tracing::error!(session = self.id, game_id, ?error, "Unable to look up the new host.");
                }
                Ok(details) => {
                    let host = details.game.host;
                    let line = format!(":{} {} {} +o {}", self.bot_mask(), MODE, channel, host);
                    self.send(line).await;
                    if let Some(membership) = self.session.membership.as_mut() {
                        membership.host = host;
                    }
                }
            }
        }
        self.refresh_topic(backend, game_id, channel).await;
    }

    async fn remove_from_game(&mut self, channel: &str, reason: &str) {
        let line = format!(
            ":{} {} {} {} :{}",
            self.bot_mask(),
            KICK,
            channel,
            self.nick(),
            reason
        );
        self.send(line).await;
        self.session.membership = None;
    }

    async fn refresh_topic(&mut self, backend: &dyn GameBackend, game_id: GameId, channel: &str) {
        match backend.game_info(game_id).await {
            Ok(details) => {
                let line = format!(
                    ":{} {} {} :{}",
                    self.bot_mask(),
                    TOPIC,
                    channel,
                    game_topic(&details.game)
                );
                self.send(line).await;
                if let Some(membership) = self.session.membership.as_mut() {
                    membership.host = details.game.host;
                }
            }
            Err(error) => {
                tracing::error!(session = self.id, game_id, ?error, "Unable to refresh the topic.");
            }
        }
    }

    /// The judge of the current round, if the backend can tell.
    async fn current_judge(&self, backend: &dyn GameBackend, game_id: GameId) -> Option<String> {
        match backend.game_info(game_id).await {
            Ok(details) => details.judge().map(str::to_string),
            Err(error) => {
                tracing::error!(session = self.id, game_id, ?error, "Unable to look up the judge.");
                None
            }
        }
    }

    async fn change_state(
        &mut self,
        backend: &dyn GameBackend,
        game_id: GameId,
        channel: &str,
        change: StateChange,
    ) {
        match change {
            StateChange::Lobby => {
                self.refresh_topic(backend, game_id, channel).await;
                self.game_notice(channel, "The game has been reset to the lobby state.")
                    .await;
                if let Some(membership) = self.session.membership.as_mut() {
                    membership.round_in_progress = false;
                    membership.played_cards.clear();
                }
            }
            StateChange::Playing { black_card } => {
                let newly_started = match self.session.membership.as_mut() {
                    Some(membership) if !membership.round_in_progress => {
                        membership.round_in_progress = true;
                        true
                    }
                    _ => false,
                };
                if newly_started {
                    self.refresh_topic(backend, game_id, channel).await;
                }
                self.game_notice(
                    channel,
                    &format!("The black card for the next round is: {}", black_card),
                )
                .await;
                // TODO: solicit a play once playing is supported, spectators only watch for now.
                match self.current_judge(backend, game_id).await {
                    Some(judge) if judge == backend.user().name => {
                        self.game_notice(channel, "You are judging this round.")
                            .await
                    }
                    Some(judge) => {
                        self.game_notice(channel, &format!("The judge this round is {}.", judge))
                            .await
                    }
                    None => {}
                }
            }
            StateChange::Judging { white_cards } => {
                self.game_notice(channel, "The white cards for this round are:")
                    .await;
                for (index, grouping) in white_cards.iter().enumerate() {
                    let text = format!("(Selection {}) {}", index + 1, render_cards(grouping));
                    self.game_notice(channel, &text).await;
                }
                let plural = white_cards.first().is_some_and(|grouping| grouping.len() > 1);
                if let Some(judge) = self.current_judge(backend, game_id).await {
                    if judge != backend.user().name {
                        let text = format!(
                            "Please wait while {} selects the winning card{}.",
                            judge,
                            if plural { "s" } else { "" }
                        );
                        self.game_notice(channel, &text).await;
                    }
                }
                if let Some(membership) = self.session.membership.as_mut() {
                    membership.played_cards = white_cards;
                }
            }
        }
    }

    async fn complete_round(
        &mut self,
        backend: &dyn GameBackend,
        game_id: GameId,
        channel: &str,
        round_winner: &str,
        winning_card: i64,
    ) {
        let played = self
            .session
            .membership
            .as_mut()
            .map(|membership| std::mem::take(&mut membership.played_cards))
            .unwrap_or_default();
        // The winning id is always the first card of its grouping.
        let winning = played
            .iter()
            .find(|grouping| grouping.first().is_some_and(|card| card.id == winning_card));
        let announcement = match winning {
            Some(grouping) => format!("The round was won by {} with {}.", round_winner, render_cards(grouping)),
            None => {
                tracing::warn!(session = self.id, game_id, winning_card, "Winning card not among the played cards.");
                format!("The round was won by {}.", round_winner)
            }
        };
        self.game_notice(channel, &announcement).await;

        let details = match backend.game_info(game_id).await {
            Ok(details) => details,
            Err(error) => {
                tracing::error!(session = self.id, game_id, ?error, "Unable to retrieve the scores.");
                return;
            }
        };
        let scores: Vec<String> = details
            .players
            .iter()
            .map(|player| format!("{} ({})", player.name, player.score))
            .collect();
        match join_into_lines(NAMES_LINE_BUDGET, scores.as_slice(), ", ") {
            Ok(lines) => {
                for line in lines {
                    self.game_notice(channel, &format!("Scores: {}", line))
                        .await;
                }
            }
            Err(error) => {
                tracing::error!(session = self.id, ?error, "Scores do not fit into a line.");
            }
        }
        if let Some(winner) = details.winner() {
            self.game_notice(channel, &format!("{} has won the game!", winner))
                .await;
        }
    }

    /// Removal by the backend: a KILL from the bridge's own identity, then the connection ends.
    async fn kill(&self, message: &str) -> Flow {
        let config = &self.state.config;
        let server = self.state.replies.server_name();
        tracing::info!(session = self.id, nickname = self.nick(), reason = message, "Removed by the backend.");
        let line = format!(
            ":{} {} {} :{}!{} ({})",
            self.bot_mask(),
            KILL,
            self.nick(),
            server,
            config.bot_nick,
            message
        );
        self.send(line).await;
        Flow::Disconnect(format!(
            "{} (Killed ({} ({})))",
            server, config.bot_nick, message
        ))
    }
}
