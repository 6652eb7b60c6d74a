//! The command router: everything a client line can do.
//!
//! Before registration only identity commands are accepted. As soon as both a nickname
//! and the user line are known the backend login is attempted; its failure ends the
//! connection. After registration the full table applies.

use crate::channels::{
    ChannelTarget, game_channel, game_modes, game_topic, global_modes, global_topic,
    list_channels,
};
use crate::errors::{already_left, join_failure};
use crate::session::{Flow, Membership, Registration, SessionActor, user_name};
use protocol::numerics::*;
use protocol::{
    JOIN, MODE, Message, NAMES_LINE_BUDGET, PART, PONG, join_into_lines, parse_emote,
};
use pyx_client::{BackendSession, ErrorCode, GameBackend, GameDetails, GameState, Sigil, User};

const VERSION: &str = concat!("pyx-irc-", env!("CARGO_PKG_VERSION"));

/// A letter or underscore followed by 2 to 29 letters, digits or underscores.
pub fn valid_nickname(nick: &str) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && (3..=30).contains(&nick.len())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The user modes reflecting the backend sigil: `o` for administrators, `r` for verified users.
pub fn user_modes(user: &User) -> String {
    let mut modes = String::from("+");
    if user.is_admin() {
        modes.push('o');
    }
    if user.is_verified() {
        modes.push('r');
    }
    modes
}

impl SessionActor {
    pub(crate) async fn handle_line(&mut self, line: &str) -> Flow {
        tracing::debug!(session = self.id, line, "Received");
        let message = Message::parse(line);
        match self.backend() {
            Some(backend) => self.handle_registered(backend.as_ref(), message).await,
            None => self.handle_unregistered(message).await,
        }
    }

    async fn handle_unregistered(&mut self, message: Message) -> Flow {
        match message.command.as_str() {
            "CAP" => self.handle_cap().await,
            "NICK" => match message.arg(0) {
                None => {
                    self.reply_simple(ERR_NONICKNAMEGIVEN, "No nickname given")
                        .await
                }
                Some(nick) if valid_nickname(nick) => {
                    self.session.nickname = Some(nick.to_string());
                }
                Some(nick) => {
                    let line = self.state.replies.with_param(
                        ERR_ERRONEUSNICKNAME,
                        self.nick(),
                        nick,
                        "Erroneous Nickname",
                    );
                    self.send(line).await;
                }
            },
            "PASS" => match message.arg(0) {
                None => self.need_more_params("PASS").await,
                Some(password) => self.session.password = password.to_string(),
            },
            // Only required for the flow, the content is of no use to the backend.
            "USER" => self.session.has_user = true,
            "QUIT" => return self.quit(),
            command => {
                let line = self.state.replies.with_param(
                    ERR_NOTREGISTERED,
                    self.nick(),
                    command,
                    "You have not registered",
                );
                self.send(line).await;
                return Flow::Continue;
            }
        }

        if self.session.nickname.is_some() && self.session.has_user {
            return self.try_register().await;
        }
        Flow::Continue
    }

    async fn try_register(&mut self) -> Flow {
        let nickname = self.nick().to_string();
        tracing::debug!(session = self.id, nickname = %nickname, "Attempting backend login.");
        let result = self
            .state
            .connector
            .connect(&nickname, &self.session.password)
            .await;
        match result {
            Err(error) => {
                tracing::error!(session = self.id, nickname = %nickname, ?error, "Backend login failed.");
                Flow::Disconnect(error.to_string())
            }
            Ok(BackendSession { backend, events }) => {
                self.session.registration = Registration::Registered(backend.clone());
                self.events = Some(events);
                self.state.set_nickname(self.id, &nickname).await;
                tracing::info!(session = self.id, nickname = %nickname, "Registered.");
                self.send_welcome(backend.as_ref()).await;
                Flow::Continue
            }
        }
    }

    async fn handle_registered(&mut self, backend: &dyn GameBackend, message: Message) -> Flow {
        match message.command.as_str() {
            "CAP" => self.handle_cap().await,
            "JOIN" => self.handle_join(backend, &message).await,
            "LIST" => self.handle_list(backend).await,
            "LUSERS" => self.send_lusers(backend).await,
            "MODE" => self.handle_mode(backend, &message).await,
            "MOTD" => self.send_motd().await,
            "NAMES" => match message.arg(0) {
                Some(channel) => self.send_names(backend, channel).await,
                None => self.need_more_params("NAMES").await,
            },
            "NICK" => {
                self.reply_simple(ERR_NONICKCHANGE, "Nickname change not supported.")
                    .await
            }
            "PART" => self.handle_part(backend, &message).await,
            "PASS" | "USER" => {
                self.reply_simple(ERR_ALREADYREGISTERED, "Already registered")
                    .await
            }
            "PING" => {
                let server = self.state.replies.server_name();
                let line = format!(
                    ":{} {} {} :{}",
                    server,
                    PONG,
                    server,
                    message.arg(0).unwrap_or_default()
                );
                self.send(line).await;
            }
            "PONG" => {}
            "PRIVMSG" => self.handle_privmsg(backend, &message).await,
            "QUIT" => return self.quit(),
            "TOPIC" => self.handle_topic(backend, &message).await,
            "WHO" => self.handle_who(backend, &message).await,
            "WHOIS" => self.handle_whois(backend, &message).await,
            "WHOWAS" => self.handle_whowas(&message).await,
            command => {
                let line = self.state.replies.with_param(
                    ERR_UNKNOWNCOMMAND,
                    self.nick(),
                    command,
                    "Unknown command",
                );
                self.send(line).await;
            }
        }
        Flow::Continue
    }

    /// Capability negotiation is not supported in any state.
    async fn handle_cap(&self) {
        let line =
            self.state
                .replies
                .with_param(ERR_UNKNOWNCOMMAND, self.nick(), "CAP", "Unsupported command");
        self.send(line).await;
    }

    fn quit(&self) -> Flow {
        Flow::Disconnect(format!("Quit: {}", self.nick()))
    }

    async fn need_more_params(&self, command: &str) {
        self.reply(
            ERR_NEEDMOREPARAMS,
            format!("{} :Not enough parameters", command),
        )
        .await;
    }

    async fn send_welcome(&mut self, backend: &dyn GameBackend) {
        let state = self.state.clone();
        let config = &state.config;
        let nick = self.nick().to_string();
        let server = state.replies.server_name();

        self.reply(
            RPL_WELCOME,
            format!(
                ":Welcome to the {} IRC network {}!{}@{}",
                config.network_name,
                nick,
                nick,
                self.session.address.ip()
            ),
        )
        .await;
        self.reply(
            RPL_YOURHOST,
            format!(":Your host is {}, running version {}", server, VERSION),
        )
        .await;
        // User modes, then channel modes.
        self.reply(RPL_MYINFO, format!("{} {} Bor alvontk", server, VERSION))
            .await;
        self.reply(
            RPL_ISUPPORT,
            format!(
                "MAXCHANNELS=2 CHANLIMIT=#:2 NICKLEN=30 CHANNELLEN=32 TOPICLEN=307 AWAYLEN=0 \
                 MAXTARGETS=1 MODES=1 CHANTYPES=# PREFIX=(aov)&@+ CHANMODES=,k,lL,voantk \
                 NETWORK={} CASEMAPPING=ascii :are supported by this server",
                config.network_name
            ),
        )
        .await;

        self.send_lusers(backend).await;
        self.send_motd().await;

        let modes = user_modes(backend.user());
        if modes != "+" {
            self.send(format!(":{} {} {} :{}", nick, MODE, nick, modes))
                .await;
        }

        self.join_channel(backend, &config.global_channel).await;
    }

    async fn send_motd(&self) {
        self.reply_simple(ERR_NOMOTD, "No MOTD configured.").await;
    }

    async fn send_lusers(&self, backend: &dyn GameBackend) {
        let games = match backend.game_list().await {
            Ok(games) => games,
            Err(error) => {
                tracing::error!(session = self.id, ?error, "Unable to retrieve game list for LUSERS.");
                self.reply(
                    ERR_SERVICECONFUSED,
                    format!(":Error retrieving game list: {}", error),
                )
                .await;
                return;
            }
        };
        let names = match backend.names().await {
            Ok(names) => names,
            Err(error) => {
                tracing::error!(session = self.id, ?error, "Unable to retrieve user list for LUSERS.");
                self.reply(
                    ERR_SERVICECONFUSED,
                    format!(":Error retrieving user list: {}", error),
                )
                .await;
                return;
            }
        };
        let users = names.len();
        let channels = list_channels(
            &self.state.config,
            backend.capabilities(),
            users,
            &games,
        )
        .len();

        self.reply(
            RPL_LUSERCLIENT,
            format!(":There are {} users on 1 server", users),
        )
        .await;
        self.reply(RPL_LUSEROP, "0 :operator(s) online").await;
        self.reply(RPL_LUSERCHANNELS, format!("{} :channels formed", channels))
            .await;
        self.reply(
            RPL_LUSERME,
            format!(":I have {} clients and 0 servers", users),
        )
        .await;
        self.reply(
            RPL_LOCALUSERS,
            format!(":Current Local Users: {}  Max: {}", users, users),
        )
        .await;
        self.reply(
            RPL_GLOBALUSERS,
            format!(":Current Global Users: {}  Max: {}", users, users),
        )
        .await;
    }

    /// The burst a client expects after joining: JOIN, topic, names and modes.
    /// Assumes the channel may be joined.
    async fn join_channel(&mut self, backend: &dyn GameBackend, channel: &str) {
        let line = format!(":{} {} :{}", self.user_mask(self.nick()), JOIN, channel);
        self.send(line).await;
        self.send_topic(backend, channel).await;
        self.send_names(backend, channel).await;
        self.send_modes(backend, channel).await;
    }

    /// Fetches the game behind a channel the session is in. Anything else is answered
    /// with "not on channel" and gives `None`.
    async fn joined_game_info(
        &mut self,
        backend: &dyn GameBackend,
        channel: &str,
    ) -> Option<GameDetails> {
        let Some(joined) = self.current_game_id() else {
            self.reply(ERR_NOTONCHANNEL, format!("{} :Not in channel.", channel))
                .await;
            return None;
        };
        let Some(requested) = ChannelTarget::classify(&self.state.config, channel).game_id() else {
            self.reply(
                ERR_NOTONCHANNEL,
                format!(
                    "{} :Channel name does not match game channel name format.",
                    channel
                ),
            )
            .await;
            return None;
        };
        if requested != joined {
            self.reply(ERR_NOTONCHANNEL, format!("{} :Not in channel.", channel))
                .await;
            return None;
        }
        match backend.game_info(requested).await {
            Ok(details) => {
                if let Some(membership) = self.session.membership.as_mut() {
                    membership.host = details.game.host.clone();
                }
                Some(details)
            }
            Err(error) => {
                tracing::error!(session = self.id, game_id = requested, ?error, "Unable to retrieve game info.");
                self.reply(ERR_NOTONCHANNEL, format!("{} :{}", channel, error))
                    .await;
                None
            }
        }
    }

    async fn handle_topic(&mut self, backend: &dyn GameBackend, message: &Message) {
        match message.args.as_slice() {
            [] => self.need_more_params("TOPIC").await,
            [channel] => self.send_topic(backend, channel).await,
            // The backend owns all game metadata.
            _ => {
                self.reply(ERR_CHANOPRIVSNEEDED, "TOPIC :You can't do that.")
                    .await
            }
        }
    }

    async fn send_topic(&mut self, backend: &dyn GameBackend, channel: &str) {
        let (topic, set_by, set_at) = if channel == self.state.config.global_channel {
            let capabilities = backend.capabilities();
            (
                global_topic(capabilities).to_string(),
                self.bot_mask(),
                capabilities.server_started,
            )
        } else {
            let Some(details) = self.joined_game_info(backend, channel).await else {
                return;
            };
            (
                game_topic(&details.game),
                self.user_mask(&details.game.host),
                details.game.created,
            )
        };
        self.reply(RPL_TOPIC, format!("{} :{}", channel, topic))
            .await;
        self.reply(
            RPL_TOPICWHOTIME,
            format!("{} {} {}", channel, set_by, set_at / 1000),
        )
        .await;
    }

    async fn send_names(&mut self, backend: &dyn GameBackend, channel: &str) {
        let mut names = if channel == self.state.config.global_channel {
            backend.names().await.unwrap_or_else(|error| {
                tracing::error!(session = self.id, ?error, "Unable to retrieve names.");
                Vec::new()
            })
        } else {
            let Some(details) = self.joined_game_info(backend, channel).await else {
                return;
            };
            let game = details.game;
            let mut names: Vec<String> = game
                .players
                .iter()
                .map(|player| {
                    if *player == game.host {
                        format!("@{}", player)
                    } else {
                        format!("+{}", player)
                    }
                })
                .collect();
            names.extend(game.spectators);
            names
        };
        names.push(format!("&{}", self.state.config.bot_nick));

        match join_into_lines(NAMES_LINE_BUDGET, names.as_slice(), " ") {
            Ok(lines) => {
                for line in lines {
                    self.reply(RPL_NAMREPLY, format!("= {} :{}", channel, line))
                        .await;
                }
            }
            Err(error) => {
                tracing::error!(session = self.id, ?error, "Names do not fit into a line.");
            }
        }
        self.reply(
            RPL_ENDOFNAMES,
            format!("{} :End of /NAMES list", channel),
        )
        .await;
    }

    async fn handle_mode(&mut self, backend: &dyn GameBackend, message: &Message) {
        let Some(target) = message.arg(0) else {
            self.need_more_params("MODE").await;
            return;
        };
        if target.starts_with('#') {
            match message.arg(1) {
                None => self.send_modes(backend, target).await,
                // Some clients ask for the ban list right after joining.
                Some("b") => {
                    self.reply(
                        RPL_ENDOFBANLIST,
                        format!("{} :End of Channel Ban List", target),
                    )
                    .await
                }
                Some(_) => {
                    self.reply(ERR_CHANOPRIVSNEEDED, "MODE :You can't do that.")
                        .await
                }
            }
        } else if target == self.nick() && message.args.len() == 1 {
            self.reply(RPL_UMODEIS, user_modes(backend.user())).await;
        }
        // Mode changes and other users' modes get no answer at all.
    }

    async fn send_modes(&mut self, backend: &dyn GameBackend, channel: &str) {
        let (modes, created) = if channel == self.state.config.global_channel {
            let capabilities = backend.capabilities();
            (global_modes(capabilities), capabilities.server_started)
        } else {
            let Some(details) = self.joined_game_info(backend, channel).await else {
                return;
            };
            (game_modes(&details.game), details.game.created)
        };
        self.reply(RPL_CHANNELMODEIS, format!("{} {}", channel, modes))
            .await;
        self.reply(RPL_CREATIONTIME, format!("{} {}", channel, created / 1000))
            .await;
    }

    async fn handle_who(&mut self, backend: &dyn GameBackend, message: &Message) {
        let state = self.state.clone();
        let config = &state.config;
        let server = state.replies.server_name();
        let target = message.arg(0);
        let classified = target.map(|target| ChannelTarget::classify(config, target));

        match classified {
            None | Some(ChannelTarget::Global) => {
                let names = backend.names().await.unwrap_or_else(|error| {
                    tracing::error!(session = self.id, ?error, "Unable to retrieve names.");
                    Vec::new()
                });
                self.send_bot_who(&config.global_channel).await;
                for name in names {
                    let (sigil, bare) = Sigil::split_name(&name);
                    let mut flags = String::from("H");
                    if sigil != Sigil::NormalUser {
                        // Administrators might not have an identification code, there is no telling.
                        flags.push('r');
                        if target.is_some() {
                            flags.push_str(sigil.symbol());
                        }
                    }
                    self.reply(
                        RPL_WHOREPLY,
                        format!(
                            "{} {} {} {} {} {} :0 {}",
                            config.global_channel,
                            user_name(bare),
                            config.user_hostname,
                            server,
                            bare,
                            flags,
                            bare
                        ),
                    )
                    .await;
                }
                let end = if target.is_some() {
                    config.global_channel.as_str()
                } else {
                    "*"
                };
                self.reply(RPL_ENDOFWHO, format!("{} :End of /WHO list", end))
                    .await;
            }
            Some(ChannelTarget::Game { .. }) => {
                let Some(channel) = target else {
                    return;
                };
                let Some(details) = self.joined_game_info(backend, channel).await else {
                    return;
                };
                self.send_bot_who(channel).await;
                let game = details.game;
                let members = game
                    .players
                    .iter()
                    .map(|player| (player, if *player == game.host { "H@" } else { "H+" }))
                    .chain(game.spectators.iter().map(|spectator| (spectator, "H")));
                for (name, flags) in members {
                    self.reply(
                        RPL_WHOREPLY,
                        format!(
                            "{} {} {} {} {} {} :0 {}",
                            channel,
                            user_name(name),
                            config.user_hostname,
                            server,
                            name,
                            flags,
                            name
                        ),
                    )
                    .await;
                }
                self.reply(RPL_ENDOFWHO, format!("{} :End of /WHO list", channel))
                    .await;
            }
            Some(ChannelTarget::Unknown) => {
                self.reply(
                    ERR_NOTONCHANNEL,
                    format!("{} :Not in channel", target.unwrap_or_default()),
                )
                .await;
            }
        }
    }

    async fn send_bot_who(&self, channel: &str) {
        let config = &self.state.config;
        self.reply(
            RPL_WHOREPLY,
            format!(
                "{} {} {} {} {} HrB& :0 {}",
                channel,
                config.bot_username,
                config.bot_hostname,
                self.state.replies.server_name(),
                config.bot_nick,
                config.bot_nick
            ),
        )
        .await;
    }

    async fn handle_privmsg(&mut self, backend: &dyn GameBackend, message: &Message) {
        let (channel, text) = match message.args.as_slice() {
            [] => {
                self.need_more_params("PRIVMSG").await;
                return;
            }
            [_] => {
                self.reply(ERR_NOTEXTTOSEND, ":No text to send").await;
                return;
            }
            [channel, text, ..] => (channel.as_str(), text.as_str()),
        };
        if text.is_empty() {
            self.reply(ERR_NOTEXTTOSEND, ":No text to send").await;
            return;
        }

        let (emote, text) = parse_emote(text);
        let result = match ChannelTarget::classify(&self.state.config, channel) {
            ChannelTarget::Global => backend.send_global_chat(text, emote, false).await,
            ChannelTarget::Game { game_id, .. } if self.current_game_id() == Some(game_id) => {
                backend.send_game_chat(game_id, text, emote).await
            }
            // Private messages are not supported, neither are channels we are not in.
            _ => {
                self.reply(
                    ERR_NOSUCHNICK,
                    format!("{} :No such nick/channel", channel),
                )
                .await;
                return;
            }
        };
        if let Err(error) = result {
            self.reply(
                ERR_CANNOTSENDTOCHAN,
                format!("{} :Cannot send to channel: {}", channel, error),
            )
            .await;
        }
    }

    async fn handle_whois(&mut self, backend: &dyn GameBackend, message: &Message) {
        let Some(requested) = message.arg(0) else {
            self.need_more_params("WHOIS").await;
            return;
        };
        let state = self.state.clone();
        let config = &state.config;
        let server = state.replies.server_name();

        if requested.eq_ignore_ascii_case(&config.bot_nick) {
            let bot = &config.bot_nick;
            self.reply(
                RPL_WHOISUSER,
                format!(
                    "{} {} {} * :{}",
                    bot, config.bot_username, config.bot_hostname, bot
                ),
            )
            .await;
            let mut channels = format!("&{}", config.global_channel);
            if let Some(channel) = self.current_game_channel() {
                channels.push_str(&format!(" &{}", channel));
            }
            self.reply(RPL_WHOISCHANNELS, format!("{} :{}", bot, channels))
                .await;
            self.reply(
                RPL_WHOISSERVER,
                format!("{} {} :{}", bot, server, config.backend.base_address),
            )
            .await;
            self.reply(RPL_WHOISOPERATOR, format!("{} :is an Administrator", bot))
                .await;
            self.reply(RPL_WHOISBOT, format!("{} :is a Bot", bot)).await;
            self.reply(RPL_ENDOFWHOIS, format!("{} :End of /WHOIS list.", bot))
                .await;
            return;
        }

        let info = match backend.whois(requested).await {
            Ok(info) => info,
            Err(error) => {
                if error.code() == Some(&ErrorCode::NoSuchUser) {
                    self.reply(
                        ERR_NOSUCHNICK,
                        format!("{} :No such nick/channel", requested),
                    )
                    .await;
                } else {
                    self.reply(ERR_NOSUCHNICK, format!("{} :{}", requested, error))
                        .await;
                }
                self.reply(
                    RPL_ENDOFWHOIS,
                    format!("{} :End of /WHOIS list.", requested),
                )
                .await;
                return;
            }
        };

        let nick = &info.nickname;
        self.reply(
            RPL_WHOISUSER,
            format!(
                "{} {} {} * :{}",
                nick,
                user_name(nick),
                config.user_hostname,
                nick
            ),
        )
        .await;
        if let Some(address) = info.ip_address.as_deref().filter(|address| !address.is_empty()) {
            self.reply(
                RPL_WHOISHOST,
                format!("{} :is connecting from {}", nick, address),
            )
            .await;
        }

        let mut channels = format!("{}{}", info.sigil.symbol(), config.global_channel);
        if let (Some(game_id), Some(game)) = (info.game_id, info.game_info.as_ref()) {
            let operator = if game.host == *nick { "@" } else { "" };
            let spectating = game.spectators.iter().any(|spectator| spectator == nick);
            channels.push_str(&format!(
                " {}{}",
                operator,
                game_channel(config, game_id, spectating)
            ));
        }
        self.reply(RPL_WHOISCHANNELS, format!("{} :{}", nick, channels))
            .await;
        self.reply(
            RPL_WHOISSERVER,
            format!("{} {} :{}", nick, server, config.backend.base_address),
        )
        .await;
        if info.sigil == Sigil::Admin {
            self.reply(RPL_WHOISOPERATOR, format!("{} :is an Administrator", nick))
                .await;
        }
        if !info.id_code.is_empty() {
            self.reply(
                RPL_WHOISSPECIAL,
                format!("{} :Verification code: {}", nick, info.id_code),
            )
            .await;
        }
        if let Some(client_name) = info.client_name.as_deref().filter(|name| !name.is_empty()) {
            self.reply(
                RPL_WHOISSPECIAL,
                format!("{} :Client: {}", nick, client_name),
            )
            .await;
        }
        self.reply(
            RPL_WHOISIDLE,
            format!(
                "{} {} {} :seconds idle, signon time",
                nick,
                info.idle / 1000,
                info.connected_at / 1000
            ),
        )
        .await;
        self.reply(RPL_ENDOFWHOIS, format!("{} :End of /WHOIS list.", nick))
            .await;
    }

    async fn handle_whowas(&self, message: &Message) {
        let Some(nick) = message.arg(0) else {
            self.need_more_params("WHOWAS").await;
            return;
        };
        self.reply(
            ERR_WASNOSUCHNICK,
            format!("{} :WHOWAS is not supported.", nick),
        )
        .await;
        self.reply(RPL_ENDOFWHOWAS, format!("{} :End of WHOWAS", nick))
            .await;
    }

    async fn handle_list(&self, backend: &dyn GameBackend) {
        let listing = match backend.game_list().await {
            Ok(games) => backend.names().await.map(|names| (games, names.len())),
            Err(error) => Err(error),
        };
        let (games, users) = match listing {
            Ok(listing) => listing,
            Err(error) => {
                tracing::error!(session = self.id, ?error, "Unable to retrieve game list for LIST.");
                self.reply(
                    ERR_SERVICECONFUSED,
                    format!(":Error retrieving game list: {}", error),
                )
                .await;
                return;
            }
        };

        self.reply(RPL_LISTSTART, "Channel :Users  Name").await;
        for channel in list_channels(&self.state.config, backend.capabilities(), users, &games) {
            self.reply(
                RPL_LIST,
                format!(
                    "{} {} :{}",
                    channel.name, channel.total_users, channel.topic
                ),
            )
            .await;
        }
        self.reply(RPL_LISTEND, ":End of /LIST").await;
    }

    async fn handle_part(&mut self, backend: &dyn GameBackend, message: &Message) {
        let Some(channel) = message.arg(0) else {
            self.need_more_params("PART").await;
            return;
        };
        let target = ChannelTarget::classify(&self.state.config, channel);
        if target == ChannelTarget::Global {
            tracing::debug!(session = self.id, nickname = self.nick(), "Refusing to leave the global channel.");
            return;
        }
        let Some(game_id) = target
            .game_id()
            .filter(|game_id| self.current_game_id() == Some(*game_id))
        else {
            self.reply(ERR_NOSUCHCHANNEL, format!("{} :No such channel", channel))
                .await;
            return;
        };

        match backend.leave_game(game_id).await {
            Err(error) if !already_left(&error) => {
                self.reply(
                    ERR_SERVICECONFUSED,
                    format!("{} :Unable to leave channel: {}", channel, error),
                )
                .await;
            }
            result => {
                if let Err(error) = result {
                    // The backend already has us outside the game, follow it.
                    tracing::warn!(session = self.id, game_id, ?error, "Leave desync healed.");
                }
                self.session.membership = None;
                let line = format!(":{} {} {}", self.user_mask(self.nick()), PART, channel);
                self.send(line).await;
            }
        }
    }

    async fn handle_join(&mut self, backend: &dyn GameBackend, message: &Message) {
        let Some(channel) = message.arg(0) else {
            self.need_more_params("JOIN").await;
            return;
        };
        // Only one game at a time.
        if self.session.membership.is_some() {
            self.reply(
                ERR_TOOMANYCHANNELS,
                format!("{} :Too many joined channels.", channel),
            )
            .await;
            return;
        }

        let (game_id, spectate) = match ChannelTarget::classify(&self.state.config, channel) {
            ChannelTarget::Global => {
                tracing::debug!(session = self.id, "Already in the global channel.");
                return;
            }
            ChannelTarget::Unknown => {
                self.reply(
                    ERR_FORBIDDENCHANNEL,
                    format!(
                        "{} :Forbidden channel: Channel name does not match game channel name format.",
                        channel
                    ),
                )
                .await;
                return;
            }
            ChannelTarget::Game { game_id, spectate } => (game_id, spectate),
        };
        if !spectate {
            self.reply(
                ERR_FORBIDDENCHANNEL,
                format!("{} :Cannot join game playing channels", channel),
            )
            .await;
            return;
        }

        let password = message.arg(1).unwrap_or_default();
        if let Err(error) = backend.spectate_game(game_id, password).await {
            if error.code() == Some(&ErrorCode::CannotJoinAnotherGame) {
                tracing::error!(session = self.id, nickname = self.nick(), "Desync detected: backend reports another game.");
            }
            let (numeric, text) = join_failure(&error);
            self.reply(numeric, format!("{} :{}", channel, text)).await;
            return;
        }

        let mut membership = Membership::new(game_id, true);
        match backend.game_info(game_id).await {
            Ok(details) => {
                membership.host = details.game.host;
                membership.round_in_progress = details.game.state != GameState::Lobby;
            }
            Err(error) => {
                tracing::error!(session = self.id, game_id, ?error, "Unable to retrieve game info after join.");
            }
        }
        self.session.membership = Some(membership);
        tracing::info!(session = self.id, game_id, "Spectating game.");
        self.join_channel(backend, channel).await;
    }
}
