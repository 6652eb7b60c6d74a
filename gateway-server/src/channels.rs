//! Mapping between channel names and backend concepts.
//!
//! The global channel is the backend's lobby chat. Every game shows up twice: once with
//! the game prefix for playing and once with the spectate prefix for watching.

use crate::config::GatewayConfig;
use pyx_client::{GameId, GameInfo, ServerCapabilities};

/// What a channel name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    Global,
    Game { game_id: GameId, spectate: bool },
    Unknown,
}

impl ChannelTarget {
    pub fn classify(config: &GatewayConfig, name: &str) -> Self {
        if name == config.global_channel {
            return ChannelTarget::Global;
        }
        let parsed = if let Some(id) = name.strip_prefix(config.game_channel_prefix.as_str()) {
            id.parse().ok().map(|game_id| (game_id, false))
        } else if let Some(id) = name.strip_prefix(config.spectate_game_channel_prefix.as_str()) {
            id.parse().ok().map(|game_id| (game_id, true))
        } else {
            None
        };
        match parsed {
            Some((game_id, spectate)) => ChannelTarget::Game { game_id, spectate },
            None => ChannelTarget::Unknown,
        }
    }

    /// The game id, if this is a game channel of any flavour.
    pub fn game_id(self) -> Option<GameId> {
        match self {
            ChannelTarget::Game { game_id, .. } => Some(game_id),
            _ => None,
        }
    }
}

pub fn game_channel(config: &GatewayConfig, game_id: GameId, spectate: bool) -> String {
    let prefix = if spectate {
        &config.spectate_game_channel_prefix
    } else {
        &config.game_channel_prefix
    };
    format!("{}{}", prefix, game_id)
}

pub fn global_topic(capabilities: &ServerCapabilities) -> &'static str {
    if capabilities.global_chat_enabled {
        "Global chat"
    } else {
        "Global chat (disabled)"
    }
}

pub fn game_topic(game: &GameInfo) -> String {
    let password_label = if game.has_password {
        "(Has password.) "
    } else {
        ""
    };
    format!(
        "{}'s game ({}). {}{} score goal. {}/{} players, {}/{} spectators.",
        game.host,
        game.state.describe(),
        password_label,
        game.options.score_limit,
        game.players.len(),
        game.options.player_limit,
        game.spectators.len(),
        game.options.spectator_limit
    )
}

/// Channel modes of the global channel: topic locked, moderated without global chat,
/// `n` while the backend announces arrivals.
pub fn global_modes(capabilities: &ServerCapabilities) -> String {
    let mut modes = String::from("+t");
    if !capabilities.global_chat_enabled {
        modes.push('m');
    }
    if capabilities.broadcasting_users {
        modes.push('n');
    }
    modes
}

/// Channel modes of a game channel. The limits are one higher than the backend's, the
/// bridge's own identity is in every channel.
pub fn game_modes(game: &GameInfo) -> String {
    let key = if game.has_password { "k" } else { "" };
    format!(
        "+nt{}lL {} {}",
        key,
        game.options.player_limit + 1,
        game.options.spectator_limit + 1
    )
}

/// One line of a channel listing, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub name: String,
    pub total_users: usize,
    pub topic: String,
}

/// The global channel followed by the play and spectate channels of every game.
/// The spectate channel is left out for games that do not allow spectators.
pub fn list_channels(
    config: &GatewayConfig,
    capabilities: &ServerCapabilities,
    user_count: usize,
    games: &[GameInfo],
) -> Vec<ChannelDescriptor> {
    let mut channels = vec![ChannelDescriptor {
        name: config.global_channel.clone(),
        total_users: user_count + 1,
        topic: global_topic(capabilities).to_string(),
    }];
    for game in games {
        let topic = game_topic(game);
        channels.push(ChannelDescriptor {
            name: game_channel(config, game.id, false),
            total_users: game.total_users(),
            topic: topic.clone(),
        });
        if game.options.spectator_limit > 0 {
            channels.push(ChannelDescriptor {
                name: game_channel(config, game.id, true),
                total_users: game.total_users(),
                topic: format!("SPECTATE: {}", topic),
            });
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyx_client::{GameOptions, GameState};

    fn game(id: GameId, spectator_limit: u32, has_password: bool) -> GameInfo {
        GameInfo {
            id,
            host: "carol".into(),
            players: vec!["carol".into(), "dave".into()],
            spectators: vec!["erin".into()],
            state: GameState::Playing,
            options: GameOptions {
                player_limit: 6,
                spectator_limit,
                score_limit: 8,
            },
            has_password,
            created: 1_500_000,
        }
    }

    #[test]
    fn classify_channels() {
        let config = GatewayConfig::default();
        assert_eq!(
            ChannelTarget::classify(&config, "#global"),
            ChannelTarget::Global
        );
        assert_eq!(
            ChannelTarget::classify(&config, "#watch-42"),
            ChannelTarget::Game {
                game_id: 42,
                spectate: true
            }
        );
        assert_eq!(
            ChannelTarget::classify(&config, "#game-7"),
            ChannelTarget::Game {
                game_id: 7,
                spectate: false
            }
        );
        assert_eq!(
            ChannelTarget::classify(&config, "#game-x"),
            ChannelTarget::Unknown
        );
        assert_eq!(
            ChannelTarget::classify(&config, "#random"),
            ChannelTarget::Unknown
        );
        assert_eq!(ChannelTarget::classify(&config, "#watch-3").game_id(), Some(3));
    }

    #[test]
    fn topics_and_modes() {
        assert_eq!(
            game_topic(&game(1, 10, true)),
            "carol's game (In progress). (Has password.) 8 score goal. 2/6 players, 1/10 spectators."
        );
        assert_eq!(game_modes(&game(1, 10, true)), "+ntklL 7 11");
        assert_eq!(game_modes(&game(1, 0, false)), "+ntlL 7 1");

        let mut capabilities = ServerCapabilities::default();
        assert_eq!(global_modes(&capabilities), "+tm");
        assert_eq!(global_topic(&capabilities), "Global chat (disabled)");
        capabilities.global_chat_enabled = true;
        capabilities.broadcasting_users = true;
        assert_eq!(global_modes(&capabilities), "+tn");
        assert_eq!(global_topic(&capabilities), "Global chat");
    }

    #[test]
    fn listing_skips_spectate_channel_without_spectators() {
        let config = GatewayConfig::default();
        let capabilities = ServerCapabilities::default();
        let channels = list_channels(
            &config,
            &capabilities,
            5,
            &[game(1, 10, false), game(2, 0, false)],
        );
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["#global", "#game-1", "#watch-1", "#game-2"]);
        assert_eq!(channels[0].total_users, 6);
        assert_eq!(channels[1].total_users, 3);
        assert!(channels[2].topic.starts_with("SPECTATE: carol's game"));
    }
}
