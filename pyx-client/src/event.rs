//! The events delivered by the long poll.
//!
//! The backend sends loosely typed objects keyed by the event kind. They are turned into
//! [`BackendEvent`] here, so the consumer can match exhaustively. Anything we do not know,
//! or a known kind missing mandatory fields, ends up in [`BackendEvent::Unrecognized`]
//! together with the raw object.

use crate::error::BackendError;
use crate::types::{BlackCard, DisconnectReason, ErrorCode, GameId, GameState, Sigil, WhiteCard};
use crate::wire::{event, response};
use serde::Deserialize;
use serde_json::Value;

/// A chat line, either global or for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: String,
    pub message: String,
    /// Present for game chat.
    pub game_id: Option<GameId>,
    pub emote: bool,
    /// Broadcast by an administrator to everybody.
    pub wall: bool,
}

/// The new state of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Lobby,
    Playing {
        black_card: BlackCard,
    },
    /// The submitted card groupings, one per player, in display order.
    Judging {
        white_cards: Vec<Vec<WhiteCard>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Chat(ChatMessage),
    /// Chat that tripped the profanity filter, delivered to administrators.
    FilteredChat(ChatMessage),
    NewPlayer {
        nickname: String,
        sigil: Sigil,
        id_code: String,
    },
    PlayerLeave {
        nickname: String,
        reason: DisconnectReason,
    },
    GamePlayerJoin {
        game_id: GameId,
        nickname: String,
    },
    GamePlayerLeave {
        game_id: GameId,
        nickname: String,
    },
    GameSpectatorJoin {
        game_id: GameId,
        nickname: String,
    },
    GameSpectatorLeave {
        game_id: GameId,
        nickname: String,
    },
    /// Another player was removed from the game for idling.
    GamePlayerKickedIdle {
        game_id: GameId,
        nickname: String,
    },
    /// We ourselves were removed from our game for idling.
    KickedFromGameIdle {
        game_id: GameId,
    },
    GamePlayerSkipped {
        game_id: GameId,
        nickname: String,
    },
    GameJudgeSkipped {
        game_id: GameId,
        nickname: String,
    },
    GameJudgeLeft {
        game_id: GameId,
    },
    GameStateChange {
        game_id: GameId,
        change: StateChange,
    },
    GameRoundComplete {
        game_id: GameId,
        round_winner: String,
        /// Always the first card of the winning grouping.
        winning_card: i64,
    },
    GameBlackReshuffle {
        game_id: GameId,
    },
    GameWhiteReshuffle {
        game_id: GameId,
    },
    GameOptionsChanged {
        game_id: GameId,
    },
    GameListRefresh,
    GamePlayerInfoChange,
    HandDeal,
    Kicked,
    Banned,
    Noop,
    Unrecognized {
        kind: String,
        raw: Value,
    },
}

/// Every field any event may carry.
#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(rename = "E", default)]
    kind: String,
    #[serde(rename = "f")]
    from: Option<String>,
    #[serde(rename = "m")]
    message: Option<String>,
    #[serde(rename = "gid")]
    game_id: Option<GameId>,
    #[serde(rename = "me", default)]
    emote: bool,
    #[serde(rename = "wall", default)]
    wall: bool,
    #[serde(rename = "n")]
    nickname: Option<String>,
    #[serde(rename = "?", default)]
    sigil: Sigil,
    #[serde(rename = "idc", default)]
    id_code: String,
    #[serde(rename = "qr")]
    reason: Option<DisconnectReason>,
    #[serde(rename = "gs")]
    game_state: Option<GameState>,
    #[serde(rename = "bc")]
    black_card: Option<BlackCard>,
    #[serde(rename = "wc")]
    white_cards: Option<Vec<Vec<WhiteCard>>>,
    #[serde(rename = "rw")]
    round_winner: Option<String>,
    #[serde(rename = "WC")]
    winning_card: Option<i64>,
}

impl RawEvent {
    fn chat(self) -> Option<ChatMessage> {
        Some(ChatMessage {
            from: self.from?,
            message: self.message?,
            game_id: self.game_id,
            emote: self.emote,
            wall: self.wall,
        })
    }

    fn into_event(self) -> Option<BackendEvent> {
        let event = match self.kind.as_str() {
            event::CHAT => BackendEvent::Chat(self.chat()?),
            event::FILTERED_CHAT => BackendEvent::FilteredChat(self.chat()?),
            event::NEW_PLAYER => BackendEvent::NewPlayer {
                nickname: self.nickname?,
                sigil: self.sigil,
                id_code: self.id_code,
            },
            event::PLAYER_LEAVE => BackendEvent::PlayerLeave {
                nickname: self.nickname?,
                reason: self.reason.unwrap_or(DisconnectReason::Manual),
            },
            event::GAME_PLAYER_JOIN => BackendEvent::GamePlayerJoin {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_PLAYER_LEAVE => BackendEvent::GamePlayerLeave {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_SPECTATOR_JOIN => BackendEvent::GameSpectatorJoin {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_SPECTATOR_LEAVE => BackendEvent::GameSpectatorLeave {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_PLAYER_KICKED_IDLE => BackendEvent::GamePlayerKickedIdle {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::KICKED_FROM_GAME_IDLE => BackendEvent::KickedFromGameIdle {
                game_id: self.game_id?,
            },
            event::GAME_PLAYER_SKIPPED => BackendEvent::GamePlayerSkipped {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_JUDGE_SKIPPED => BackendEvent::GameJudgeSkipped {
                game_id: self.game_id?,
                nickname: self.nickname?,
            },
            event::GAME_JUDGE_LEFT => BackendEvent::GameJudgeLeft {
                game_id: self.game_id?,
            },
            event::GAME_STATE_CHANGE => {
                let change = match self.game_state? {
                    GameState::Lobby => StateChange::Lobby,
                    GameState::Playing => StateChange::Playing {
                        black_card: self.black_card?,
                    },
                    GameState::Judging => StateChange::Judging {
                        white_cards: self.white_cards?,
                    },
                };
                BackendEvent::GameStateChange {
                    game_id: self.game_id?,
                    change,
                }
            }
            event::GAME_ROUND_COMPLETE => BackendEvent::GameRoundComplete {
                game_id: self.game_id?,
                round_winner: self.round_winner?,
                winning_card: self.winning_card?,
            },
            event::GAME_BLACK_RESHUFFLE => BackendEvent::GameBlackReshuffle {
                game_id: self.game_id?,
            },
            event::GAME_WHITE_RESHUFFLE => BackendEvent::GameWhiteReshuffle {
                game_id: self.game_id?,
            },
            event::GAME_OPTIONS_CHANGED => BackendEvent::GameOptionsChanged {
                game_id: self.game_id?,
            },
            event::GAME_LIST_REFRESH => BackendEvent::GameListRefresh,
            event::GAME_PLAYER_INFO_CHANGE => BackendEvent::GamePlayerInfoChange,
            event::HAND_DEAL => BackendEvent::HandDeal,
            event::KICKED => BackendEvent::Kicked,
            event::BANNED => BackendEvent::Banned,
            event::NOOP => BackendEvent::Noop,
            _ => return None,
        };
        Some(event)
    }
}

impl BackendEvent {
    /// Converts one event object. Never fails, see [`BackendEvent::Unrecognized`].
    pub fn from_value(raw: Value) -> BackendEvent {
        let kind = raw
            .get("E")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match RawEvent::deserialize(&raw) {
            Ok(parsed) => match parsed.into_event() {
                Some(event) => event,
                None => BackendEvent::Unrecognized { kind, raw },
            },
            Err(error) => {
                tracing::warn!(?error, %kind, "Malformed long poll event");
                BackendEvent::Unrecognized { kind, raw }
            }
        }
    }
}

/// Decodes a long poll body: either a single object or an array of them.
/// A single object flagged as error, or anything that is not JSON, is an error.
pub(crate) fn decode_poll_body(body: &str) -> Result<Vec<BackendEvent>, BackendError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(items.into_iter().map(BackendEvent::from_value).collect()),
        Value::Object(object) => {
            if object
                .get(response::ERROR)
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                let code = object
                    .get(response::ERROR_CODE)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return Err(BackendError::Application(ErrorCode::from(code.to_owned())));
            }
            Ok(vec![BackendEvent::from_value(Value::Object(object))])
        }
        other => Err(BackendError::NonConforming(format!(
            "unexpected long poll body {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_events() {
        let event = BackendEvent::from_value(json!({"E": "c", "f": "bob", "m": "hi", "me": true}));
        assert_eq!(
            event,
            BackendEvent::Chat(ChatMessage {
                from: "bob".into(),
                message: "hi".into(),
                game_id: None,
                emote: true,
                wall: false,
            })
        );

        let event = BackendEvent::from_value(json!({"E": "c", "f": "bob", "m": "gg", "gid": 4}));
        let BackendEvent::Chat(chat) = event else {
            panic!("expected chat");
        };
        assert_eq!(chat.game_id, Some(4));
    }

    #[test]
    fn judging_state_change_carries_groupings() {
        let event = BackendEvent::from_value(json!({
            "E": "gsc", "gid": 3, "gs": "j",
            "wc": [[{"cid": 10, "T": "A", "W": "x"}], [{"cid": 11, "T": "B", "W": "y"}]]
        }));
        let BackendEvent::GameStateChange {
            game_id,
            change: StateChange::Judging { white_cards },
        } = event
        else {
            panic!("expected judging");
        };
        assert_eq!(game_id, 3);
        assert_eq!(white_cards.len(), 2);
        assert_eq!(white_cards[1][0].id, 11);
    }

    #[test]
    fn player_leave_reason() {
        let event = BackendEvent::from_value(json!({"E": "pl", "n": "bob", "qr": "pt"}));
        assert_eq!(
            event,
            BackendEvent::PlayerLeave {
                nickname: "bob".into(),
                reason: DisconnectReason::PingTimeout,
            }
        );
    }

    #[test]
    fn unknown_and_incomplete_events_are_kept_raw() {
        let raw = json!({"E": "zz", "x": 1});
        assert_eq!(
            BackendEvent::from_value(raw.clone()),
            BackendEvent::Unrecognized {
                kind: "zz".into(),
                raw
            }
        );

        // Playing without a black card can not be represented.
        let raw = json!({"E": "gsc", "gid": 3, "gs": "p"});
        assert!(matches!(
            BackendEvent::from_value(raw),
            BackendEvent::Unrecognized { kind, .. } if kind == "gsc"
        ));
    }

    #[test]
    fn poll_body_variants() {
        let events = decode_poll_body(r#"[{"E":"_"},{"E":"glr"}]"#).unwrap();
        assert_eq!(events, vec![BackendEvent::Noop, BackendEvent::GameListRefresh]);

        let events = decode_poll_body(r#"{"E":"kk"}"#).unwrap();
        assert_eq!(events, vec![BackendEvent::Kicked]);

        let error = decode_poll_body(r#"{"e":true,"ec":"se"}"#).unwrap_err();
        assert_eq!(error.code(), Some(&ErrorCode::SessionExpired));

        assert!(matches!(
            decode_poll_body("<html>"),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(
            decode_poll_body("42"),
            Err(BackendError::NonConforming(_))
        ));
    }
}
