//! The data the backend hands out: users, games, cards and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend assigns game ids, they are small positive numbers.
pub type GameId = u32;

/// Privilege marker in front of a user name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Sigil {
    /// Server administrator.
    Admin,
    /// User that supplied an identification code.
    IdCode,
    #[default]
    NormalUser,
}

impl Sigil {
    pub fn symbol(self) -> &'static str {
        match self {
            Sigil::Admin => "@",
            Sigil::IdCode => "+",
            Sigil::NormalUser => "",
        }
    }

    /// Splits a name as it appears in the names list into sigil and bare name.
    pub fn split_name(name: &str) -> (Sigil, &str) {
        if let Some(bare) = name.strip_prefix('@') {
            (Sigil::Admin, bare)
        } else if let Some(bare) = name.strip_prefix('+') {
            (Sigil::IdCode, bare)
        } else {
            (Sigil::NormalUser, name)
        }
    }
}

impl From<String> for Sigil {
    fn from(value: String) -> Self {
        match value.as_str() {
            "@" => Sigil::Admin,
            "+" => Sigil::IdCode,
            _ => Sigil::NormalUser,
        }
    }
}

impl From<Sigil> for String {
    fn from(value: Sigil) -> Self {
        value.symbol().to_owned()
    }
}

/// Our own identity as the backend registered it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "?", default)]
    pub sigil: Sigil,
    #[serde(rename = "idc", default)]
    pub id_code: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.sigil == Sigil::Admin
    }

    pub fn is_verified(&self) -> bool {
        !self.id_code.is_empty()
    }
}

/// Settings the backend advertises for the whole server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub global_chat_enabled: bool,
    /// Whether the backend announces users arriving and leaving.
    pub broadcasting_users: bool,
    /// Start of the backend in milliseconds since the epoch.
    pub server_started: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum GameState {
    #[serde(rename = "l")]
    Lobby,
    #[serde(rename = "p")]
    Playing,
    #[serde(rename = "j")]
    Judging,
}

impl GameState {
    pub fn describe(self) -> &'static str {
        match self {
            GameState::Lobby => "Not started",
            GameState::Playing | GameState::Judging => "In progress",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GameOptions {
    #[serde(rename = "pL", default)]
    pub player_limit: u32,
    #[serde(rename = "vL", default)]
    pub spectator_limit: u32,
    #[serde(rename = "sl", default)]
    pub score_limit: u32,
}

/// One game as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GameInfo {
    #[serde(rename = "gid")]
    pub id: GameId,
    #[serde(rename = "H")]
    pub host: String,
    #[serde(rename = "P", default)]
    pub players: Vec<String>,
    #[serde(rename = "V", default)]
    pub spectators: Vec<String>,
    #[serde(rename = "S")]
    pub state: GameState,
    #[serde(rename = "go", default)]
    pub options: GameOptions,
    #[serde(rename = "hp", default)]
    pub has_password: bool,
    /// Creation in milliseconds since the epoch.
    #[serde(rename = "gca", default)]
    pub created: i64,
}

impl GameInfo {
    pub fn total_users(&self) -> usize {
        self.players.len() + self.spectators.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PlayerStatus {
    #[serde(rename = "sh")]
    Host,
    #[serde(rename = "si")]
    Idle,
    #[serde(rename = "sj")]
    Judge,
    #[serde(rename = "sjj")]
    Judging,
    #[serde(rename = "sp")]
    Playing,
    #[serde(rename = "sw")]
    Winner,
    #[serde(rename = "sv")]
    Spectator,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayerInfo {
    #[serde(rename = "N")]
    pub name: String,
    #[serde(rename = "sc", default)]
    pub score: u32,
    #[serde(rename = "st")]
    pub status: PlayerStatus,
}

/// A game together with the per player state, as returned by the game info call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GameDetails {
    #[serde(rename = "gi")]
    pub game: GameInfo,
    #[serde(rename = "pi", default)]
    pub players: Vec<PlayerInfo>,
}

impl GameDetails {
    /// The player judging the current round.
    pub fn judge(&self) -> Option<&str> {
        self.players
            .iter()
            .find(|player| matches!(player.status, PlayerStatus::Judge | PlayerStatus::Judging))
            .map(|player| player.name.as_str())
    }

    /// The player that won the whole game, if any.
    pub fn winner(&self) -> Option<&str> {
        self.players
            .iter()
            .find(|player| player.status == PlayerStatus::Winner)
            .map(|player| player.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlackCard {
    #[serde(rename = "cid")]
    pub id: i64,
    #[serde(rename = "T")]
    pub text: String,
    #[serde(rename = "W", default)]
    pub watermark: String,
    #[serde(rename = "PK", default = "default_pick")]
    pub pick: u32,
}

fn default_pick() -> u32 {
    1
}

impl fmt::Display for BlackCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Pick {}, source {}) {}", self.pick, self.watermark, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WhiteCard {
    /// Blank cards get negative ids.
    #[serde(rename = "cid")]
    pub id: i64,
    #[serde(rename = "T")]
    pub text: String,
    #[serde(rename = "W", default)]
    pub watermark: String,
}

impl fmt::Display for WhiteCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (source {})", self.text, self.watermark)
    }
}

/// Everything the backend knows about another user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WhoisInfo {
    #[serde(rename = "n")]
    pub nickname: String,
    #[serde(rename = "?", default)]
    pub sigil: Sigil,
    #[serde(rename = "idc", default)]
    pub id_code: String,
    /// Only visible to administrators.
    #[serde(rename = "IP", default)]
    pub ip_address: Option<String>,
    #[serde(rename = "cn", default)]
    pub client_name: Option<String>,
    #[serde(rename = "gid", default)]
    pub game_id: Option<GameId>,
    #[serde(rename = "gi", default)]
    pub game_info: Option<GameInfo>,
    /// Milliseconds.
    #[serde(rename = "idl", default)]
    pub idle: i64,
    /// Milliseconds since the epoch.
    #[serde(rename = "ca", default)]
    pub connected_at: i64,
}

/// Why a user left the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum DisconnectReason {
    Banned,
    IdleTimeout,
    Kicked,
    Manual,
    PingTimeout,
    Other(String),
}

impl DisconnectReason {
    pub fn describe(&self) -> &str {
        match self {
            DisconnectReason::Banned => "Banned",
            DisconnectReason::IdleTimeout => "Kicked due to idle",
            DisconnectReason::Kicked => "Kicked by server administrator",
            DisconnectReason::Manual => "Leaving",
            DisconnectReason::PingTimeout => "Ping timeout",
            DisconnectReason::Other(code) => code.as_str(),
        }
    }
}

impl From<String> for DisconnectReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "B&" => DisconnectReason::Banned,
            "it" => DisconnectReason::IdleTimeout,
            "k" => DisconnectReason::Kicked,
            "man" => DisconnectReason::Manual,
            "pt" => DisconnectReason::PingTimeout,
            _ => DisconnectReason::Other(value),
        }
    }
}

impl From<DisconnectReason> for String {
    fn from(value: DisconnectReason) -> Self {
        match value {
            DisconnectReason::Banned => "B&".into(),
            DisconnectReason::IdleTimeout => "it".into(),
            DisconnectReason::Kicked => "k".into(),
            DisconnectReason::Manual => "man".into(),
            DisconnectReason::PingTimeout => "pt".into(),
            DisconnectReason::Other(code) => code,
        }
    }
}

/// Structured application errors. Codes we do not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    AlreadyStarted,
    BadOp,
    BadRequest,
    Banned,
    CannotJoinAnotherGame,
    GameFull,
    InvalidGame,
    InvalidNick,
    NickInUse,
    NoMessageSpecified,
    NoSuchUser,
    NotAdmin,
    NotInThatGame,
    NotRegistered,
    ReservedNick,
    ServerError,
    SessionExpired,
    TooFast,
    TooManyGames,
    TooManyUsers,
    WrongPassword,
    Other(String),
}

/// Wire code and human readable text for every known code.
const ERROR_CODES: &[(ErrorCode, &str, &str)] = &[
    (ErrorCode::AlreadyStarted, "as", "The game has already started."),
    (ErrorCode::BadOp, "bo", "Invalid operation."),
    (ErrorCode::BadRequest, "br", "Bad request."),
    (ErrorCode::Banned, "B&", "Banned."),
    (ErrorCode::CannotJoinAnotherGame, "cjag", "You cannot join another game."),
    (ErrorCode::GameFull, "gf", "That game is full."),
    (ErrorCode::InvalidGame, "ig", "Invalid game specified."),
    (ErrorCode::InvalidNick, "in", "Nickname must contain only upper and lower case letters, numbers, or underscores, must be 3 to 30 characters long, and must not start with a number."),
    (ErrorCode::NickInUse, "niu", "Nickname is already in use."),
    (ErrorCode::NoMessageSpecified, "nms", "No message specified."),
    (ErrorCode::NoSuchUser, "nsu", "No such user."),
    (ErrorCode::NotAdmin, "na", "You are not an administrator."),
    (ErrorCode::NotInThatGame, "nitg", "You are not in that game."),
    (ErrorCode::NotRegistered, "nr", "Not registered. Refresh the page."),
    (ErrorCode::ReservedNick, "rn", "That nick is reserved."),
    (ErrorCode::ServerError, "serr", "An error occurred on the server."),
    (ErrorCode::SessionExpired, "se", "Your session has expired. Refresh the page."),
    (ErrorCode::TooFast, "tf", "You are chatting too fast. Wait a few seconds and try again."),
    (ErrorCode::TooManyGames, "tmg", "There are too many games already in progress. Either join an existing game, or wait for one to become available."),
    (ErrorCode::TooManyUsers, "tmu", "There are too many users connected. Either join another server, or wait for a user to disconnect."),
    (ErrorCode::WrongPassword, "wp", "That password is incorrect."),
];

impl ErrorCode {
    fn entry(&self) -> Option<&'static (ErrorCode, &'static str, &'static str)> {
        ERROR_CODES.iter().find(|(code, _, _)| code == self)
    }

    /// The code as the backend sends it.
    pub fn wire_code(&self) -> &str {
        match self {
            ErrorCode::Other(code) => code.as_str(),
            known => known.entry().map(|(_, wire, _)| *wire).unwrap_or_default(),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        ERROR_CODES
            .iter()
            .find(|(_, wire, _)| *wire == value)
            .map(|(code, _, _)| code.clone())
            .unwrap_or(ErrorCode::Other(value))
    }
}

impl From<ErrorCode> for String {
    fn from(value: ErrorCode) -> Self {
        value.wire_code().to_owned()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry() {
            Some((_, _, text)) => f.write_str(text),
            None => write!(f, "Unknown error code {}.", self.wire_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_wire_form() {
        for (code, wire, _) in ERROR_CODES {
            assert_eq!(ErrorCode::from(wire.to_string()), *code);
            assert_eq!(code.wire_code(), *wire);
        }
        assert_eq!(
            ErrorCode::from("zz".to_string()),
            ErrorCode::Other("zz".to_string())
        );
        assert_eq!(ErrorCode::Other("zz".into()).to_string(), "Unknown error code zz.");
    }

    #[test]
    fn sigil_split() {
        assert_eq!(Sigil::split_name("@admin"), (Sigil::Admin, "admin"));
        assert_eq!(Sigil::split_name("+verified"), (Sigil::IdCode, "verified"));
        assert_eq!(Sigil::split_name("plain"), (Sigil::NormalUser, "plain"));
    }

    #[test]
    fn game_details_parse_and_find_judge() {
        let details: GameDetails = serde_json::from_str(
            r#"{"gi":{"gid":7,"H":"alice","P":["alice","bob"],"V":["carol"],"S":"p",
                "go":{"pL":6,"vL":10,"sl":8},"hp":true,"gca":1500000000000},
                "pi":[{"N":"alice","sc":2,"st":"sh"},{"N":"bob","sc":0,"st":"sjj"}]}"#,
        )
        .unwrap();
        assert_eq!(details.game.id, 7);
        assert_eq!(details.game.state, GameState::Playing);
        assert_eq!(details.game.total_users(), 3);
        assert_eq!(details.judge(), Some("bob"));
        assert_eq!(details.winner(), None);
    }

    #[test]
    fn unknown_player_status_is_tolerated() {
        let info: PlayerInfo =
            serde_json::from_str(r#"{"N":"dave","sc":1,"st":"new"}"#).unwrap();
        assert_eq!(info.status, PlayerStatus::Unknown);
    }

    #[test]
    fn card_texts() {
        let black = BlackCard {
            id: 1,
            text: "Why ____?".into(),
            watermark: "US".into(),
            pick: 1,
        };
        assert_eq!(black.to_string(), "(Pick 1, source US) Why ____?");
        let white = WhiteCard {
            id: 2,
            text: "Bees.".into(),
            watermark: "UK".into(),
        };
        assert_eq!(white.to_string(), "Bees. (source UK)");
    }
}
