//! The short keys and codes the backend uses on the wire.
//! Requests are form encoded, responses and long poll events are JSON objects using the same keys.

/// Paths relative to the configured base address.
pub mod path {
    pub const GAME_PAGE: &str = "game.jsp";
    pub const CONFIG_SCRIPT: &str = "js/cah.config.js";
    pub const AJAX: &str = "AjaxServlet";
    pub const LONG_POLL: &str = "LongPollServlet";
}

/// The name of the session cookie handed out by the game page.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Settings in the config script we care about.
pub const GLOBAL_CHAT_ENABLED_SETTING: &str = "cah.GLOBAL_CHAT_ENABLED";
pub const BROADCASTING_USERS_SETTING: &str = "cah.BROADCASTING_USERS";

/// Operation codes, sent in [`request::OP`].
pub mod op {
    pub const FIRST_LOAD: &str = "fl";
    pub const REGISTER: &str = "r";
    pub const NAMES: &str = "gn";
    pub const GAME_LIST: &str = "ggl";
    pub const GAME_INFO: &str = "ggi";
    pub const CHAT: &str = "c";
    pub const GAME_CHAT: &str = "GC";
    pub const SPECTATE_GAME: &str = "vg";
    pub const LEAVE_GAME: &str = "lg";
    pub const WHOIS: &str = "Wi";
    pub const LOG_OUT: &str = "lo";
}

/// Form fields of a request.
pub mod request {
    pub const OP: &str = "o";
    pub const SERIAL: &str = "s";
    pub const NICKNAME: &str = "n";
    pub const ID_CODE: &str = "idc";
    pub const MESSAGE: &str = "m";
    pub const EMOTE: &str = "me";
    pub const WALL: &str = "wall";
    pub const GAME_ID: &str = "gid";
    pub const PASSWORD: &str = "pw";
}

/// Keys of response objects.
pub mod response {
    pub const ERROR: &str = "e";
    pub const ERROR_CODE: &str = "ec";
    /// Occupants of the global lobby, answer to [`super::op::NAMES`].
    pub const NAMES: &str = "nl";
    /// Answer to [`super::op::GAME_LIST`].
    pub const GAMES: &str = "gl";
    /// First load found a session that is already registered.
    pub const IN_PROGRESS: &str = "ip";
    /// Where the web client would continue after first load.
    pub const NEXT: &str = "next";
    /// Start of the backend in milliseconds since the epoch, part of the first load answer.
    pub const SERVER_STARTED: &str = "SS";
}

/// Long poll event kinds, sent in the `E` key.
pub mod event {
    pub const BANNED: &str = "B&";
    pub const CHAT: &str = "c";
    pub const FILTERED_CHAT: &str = "FC";
    pub const GAME_BLACK_RESHUFFLE: &str = "gbr";
    pub const GAME_JUDGE_LEFT: &str = "gjl";
    pub const GAME_JUDGE_SKIPPED: &str = "gjs";
    pub const GAME_LIST_REFRESH: &str = "glr";
    pub const GAME_OPTIONS_CHANGED: &str = "goc";
    pub const GAME_PLAYER_INFO_CHANGE: &str = "gpic";
    pub const GAME_PLAYER_JOIN: &str = "gpj";
    pub const GAME_PLAYER_KICKED_IDLE: &str = "gpki";
    pub const GAME_PLAYER_LEAVE: &str = "gpl";
    pub const GAME_PLAYER_SKIPPED: &str = "gps";
    pub const GAME_ROUND_COMPLETE: &str = "grc";
    pub const GAME_SPECTATOR_JOIN: &str = "gvj";
    pub const GAME_SPECTATOR_LEAVE: &str = "gvl";
    pub const GAME_STATE_CHANGE: &str = "gsc";
    pub const GAME_WHITE_RESHUFFLE: &str = "gwr";
    pub const HAND_DEAL: &str = "hd";
    pub const KICKED: &str = "kk";
    pub const KICKED_FROM_GAME_IDLE: &str = "kfgi";
    pub const NEW_PLAYER: &str = "np";
    pub const NOOP: &str = "_";
    pub const PLAYER_LEAVE: &str = "pl";
}
