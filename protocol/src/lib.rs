//! The text wire protocol spoken between chat clients and the gateway.
//! It provides:
//! - [`Message`]: the parsed form of one inbound line
//! - [`ReplyFormatter`]: construction of outbound lines bound to the advertised server name
//! - [`numerics`]: the numeric replies and errors the gateway emits
//! - [`text`]: line wrapping for long listings and the emote envelope

pub mod message;
pub mod numerics;
pub mod reply;
pub mod text;

pub use message::Message;
pub use reply::ReplyFormatter;
pub use text::{LineWrapError, join_into_lines, make_emote, parse_emote};

/// The buffer sizes for the channels for intra process communication.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Marks the start of the trailing argument, which may contain spaces.
pub const TRAILING_MARKER: char = ':';

/// Delimits out of band client-to-client messages like emotes.
pub const CTCP_MAGIC: char = '\u{1}';

/// The maximum amount of characters we put into one NAMES reply line.
/// The line limit is 512 bytes, this leaves room for prefix, numeric and channel.
pub const NAMES_LINE_BUDGET: usize = 300;

/// Verbs we send that are not numerics.
pub const JOIN: &str = "JOIN";
pub const PART: &str = "PART";
pub const MODE: &str = "MODE";
pub const TOPIC: &str = "TOPIC";
pub const PRIVMSG: &str = "PRIVMSG";
pub const NOTICE: &str = "NOTICE";
pub const KICK: &str = "KICK";
pub const QUIT: &str = "QUIT";
pub const KILL: &str = "KILL";
pub const PONG: &str = "PONG";
