//! Construction of outbound lines.

use std::fmt::Display;

/// Builds outbound lines prefixed with the advertised server name.
/// Holds no other state, the same inputs always give the same line.
#[derive(Debug, Clone)]
pub struct ReplyFormatter {
    server_name: String,
}

impl ReplyFormatter {
    pub fn new(server_name: impl Into<String>) -> Self {
        ReplyFormatter {
            server_name: server_name.into(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// `:<server> <code> <target> <body>`. The body is taken as is, so it has to carry its own
    /// trailing marker where one is needed.
    pub fn format(&self, code: &str, target: &str, body: impl Display) -> String {
        format!(":{} {} {} {}", self.server_name, code, target, body)
    }

    /// Like [`ReplyFormatter::format`], but the whole message becomes the trailing argument.
    pub fn simple(&self, code: &str, target: &str, message: impl Display) -> String {
        format!(":{} {} {} :{}", self.server_name, code, target, message)
    }

    /// Same as [`ReplyFormatter::simple`] with an additional parameter before the message,
    /// e.g. the offending command for unknown command errors.
    pub fn with_param(&self, code: &str, target: &str, param: &str, message: impl Display) -> String {
        format!(":{} {} {} {} :{}", self.server_name, code, target, param, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::*;

    #[test]
    fn format_uses_body_verbatim() {
        let replies = ReplyFormatter::new("irc.example");
        assert_eq!(
            replies.format(RPL_TOPIC, "alice", format_args!("{} :{}", "#global", "Global chat")),
            ":irc.example 332 alice #global :Global chat"
        );
    }

    #[test]
    fn simple_wraps_trailing() {
        let replies = ReplyFormatter::new("irc.example");
        assert_eq!(
            replies.simple(ERR_NOTREGISTERED, "*", "You have not registered"),
            ":irc.example 451 * :You have not registered"
        );
    }

    #[test]
    fn with_param_puts_param_before_trailing() {
        let replies = ReplyFormatter::new("irc.example");
        assert_eq!(
            replies.with_param(ERR_UNKNOWNCOMMAND, "bob", "FOO", "Unknown command"),
            ":irc.example 421 bob FOO :Unknown command"
        );
    }

    #[test]
    fn formatting_is_pure() {
        let replies = ReplyFormatter::new("s");
        let first = replies.simple(RPL_WELCOME, "a", "hi");
        let second = replies.simple(RPL_WELCOME, "a", "hi");
        assert_eq!(first, second);
    }
}
