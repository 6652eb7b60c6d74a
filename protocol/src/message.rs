//! Parsing of inbound lines.

use crate::TRAILING_MARKER;

/// One inbound line split into command and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The command, always upper case.
    pub command: String,
    /// The arguments. The last one may contain spaces if the line used a trailing argument.
    pub args: Vec<String>,
}

impl Message {
    /// Splits a raw line. Never fails: an empty line yields an empty command without arguments,
    /// deciding what is valid is up to the router.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, trailing) = match line.split_once(TRAILING_MARKER) {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (line, None),
        };

        let mut parts = head.split_whitespace();
        let command = parts.next().unwrap_or_default().to_ascii_uppercase();
        let mut args: Vec<String> = parts.map(str::to_owned).collect();
        if let Some(trailing) = trailing {
            args.push(trailing.to_owned());
        }

        tracing::trace!(command = %command, ?args, "Parsed message");
        Message { command, args }
    }

    /// The argument at the given position, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(input: &str, command: &str, args: &[&str]) {
        let message = Message::parse(input);
        assert_eq!(message.command, command, "command for {input:?}");
        assert_eq!(message.args, args, "args for {input:?}");
    }

    #[test]
    fn empty_line_parses_to_empty_command() {
        check("", "", &[]);
        check("   ", "", &[]);
    }

    #[test]
    fn whitespace_is_collapsed() {
        check("nick test", "NICK", &["test"]);
        check("nick    test", "NICK", &["test"]);
        check("   nick    test   ", "NICK", &["test"]);
    }

    #[test]
    fn trailing_argument_keeps_spaces() {
        check("user test 0 0 :test user", "USER", &["test", "0", "0", "test user"]);
        check("privmsg #test :testing 1 2 3", "PRIVMSG", &["#test", "testing 1 2 3"]);
        check("privmsg   #test    :testing 1 2 3   ", "PRIVMSG", &["#test", "testing 1 2 3"]);
    }

    #[test]
    fn empty_trailing_argument_is_kept() {
        check("privmsg   #test    :", "PRIVMSG", &["#test", ""]);
    }

    #[test]
    fn only_first_marker_splits() {
        check("privmsg #a :b :c d", "PRIVMSG", &["#a", "b :c d"]);
    }

    #[test]
    fn command_only_with_trailing() {
        check("quit :gone fishing", "QUIT", &["gone fishing"]);
    }
}
