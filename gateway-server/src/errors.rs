//! Translation of backend errors into protocol errors.

use protocol::numerics::*;
use pyx_client::{BackendError, ErrorCode};

/// Backend refusals of a join and the protocol error they become.
const JOIN_ERRORS: &[(ErrorCode, &str, &str)] = &[
    (
        ErrorCode::CannotJoinAnotherGame,
        ERR_TOOMANYCHANNELS,
        "Too many joined channels",
    ),
    (ErrorCode::GameFull, ERR_CHANNELISFULL, "Channel is full"),
    (ErrorCode::InvalidGame, ERR_NOSUCHCHANNEL, "No such channel"),
    (ErrorCode::WrongPassword, ERR_BADCHANNELKEY, "Wrong key"),
];

/// Backend answers to a leave that mean we are not in the game anymore anyway.
const ALREADY_LEFT: &[ErrorCode] = &[ErrorCode::NotInThatGame, ErrorCode::InvalidGame];

/// The numeric and the trailing message for a failed join.
pub fn join_failure(error: &BackendError) -> (&'static str, String) {
    error
        .code()
        .and_then(|code| JOIN_ERRORS.iter().find(|(known, _, _)| known == code))
        .map(|(_, numeric, message)| (*numeric, message.to_string()))
        .unwrap_or_else(|| (ERR_SERVICECONFUSED, format!("Cannot join game: {}", error)))
}

/// Whether a failed leave still leaves us outside the game.
pub fn already_left(error: &BackendError) -> bool {
    error.code().is_some_and(|code| ALREADY_LEFT.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn join_table_maps_to_distinct_numerics() {
        let numerics: HashSet<&str> = JOIN_ERRORS.iter().map(|(_, numeric, _)| *numeric).collect();
        assert_eq!(numerics.len(), JOIN_ERRORS.len());
        for (code, numeric, message) in JOIN_ERRORS {
            let (mapped, text) = join_failure(&BackendError::Application(code.clone()));
            assert_eq!(mapped, *numeric);
            assert_eq!(text, *message);
        }
    }

    #[test]
    fn everything_else_is_service_confusion() {
        let (numeric, text) = join_failure(&BackendError::Application(ErrorCode::TooFast));
        assert_eq!(numeric, ERR_SERVICECONFUSED);
        assert!(text.starts_with("Cannot join game: "));

        let (numeric, _) = join_failure(&BackendError::NonConforming("html".into()));
        assert_eq!(numeric, ERR_SERVICECONFUSED);
    }

    #[test]
    fn leave_desync_codes() {
        assert!(already_left(&BackendError::Application(ErrorCode::NotInThatGame)));
        assert!(already_left(&BackendError::Application(ErrorCode::InvalidGame)));
        assert!(!already_left(&BackendError::Application(ErrorCode::ServerError)));
        assert!(!already_left(&BackendError::NonConforming(String::new())));
    }
}
