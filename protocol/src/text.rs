//! Text helpers: wrapping long listings over several lines and the emote envelope.

use crate::CTCP_MAGIC;
use thiserror::Error;

const ACTION_PREFIX: &str = "\u{1}ACTION ";

/// A piece that does not fit into a line on its own. Splitting a name would corrupt it,
/// so this is reported instead of truncating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("piece {piece:?} does not fit into the line budget of {budget}")]
pub struct LineWrapError {
    pub piece: String,
    pub budget: usize,
}

/// Assembles the pieces into one or more lines joined with `joiner`, no line longer than `budget`.
/// Every line but the last ends with the trimmed joiner, which is counted against the budget.
pub fn join_into_lines<S: AsRef<str>>(
    budget: usize,
    pieces: &[S],
    joiner: &str,
) -> Result<Vec<String>, LineWrapError> {
    let trimmed_joiner = joiner.trim();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut started = false;

    for (index, piece) in pieces.iter().enumerate() {
        let piece = piece.as_ref();
        // The last piece never gets a joiner behind it.
        let reserve = if index + 1 == pieces.len() {
            0
        } else {
            trimmed_joiner.len()
        };
        if trimmed_joiner.len() + piece.len() > budget {
            return Err(LineWrapError {
                piece: piece.to_owned(),
                budget,
            });
        }
        if !started {
            current.push_str(piece);
            started = true;
        } else if current.len() + joiner.len() + piece.len() + reserve > budget {
            current.push_str(trimmed_joiner);
            lines.push(std::mem::replace(&mut current, piece.to_owned()));
        } else {
            current.push_str(joiner);
            current.push_str(piece);
        }
    }

    if started {
        lines.push(current);
    }
    Ok(lines)
}

/// Checks for the `\x01ACTION ...\x01` envelope. Returns whether it was an emote and the bare text.
pub fn parse_emote(message: &str) -> (bool, &str) {
    match message
        .strip_prefix(ACTION_PREFIX)
        .and_then(|rest| rest.strip_suffix(CTCP_MAGIC))
    {
        Some(text) => (true, text),
        None => (false, message),
    }
}

/// Wraps the text into the emote envelope.
pub fn make_emote(text: &str) -> String {
    format!("{ACTION_PREFIX}{text}{CTCP_MAGIC}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(budget: usize, joiner: &str) -> Vec<String> {
        join_into_lines(budget, &["a", "b", "c"], joiner).unwrap()
    }

    #[test]
    fn wraps_with_space_joiner() {
        assert_eq!(wrap(5, " "), ["a b c"]);
        assert_eq!(wrap(3, " "), ["a b", "c"]);
        assert_eq!(wrap(2, " "), ["a", "b", "c"]);
        assert_eq!(wrap(1, " "), ["a", "b", "c"]);
    }

    #[test]
    fn wraps_with_comma_joiner() {
        assert_eq!(wrap(2, ", "), ["a,", "b,", "c"]);
        assert_eq!(wrap(3, ", "), ["a,", "b,", "c"]);
        assert_eq!(wrap(4, ", "), ["a,", "b, c"]);
        assert_eq!(wrap(5, ", "), ["a, b,", "c"]);
        assert_eq!(wrap(7, ", "), ["a, b, c"]);
    }

    #[test]
    fn lines_never_exceed_budget_and_keep_order() {
        let pieces: Vec<String> = (0..200).map(|i| format!("nick{}", i * 7)).collect();
        for budget in [10, 13, 40, 300] {
            for joiner in [" ", ", "] {
                let lines = join_into_lines(budget, &pieces, joiner).unwrap();
                assert!(lines.iter().all(|line| line.len() <= budget));

                let trimmed = joiner.trim();
                let rebuilt: Vec<String> = lines
                    .iter()
                    .flat_map(|line| {
                        line.split(joiner)
                            .map(|piece| piece.strip_suffix(trimmed).unwrap_or(piece).to_owned())
                            .collect::<Vec<_>>()
                    })
                    .collect();
                assert_eq!(rebuilt, pieces);
            }
        }
    }

    #[test]
    fn oversized_piece_fails_loudly() {
        let error = join_into_lines(4, &["ok", "far_too_long"], " ").unwrap_err();
        assert_eq!(error.piece, "far_too_long");
        assert_eq!(error.budget, 4);
    }

    #[test]
    fn no_pieces_no_lines() {
        let empty: [&str; 0] = [];
        assert!(join_into_lines(10, &empty, " ").unwrap().is_empty());
    }

    #[test]
    fn emote_envelope() {
        assert_eq!(parse_emote("\u{1}ACTION waves\u{1}"), (true, "waves"));
        assert_eq!(parse_emote("hello"), (false, "hello"));
        assert_eq!(parse_emote("\u{1}ACTION\u{1}"), (false, "\u{1}ACTION\u{1}"));
        assert_eq!(make_emote("dances"), "\u{1}ACTION dances\u{1}");
        let wrapped = make_emote("spins around");
        assert_eq!(parse_emote(&wrapped), (true, "spins around"));
    }
}
