//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Good enough
//! to keep a request inside a local model's context window without
//! shipping a tokenizer.

use lokal_core::message::Turn;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single turn including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name and delimiters
/// in the chat template.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(&turn.content)
}

/// Estimate tokens for a slice of turns.
pub fn estimate_turns_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(estimate_turn_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn turn_includes_overhead() {
        let turn = Turn::user("test"); // 4 chars → 1 token + 4 overhead = 5
        assert_eq!(estimate_turn_tokens(&turn), 5);
    }

    #[test]
    fn multiple_turns() {
        let turns = vec![
            Turn::user("hello"),      // 2 tokens + 4 overhead = 6
            Turn::assistant("world"), // 2 tokens + 4 overhead = 6
        ];
        assert_eq!(estimate_turns_tokens(&turns), 12);
    }
}
