//! Conversation memory window.
//!
//! Converts persisted messages into chat turns and keeps the longest suffix
//! of whole turns that fits the token budget. Turns are never split; the
//! most recent turn is always kept even when it alone exceeds the budget, so
//! the model always sees the live query context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StoredMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    pub conversation_id: Uuid,
    pub created_at: String,
    pub source_chunk_id: Option<Uuid>,
}

impl ChatTurn {
    pub fn from_stored(message: &StoredMessage) -> Self {
        let role = match message.role.as_str() {
            "assistant" | "ai" => TurnRole::Assistant,
            _ => TurnRole::User,
        };

        Self {
            role,
            content: message.content.clone(),
            conversation_id: message.conversation_id,
            created_at: message.created_at.clone(),
            source_chunk_id: message.source_embedding_id,
        }
    }
}

/// Truncates `turns` to a contiguous trailing subsequence whose estimated
/// token total fits `token_budget`. Oldest turns are dropped first.
pub fn build_context(turns: Vec<ChatTurn>, token_budget: usize) -> Vec<ChatTurn> {
    if turns.is_empty() {
        return turns;
    }

    let mut kept = 0usize;
    let mut total = 0usize;

    for turn in turns.iter().rev() {
        let tokens = estimate_tokens(&turn.content);
        if kept > 0 && total + tokens > token_budget {
            break;
        }
        total += tokens;
        kept += 1;
    }

    let mut turns = turns;
    turns.split_off(turns.len() - kept)
}

/// Rough token estimate: ~4 characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_turn(role: TurnRole, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
            conversation_id: Uuid::from_u128(7),
            created_at: "2025-06-01T00:00:00Z".to_string(),
            source_chunk_id: None,
        }
    }

    fn alternating_turns(contents: &[&str]) -> Vec<ChatTurn> {
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let role = if i % 2 == 0 {
                    TurnRole::User
                } else {
                    TurnRole::Assistant
                };
                make_turn(role, content)
            })
            .collect()
    }

    #[test]
    fn result_is_a_suffix_of_the_input() {
        let turns = alternating_turns(&[
            "first question about the report",
            "first answer with some detail in it",
            "second question",
            "second answer",
        ]);
        let budget = 8; // roughly two short turns

        let window = build_context(turns.clone(), budget);

        assert!(!window.is_empty());
        assert!(window.len() <= turns.len());
        let offset = turns.len() - window.len();
        for (i, turn) in window.iter().enumerate() {
            assert_eq!(turn.content, turns[offset + i].content);
        }
    }

    #[test]
    fn oldest_turns_are_dropped_first() {
        let turns = alternating_turns(&["aaaa aaaa", "bbbb bbbb", "cccc cccc"]);
        // Each turn is ~3 tokens; budget fits two.
        let window = build_context(turns, 6);

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "bbbb bbbb");
        assert_eq!(window[1].content, "cccc cccc");
    }

    #[test]
    fn oversized_newest_turn_is_still_kept() {
        let long_turn = "a very long turn ".repeat(100);
        let turns = alternating_turns(&["short", long_turn.as_str()]);
        let window = build_context(turns, 4);

        assert_eq!(window.len(), 1);
        assert!(window[0].content.starts_with("a very long turn"));
    }

    #[test]
    fn whole_history_fits_when_budget_is_large() {
        let turns = alternating_turns(&["one", "two", "three"]);
        let window = build_context(turns.clone(), 10_000);
        assert_eq!(window.len(), turns.len());
    }

    #[test]
    fn empty_history_stays_empty() {
        let window = build_context(Vec::new(), 100);
        assert!(window.is_empty());
    }

    #[test]
    fn stored_roles_map_onto_turn_roles() {
        let message = StoredMessage {
            id: Uuid::from_u128(1),
            conversation_id: Uuid::from_u128(2),
            role: "assistant".to_string(),
            content: "hello".to_string(),
            source_embedding_id: Some(Uuid::from_u128(3)),
            created_at: "2025-06-01T00:00:00Z".to_string(),
        };

        let turn = ChatTurn::from_stored(&message);
        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(turn.source_chunk_id, Some(Uuid::from_u128(3)));
    }
}
