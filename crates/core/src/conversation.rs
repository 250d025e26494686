//! Conversation turns and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role attributed to one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Instructions, sent once at conversation start.
    System,
    /// Transcribed human speech.
    User,
    /// Model-generated reply text.
    Assistant,
}

/// One role-tagged utterance in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }
}

/// Ordered, append-only sequence of turns for one conversation.
///
/// The first element, if present, is the lone system turn; it is included
/// when building completion requests but excluded from every externally
/// exposed view.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the lone system turn at the head of the history.
    pub fn set_system(&mut self, content: impl Into<String>) {
        match self.turns.first_mut() {
            Some(turn) if turn.role == TurnRole::System => {
                turn.content = content.into();
            }
            _ => self.turns.insert(0, Turn::system(content)),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    /// Snapshot for the UI layer, with the system turn excluded.
    pub fn visible(&self) -> Vec<Turn> {
        self.turns
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .cloned()
            .collect()
    }

    /// Full ordered view, system turn included, for completion requests.
    pub fn for_completion(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clear the history for a fresh conversation.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_turn_excluded_from_visible() {
        let mut history = ConversationHistory::new();
        history.set_system("be brief");
        history.push_user("hello");
        history.push_assistant("hi there");

        let visible = history.visible();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].role, TurnRole::User);
        assert_eq!(visible[1].role, TurnRole::Assistant);

        let full = history.for_completion();
        assert_eq!(full.len(), 3);
        assert_eq!(full[0].role, TurnRole::System);
    }

    #[test]
    fn test_set_system_is_idempotent() {
        let mut history = ConversationHistory::new();
        history.push_user("early");
        history.set_system("first");
        history.set_system("second");

        let full = history.for_completion();
        assert_eq!(full.len(), 2);
        assert_eq!(full[0].role, TurnRole::System);
        assert_eq!(full[0].content, "second");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut history = ConversationHistory::new();
        history.set_system("x");
        history.push_user("y");
        history.reset();
        assert!(history.is_empty());
    }

    #[test]
    fn test_turn_serializes_with_lowercase_role() {
        let turn = Turn::user("hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
