//! Append-only conversation history.
//!
//! A [`Transcript`] holds at most one in-flight assistant turn. Only that
//! turn may grow; every other turn is frozen the moment it is appended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message unit in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), at: Utc::now() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Returned when an append would break the ordering discipline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("an assistant turn is still being filled")]
pub struct TurnInFlight;

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    in_flight: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Append a finished turn.
    pub fn push(&mut self, turn: Turn) -> Result<(), TurnInFlight> {
        if self.in_flight.is_some() {
            return Err(TurnInFlight);
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Append an empty assistant turn that later fragments extend.
    pub fn begin_assistant(&mut self) -> Result<(), TurnInFlight> {
        self.push(Turn::assistant(String::new()))?;
        self.in_flight = Some(self.turns.len() - 1);
        Ok(())
    }

    /// Extend the in-flight turn. Returns `false` when nothing is in flight.
    pub fn append_fragment(&mut self, fragment: &str) -> bool {
        match self.in_flight {
            Some(idx) => {
                self.turns[idx].content.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Freeze the in-flight turn, if any.
    pub fn finalize(&mut self) {
        self.in_flight = None;
    }

    /// Number of completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Assistant).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let t = Transcript::new();
        assert!(t.is_empty());
        assert!(t.last().is_none());
        assert!(!t.has_in_flight());
    }

    #[test]
    fn fragments_extend_only_the_in_flight_turn() {
        let mut t = Transcript::new();
        t.push(Turn::user("Count")).unwrap();
        t.begin_assistant().unwrap();
        assert!(t.append_fragment("1"));
        assert!(t.append_fragment("2"));
        t.finalize();
        assert!(!t.append_fragment("3"));
        assert_eq!(t.turns()[1].content, "12");
        assert_eq!(t.exchanges(), 1);
    }

    #[test]
    fn push_refused_while_in_flight() {
        let mut t = Transcript::new();
        t.push(Turn::user("a")).unwrap();
        t.begin_assistant().unwrap();
        assert_eq!(t.push(Turn::user("b")), Err(TurnInFlight));
        assert_eq!(t.begin_assistant(), Err(TurnInFlight));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn turn_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
        assert!(json["at"].is_string());
    }
}
