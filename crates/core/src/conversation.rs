//! The per-call conversation turn model: a bounded rolling history of
//! (user, assistant) pairs plus the monotonic call-phase progression used by
//! prompt composition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Upper bound on retained turns; older entries are evicted FIFO.
pub const MAX_HISTORY_TURNS: usize = 10;
/// Turns included when formatting history into the LLM prompt.
pub const PROMPT_HISTORY_TURNS: usize = 6;

/// One committed user/assistant exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

/// A call's rolling conversation history, bounded to [`MAX_HISTORY_TURNS`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, evicting the oldest entry if at capacity.
    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.turns.len() >= MAX_HISTORY_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// The most recent `n` turns, oldest first, for prompt formatting.
    pub fn recent(&self, n: usize) -> Vec<&ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    /// Format the most recent [`PROMPT_HISTORY_TURNS`] as `User: .. / Assistant: ..` lines.
    pub fn format_recent_for_prompt(&self) -> String {
        self.recent(PROMPT_HISTORY_TURNS)
            .iter()
            .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render one transcript line per turn, for persistence.
    pub fn as_transcript_lines(&self) -> Vec<String> {
        self.turns
            .iter()
            .flat_map(|t| vec![format!("User: {}", t.user), format!("Assistant: {}", t.assistant)])
            .collect()
    }
}

/// Monotonically-advancing phase of a call, used for prompt context and
/// analytics. Advances CALL_START → DISCOVERY on the first committed turn,
/// DISCOVERY → ACTIVE once at least two turns have committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    #[default]
    CallStart,
    Discovery,
    Active,
}

impl CallPhase {
    /// Advance the phase given the number of turns committed so far (after
    /// the turn that just committed has been counted).
    pub fn advance(self, turns_committed: usize) -> Self {
        match self {
            CallPhase::CallStart if turns_committed >= 1 => CallPhase::Discovery,
            CallPhase::Discovery if turns_committed >= 2 => CallPhase::Active,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::CallStart => "call_start",
            CallPhase::Discovery => "discovery",
            CallPhase::Active => "active",
        }
    }
}

/// Coarse intent classification of a committed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Goodbye,
    Question,
}

const GOODBYE_PHRASES: &[&str] = &["bye", "goodbye", "end the call", "that's all", "talk later"];

/// Classify a committed utterance's intent by substring match against the
/// fixed goodbye-phrase list.
pub fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();
    if GOODBYE_PHRASES.iter().any(|p| lower.contains(p)) {
        Intent::Goodbye
    } else {
        Intent::Question
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_never_exceeds_bound() {
        let mut history = ConversationHistory::new();
        for i in 0..25 {
            history.push(format!("u{i}"), format!("a{i}"));
        }
        assert!(history.len() <= MAX_HISTORY_TURNS);
        assert_eq!(history.recent(1)[0].user, "u24");
    }

    #[test]
    fn call_phase_advances_monotonically() {
        let mut phase = CallPhase::CallStart;
        phase = phase.advance(1);
        assert_eq!(phase, CallPhase::Discovery);
        phase = phase.advance(2);
        assert_eq!(phase, CallPhase::Active);
        // Never regresses.
        phase = phase.advance(0);
        assert_eq!(phase, CallPhase::Active);
    }

    #[test]
    fn goodbye_phrases_are_detected() {
        assert_eq!(classify_intent("okay, bye"), Intent::Goodbye);
        assert_eq!(classify_intent("that's all for now"), Intent::Goodbye);
        assert_eq!(classify_intent("what services do you offer"), Intent::Question);
    }
}
