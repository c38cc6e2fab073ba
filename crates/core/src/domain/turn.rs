use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TURN_WINDOW: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    /// Position in the whole conversation, not in the window.
    pub position: u64,
}

/// Trailing window of conversation turns, trimmed from the head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnWindow {
    capacity: usize,
    next_position: u64,
    turns: VecDeque<ConversationTurn>,
}

impl Default for TurnWindow {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_WINDOW)
    }
}

impl TurnWindow {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), next_position: 0, turns: VecDeque::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes capacity, dropping the oldest turns if the window shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        self.turns.push_back(ConversationTurn {
            role,
            text: text.into(),
            position: self.next_position,
        });
        self.next_position += 1;
        self.trim();
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

    /// The most recent `count` turns, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().skip(self.turns.len().saturating_sub(count))
    }

    pub fn last_assistant(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|turn| turn.role == TurnRole::Assistant)
    }

    fn trim(&mut self) {
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TurnRole, TurnWindow};

    #[test]
    fn window_trims_oldest_turns_and_keeps_positions() {
        let mut window = TurnWindow::new(3);
        for index in 0..5 {
            window.push(TurnRole::User, format!("message {index}"));
        }

        let positions = window.iter().map(|turn| turn.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![2, 3, 4]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut window = TurnWindow::default();
        window.push(TurnRole::User, "hi");
        window.push(TurnRole::Assistant, "hello, what brings you here?");
        window.push(TurnRole::User, "pricing");

        let recent = window.recent(2).map(|turn| turn.text.as_str()).collect::<Vec<_>>();
        assert_eq!(recent, vec!["hello, what brings you here?", "pricing"]);
        assert_eq!(
            window.last_assistant().map(|turn| turn.text.as_str()),
            Some("hello, what brings you here?")
        );
    }

    #[test]
    fn shrinking_capacity_trims_immediately() {
        let mut window = TurnWindow::new(10);
        for index in 0..6 {
            window.push(TurnRole::User, index.to_string());
        }
        window.set_capacity(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window.iter().next().map(|turn| turn.text.as_str()), Some("4"));
    }
}
