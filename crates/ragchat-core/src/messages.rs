use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One entry of a conversation. Fields are private so a turn cannot be
/// edited after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl std::fmt::Display for ConversationTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role.as_str(), self.content)
    }
}

/// Ordered conversation log for one connection.
///
/// Only the history manager produces new states; everything else reads a
/// snapshot through [`ConversationState::turns`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// New state with the exchange appended; `self` is left untouched.
    pub fn with_exchange(&self, user_message: &str, ai_response: &str) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 2);
        turns.extend_from_slice(&self.turns);
        turns.push(ConversationTurn::user(user_message));
        turns.push(ConversationTurn::assistant(ai_response));
        Self { turns }
    }

    /// Last `n` turns, oldest first. Returns fewer when the log is shorter.
    pub fn tail(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Plain-text rendering used inside prompts and progress events.
    pub fn render(&self, separator: &str) -> String {
        self.turns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_serializes_with_lowercase_role() {
        let json = serde_json::to_value(ConversationTurn::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn with_exchange_leaves_original_alone() {
        let base = ConversationState::new();
        let next = base.with_exchange("q", "a");
        assert!(base.is_empty());
        assert_eq!(next.len(), 2);
        assert_eq!(next.turns()[0], ConversationTurn::user("q"));
        assert_eq!(next.turns()[1], ConversationTurn::assistant("a"));
    }

    #[test]
    fn tail_clamps_to_length() {
        let state = ConversationState::new().with_exchange("q1", "a1");
        assert_eq!(state.tail(5).len(), 2);
        assert_eq!(state.tail(1), &[ConversationTurn::assistant("a1")]);
        assert!(ConversationState::new().tail(2).is_empty());
    }

    #[test]
    fn render_joins_turns() {
        let state = ConversationState::new().with_exchange("q", "a");
        assert_eq!(state.render("\n"), "user: q\nassistant: a");
    }

    #[test]
    fn state_serializes_as_array() {
        let state = ConversationState::from_turns(vec![ConversationTurn::system("summary")]);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json[0]["role"], "system");
    }
}
