use serde::{Deserialize, Serialize};

/// Token usage reported by the provider for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold a later usage report into this one. Anthropic sends input tokens
    /// on `message_start` and output tokens on `message_delta`, so non-zero
    /// fields win.
    pub fn merge(&mut self, other: TokenUsage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_nonzero_fields() {
        let mut usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 0,
        };
        usage.merge(TokenUsage {
            input_tokens: 0,
            output_tokens: 45,
        });
        assert_eq!(
            usage,
            TokenUsage {
                input_tokens: 120,
                output_tokens: 45
            }
        );
        assert_eq!(usage.total(), 165);
    }

    #[test]
    fn total_saturates() {
        let usage = TokenUsage {
            input_tokens: u32::MAX,
            output_tokens: 1,
        };
        assert_eq!(usage.total(), u32::MAX);
    }
}
