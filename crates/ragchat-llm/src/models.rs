/// Information about a Claude model's limits and pricing.
#[derive(Clone, Debug)]
pub struct ClaudeModelInfo {
    pub name: &'static str,
    pub max_output: u32,
    pub input_cost_per_mtok: f64,
    pub output_cost_per_mtok: f64,
}

impl ClaudeModelInfo {
    /// Cost in US dollars for one request.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input = input_tokens as f64 / 1_000_000.0 * self.input_cost_per_mtok;
        let output = output_tokens as f64 / 1_000_000.0 * self.output_cost_per_mtok;
        input + output
    }

    /// Requested output budget capped at what the model can produce.
    pub fn clamp_max_tokens(&self, requested: u32) -> u32 {
        requested.min(self.max_output)
    }
}

pub static CLAUDE_SONNET_4_5: ClaudeModelInfo = ClaudeModelInfo {
    name: "claude-sonnet-4-5-20250929",
    max_output: 64_000,
    input_cost_per_mtok: 3.0,
    output_cost_per_mtok: 15.0,
};

pub static CLAUDE_HAIKU_4_5: ClaudeModelInfo = ClaudeModelInfo {
    name: "claude-haiku-4-5-20251001",
    max_output: 64_000,
    input_cost_per_mtok: 1.0,
    output_cost_per_mtok: 5.0,
};

pub static CLAUDE_SONNET_3_5: ClaudeModelInfo = ClaudeModelInfo {
    name: "claude-3-5-sonnet-20240620",
    max_output: 8_192,
    input_cost_per_mtok: 3.0,
    output_cost_per_mtok: 15.0,
};

static ALL_MODELS: &[&ClaudeModelInfo] =
    &[&CLAUDE_SONNET_4_5, &CLAUDE_HAIKU_4_5, &CLAUDE_SONNET_3_5];

pub fn find_model(name: &str) -> Option<&'static ClaudeModelInfo> {
    ALL_MODELS.iter().find(|m| m.name == name).copied()
}

pub fn default_model() -> &'static ClaudeModelInfo {
    &CLAUDE_SONNET_4_5
}
