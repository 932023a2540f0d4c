use serde::{Deserialize, Serialize};

use crate::text;

pub const MEMORY_MATCH: &str = "memory_match";
pub const CONTEXT_SWITCH: &str = "context_switch";

/// Labels that make the evaluator surface memories. Static policy, not a classifier.
pub const RESPONDING_TRIGGERS: [&str; 2] = [MEMORY_MATCH, CONTEXT_SWITCH];

const RESPONSE_PREFIX: &str = "Based on your context: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
	Idle,
	Evaluating,
	Responding,
	Silent,
}
impl TriggerState {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Responding | Self::Silent)
	}
}

/// Decides the terminal state for a trigger label.
pub fn decide(trigger_label: &str) -> TriggerState {
	if RESPONDING_TRIGGERS.contains(&trigger_label) {
		TriggerState::Responding
	} else {
		TriggerState::Silent
	}
}

pub fn template_response(context_text: &str, prefix_chars: usize) -> String {
	format!("{RESPONSE_PREFIX}{}", text::truncate_chars(context_text, prefix_chars))
}
