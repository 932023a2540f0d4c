use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use recall_config::MessageDeletePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
	User,
	Assistant,
	System,
}
impl MessageRole {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
			Self::System => "system",
		}
	}
}
impl fmt::Display for MessageRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for MessageRole {
	type Err = UnknownRole;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim() {
			"user" => Ok(Self::User),
			"assistant" => Ok(Self::Assistant),
			"system" => Ok(Self::System),
			other => Err(UnknownRole(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);
impl fmt::Display for UnknownRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown message role {:?}.", self.0)
	}
}

/// Text used when a conversation is summarized without embeddings.
pub fn summary_or_title<'a>(summary: Option<&'a str>, title: &'a str) -> &'a str {
	summary.filter(|summary| !summary.trim().is_empty()).unwrap_or(title)
}

/// Whether a stored counter agrees with the live message count under a policy.
///
/// With `retain_count`, deletes leave the counter ahead of the live count, so only a counter
/// that is behind is a breach.
pub fn counter_consistent(
	message_count: i64,
	live_messages: i64,
	policy: MessageDeletePolicy,
	deleted_messages: i64,
) -> bool {
	match policy {
		MessageDeletePolicy::Decrement => message_count == live_messages,
		MessageDeletePolicy::RetainCount =>
			message_count == live_messages + deleted_messages && message_count >= live_messages,
	}
}
