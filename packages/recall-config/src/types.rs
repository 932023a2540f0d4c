use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub memory: Memory,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub context: Context,
	#[serde(default)]
	pub proactive: Proactive,
	#[serde(default)]
	pub conversation: Conversation,
	#[serde(default)]
	pub chat: Chat,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	/// Upper bound for a single document store or vector index call.
	#[serde(default = "default_storage_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub completion: CompletionProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompletionProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Memory {
	pub max_content_chars: u32,
	pub default_list_limit: u32,
	pub max_list_limit: u32,
}
impl Default for Memory {
	fn default() -> Self {
		Self { max_content_chars: 8_192, default_list_limit: 20, max_list_limit: 200 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub default_limit: u32,
	pub max_limit: u32,
	pub default_threshold: f32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { default_limit: 10, max_limit: 50, default_threshold: 0.7 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Context {
	pub max_messages: u32,
	/// Number of recent messages attached to a summary lookup.
	pub summary_message_limit: u32,
	/// Character budget for an assembled completion request, system prompt included.
	pub max_context_chars: u32,
	pub memory_limit: u32,
	pub system_prompt: String,
}
impl Default for Context {
	fn default() -> Self {
		Self {
			max_messages: 20,
			summary_message_limit: 5,
			max_context_chars: 24_000,
			memory_limit: 5,
			system_prompt: "You are a helpful AI assistant with persistent memory.".to_string(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Proactive {
	pub limit: u32,
	pub threshold: f32,
	pub response_prefix_chars: u32,
}
impl Default for Proactive {
	fn default() -> Self {
		Self { limit: 5, threshold: 0.0, response_prefix_chars: 100 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Conversation {
	pub default_title: String,
	pub default_list_limit: u32,
	pub default_message_limit: u32,
	pub message_delete_policy: MessageDeletePolicy,
}
impl Default for Conversation {
	fn default() -> Self {
		Self {
			default_title: "New Conversation".to_string(),
			default_list_limit: 20,
			default_message_limit: 50,
			message_delete_policy: MessageDeletePolicy::default(),
		}
	}
}

/// What deleting a single message does to the parent's `message_count`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MessageDeletePolicy {
	/// Counter stays untouched, so it keeps counting every append ever made.
	#[default]
	RetainCount,
	/// Counter is decremented together with the delete and tracks live messages.
	Decrement,
}
impl MessageDeletePolicy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RetainCount => "retain_count",
			Self::Decrement => "decrement",
		}
	}

	pub fn decrements(self) -> bool {
		matches!(self, Self::Decrement)
	}
}
impl FromStr for MessageDeletePolicy {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"retain_count" => Ok(Self::RetainCount),
			"decrement" => Ok(Self::Decrement),
			_ => Err(format!(
				"conversation.message_delete_policy must be one of retain_count or decrement, \
				 got {raw:?}."
			)),
		}
	}
}
impl TryFrom<String> for MessageDeletePolicy {
	type Error = String;

	fn try_from(raw: String) -> Result<Self, Self::Error> {
		raw.parse()
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Chat {
	pub capture_memories: bool,
}

fn default_storage_timeout_ms() -> u64 {
	10_000
}
