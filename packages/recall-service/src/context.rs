use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, MessageView, RankedMemory, RecallService, Result};
use recall_domain::{
	conversation::{self as rules, MessageRole},
	text,
};
use recall_providers::completion::ChatMessage;
use recall_storage::models::MessageOrder;

const MEMORY_BLOCK_HEADER: &str = "Relevant memories:";
const MEMORY_LINE_PREFIX: &str = "\n- ";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummaryContext {
	pub conversation_id: Uuid,
	pub context: String,
	pub supporting_memories: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionContextRequest {
	pub owner_id: String,
	pub conversation_id: Uuid,
	/// Text used to look up memories. Defaults to the latest user message.
	#[serde(default)]
	pub query: Option<String>,
	#[serde(default)]
	pub max_messages: Option<i64>,
	#[serde(default)]
	pub memory_limit: Option<i64>,
	#[serde(default)]
	pub threshold: Option<f32>,
}

/// The bounded window handed to the completion provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionContext {
	pub messages: Vec<ChatMessage>,
	pub memories: Vec<RankedMemory>,
	pub history: Vec<MessageView>,
	pub dropped_messages: usize,
	pub dropped_memories: usize,
}

impl RecallService {
	/// The latest `max_messages` messages, oldest first.
	pub async fn assemble_chat_context(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
		max_messages: i64,
	) -> Result<Vec<MessageView>> {
		let owner_id = crate::require_owner(owner_id)?;
		let max_messages = crate::resolve_limit("max_messages", Some(max_messages), 0)?;

		self.load_conversation(owner_id, conversation_id).await?;
		self.read_messages(owner_id, conversation_id, max_messages, MessageOrder::LatestWindow)
			.await
	}

	/// Summary (or title) plus the contents of the latest few messages, oldest first.
	pub async fn assemble_conversation_summary_context(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
	) -> Result<SummaryContext> {
		let owner_id = crate::require_owner(owner_id)?;
		let conversation = self.load_conversation(owner_id, conversation_id).await?;
		let context =
			rules::summary_or_title(conversation.summary.as_deref(), &conversation.title).to_string();
		let limit = self.cfg.context.summary_message_limit;
		let supporting_memories = if limit == 0 {
			Vec::new()
		} else {
			self.read_messages(owner_id, conversation_id, limit, MessageOrder::LatestWindow)
				.await?
				.into_iter()
				.map(|message| message.content)
				.collect()
		};

		Ok(SummaryContext { conversation_id, context, supporting_memories })
	}

	/// Builds the system prompt, an optional ranked memory block, and the recent history, then
	/// trims to `context.max_context_chars`: oldest messages go first, then the lowest-ranked
	/// memories. The newest message is always kept.
	pub async fn assemble_completion_request(
		&self,
		req: CompletionContextRequest,
	) -> Result<CompletionContext> {
		let owner_id = crate::require_owner(&req.owner_id)?;
		let max_messages = crate::resolve_limit(
			"max_messages",
			req.max_messages,
			self.cfg.context.max_messages,
		)?;
		let memory_limit = match req.memory_limit {
			Some(0) => 0,
			other => crate::resolve_limit("memory_limit", other, self.cfg.context.memory_limit)?,
		};

		if memory_limit > self.cfg.retrieval.max_limit {
			return Err(Error::Validation {
				message: format!("memory_limit must be at most {}.", self.cfg.retrieval.max_limit),
			});
		}

		let threshold = req.threshold.unwrap_or(self.cfg.retrieval.default_threshold);

		if !recall_domain::similarity::threshold_valid(threshold) {
			return Err(Error::Validation {
				message: "threshold must be a finite number in the range 0.0-1.0.".to_string(),
			});
		}

		self.load_conversation(owner_id, req.conversation_id).await?;

		let history = self
			.read_messages(owner_id, req.conversation_id, max_messages, MessageOrder::LatestWindow)
			.await?;
		let query = req
			.query
			.as_deref()
			.map(str::trim)
			.filter(|query| !query.is_empty())
			.map(str::to_string)
			.or_else(|| {
				history
					.iter()
					.rev()
					.find(|message| message.role == MessageRole::User)
					.map(|message| message.content.clone())
			});
		let memories = match query {
			Some(query) if memory_limit > 0 => self
				.retrieve_validated(owner_id, &query, memory_limit, threshold, self.deadlines())
				.await
				.or_else(|err| {
					if !err.is_retryable() {
						return Err(err);
					}

					tracing::warn!(
						%owner_id,
						error = %err,
						"Memory lookup failed. Continuing without memories."
					);

					Ok(Vec::new())
				})?,
			_ => Vec::new(),
		};
		let system_prompt = self.cfg.context.system_prompt.as_str();
		let memory_chars =
			memories.iter().map(|m| text::char_len(&m.memory.content)).collect::<Vec<_>>();
		let message_chars =
			history.iter().map(|m| text::char_len(&m.content)).collect::<Vec<_>>();
		let plan = plan_window(
			text::char_len(system_prompt),
			&memory_chars,
			&message_chars,
			self.cfg.context.max_context_chars as usize,
		);
		let mut memories = memories;
		let mut history = history;

		memories.truncate(plan.keep_memories);
		history.drain(..plan.skip_messages);

		let mut messages = vec![ChatMessage::new(MessageRole::System.as_str(), system_prompt)];

		if !memories.is_empty() {
			messages.push(ChatMessage::new(
				MessageRole::System.as_str(),
				render_memory_block(&memories),
			));
		}

		messages.extend(
			history.iter().map(|message| ChatMessage::new(message.role.as_str(), &message.content)),
		);

		if plan.skip_messages > 0 || plan.dropped_memories > 0 {
			tracing::debug!(
				%owner_id,
				conversation_id = %req.conversation_id,
				dropped_messages = plan.skip_messages,
				dropped_memories = plan.dropped_memories,
				"Context window trimmed to budget."
			);
		}

		Ok(CompletionContext {
			messages,
			memories,
			history,
			dropped_messages: plan.skip_messages,
			dropped_memories: plan.dropped_memories,
		})
	}
}

#[derive(Debug, PartialEq, Eq)]
struct WindowPlan {
	skip_messages: usize,
	keep_memories: usize,
	dropped_memories: usize,
}

fn render_memory_block(memories: &[RankedMemory]) -> String {
	let mut block = MEMORY_BLOCK_HEADER.to_string();

	for memory in memories {
		block.push_str(MEMORY_LINE_PREFIX);
		block.push_str(&memory.memory.content);
	}

	block
}

fn memory_block_chars(memory_chars: &[usize]) -> usize {
	if memory_chars.is_empty() {
		return 0;
	}

	MEMORY_BLOCK_HEADER.len()
		+ memory_chars.iter().map(|chars| MEMORY_LINE_PREFIX.len() + chars).sum::<usize>()
}

fn plan_window(
	system_chars: usize,
	memory_chars: &[usize],
	message_chars: &[usize],
	budget: usize,
) -> WindowPlan {
	let mut skip_messages = 0;
	let mut keep_memories = memory_chars.len();
	let total = |skip: usize, keep: usize| {
		system_chars
			+ memory_block_chars(&memory_chars[..keep])
			+ message_chars[skip..].iter().sum::<usize>()
	};

	while total(skip_messages, keep_memories) > budget && message_chars.len() - skip_messages > 1 {
		skip_messages += 1;
	}
	while total(skip_messages, keep_memories) > budget && keep_memories > 0 {
		keep_memories -= 1;
	}

	WindowPlan {
		skip_messages,
		keep_memories,
		dropped_memories: memory_chars.len() - keep_memories,
	}
}
