use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	AppendMessageRequest, CompletionContextRequest, Error, ImportMemoryRequest, RecallService,
	Result,
};
use recall_domain::{conversation::MessageRole, memory::MemorySource, text};
use recall_providers::completion::ChatMessage;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
	pub owner_id: String,
	pub conversation_id: Uuid,
	pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
	pub user_message_id: Uuid,
	pub assistant_message_id: Uuid,
	pub reply: String,
	pub memories_used: usize,
	pub captured_memory_id: Option<Uuid>,
}

impl RecallService {
	/// One chat turn: record the user message, build the context window, ask the completion
	/// provider, and record its reply.
	pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
		let owner_id = crate::require_owner(&req.owner_id)?.to_string();
		let user = self
			.append_message_row(AppendMessageRequest {
				owner_id: owner_id.clone(),
				conversation_id: req.conversation_id,
				role: MessageRole::User,
				content: req.message.clone(),
				metadata: None,
			})
			.await?;
		let context = self
			.assemble_completion_request(CompletionContextRequest {
				owner_id: owner_id.clone(),
				conversation_id: req.conversation_id,
				query: Some(req.message.clone()),
				max_messages: None,
				memory_limit: None,
				threshold: None,
			})
			.await?;
		let reply = self.complete(&context.messages).await?;
		let assistant = self
			.append_message_row(AppendMessageRequest {
				owner_id: owner_id.clone(),
				conversation_id: req.conversation_id,
				role: MessageRole::Assistant,
				content: reply.clone(),
				metadata: None,
			})
			.await?;
		let captured_memory_id = if self.cfg.chat.capture_memories {
			self.capture_exchange(&owner_id, req.conversation_id, &req.message, &reply).await
		} else {
			None
		};

		tracing::info!(
			%owner_id,
			conversation_id = %req.conversation_id,
			memories_used = context.memories.len(),
			"Chat turn completed."
		);

		Ok(ChatResponse {
			user_message_id: user.message.message_id,
			assistant_message_id: assistant.message.message_id,
			reply,
			memories_used: context.memories.len(),
			captured_memory_id,
		})
	}

	async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
		let cfg = &self.cfg.providers.completion;
		let call = self.providers.completion.complete(cfg, messages);

		match tokio::time::timeout(Duration::from_millis(cfg.timeout_ms), call).await {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Completion provider failed.");

				Err(Error::Completion { message: err.to_string() })
			},
			Err(_) => {
				tracing::warn!(timeout_ms = cfg.timeout_ms, "Completion provider timed out.");

				Err(Error::Completion { message: "Completion request timed out.".to_string() })
			},
		}
	}

	/// Stores the exchange as a conversation memory. Failures are logged and skipped.
	async fn capture_exchange(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
		message: &str,
		reply: &str,
	) -> Option<Uuid> {
		let content = text::truncate_chars(
			&format!("User: {message}\nAssistant: {reply}"),
			self.cfg.memory.max_content_chars as usize,
		);
		let result = self
			.import_memory(ImportMemoryRequest {
				owner_id: owner_id.to_string(),
				content,
				source: Some(MemorySource::Conversation),
				metadata: Some(serde_json::json!({ "conversation_id": conversation_id })),
			})
			.await;

		match result {
			Ok(memory_id) => Some(memory_id),
			Err(err) => {
				tracing::warn!(%owner_id, %conversation_id, error = %err, "Memory capture skipped.");

				None
			},
		}
	}
}
