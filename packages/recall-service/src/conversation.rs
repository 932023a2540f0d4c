use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RecallService, Result};
use recall_domain::{
	conversation::{self as rules, MessageRole},
	memory,
};
use recall_storage::models::{
	AppendedMessage, ConversationPatch, ConversationRow, MessageOrder, MessageRow, NewMessage,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConversationRequest {
	pub owner_id: String,
	#[serde(default)]
	pub title: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatchConversationRequest {
	pub owner_id: String,
	pub conversation_id: Uuid,
	#[serde(default)]
	pub title: Option<String>,
	/// A blank summary clears the stored one.
	#[serde(default)]
	pub summary: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendMessageRequest {
	pub owner_id: String,
	pub conversation_id: Uuid,
	pub role: MessageRole,
	pub content: String,
	#[serde(default)]
	pub metadata: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
	pub conversation_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub summary: Option<String>,
	pub message_count: i64,
	#[serde(with = "crate::time_serde")]
	pub last_message_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl From<ConversationRow> for ConversationView {
	fn from(row: ConversationRow) -> Self {
		Self {
			conversation_id: row.conversation_id,
			owner_id: row.owner_id,
			title: row.title,
			summary: row.summary,
			message_count: row.message_count,
			last_message_at: row.last_message_at,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	pub owner_id: String,
	pub seq: i64,
	pub role: MessageRole,
	pub content: String,
	pub metadata: Option<Value>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl TryFrom<MessageRow> for MessageView {
	type Error = Error;

	fn try_from(row: MessageRow) -> Result<Self> {
		let role = row.role.parse::<MessageRole>().map_err(|err| Error::Integrity {
			message: format!("Message {} is invalid: {err}", row.message_id),
		})?;

		Ok(Self {
			message_id: row.message_id,
			conversation_id: row.conversation_id,
			owner_id: row.owner_id,
			seq: row.seq,
			role,
			content: row.content,
			metadata: row.metadata,
			created_at: row.created_at,
		})
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListConversationsResponse {
	pub items: Vec<ConversationView>,
	pub has_more: bool,
}

impl RecallService {
	pub async fn create_conversation(
		&self,
		req: CreateConversationRequest,
	) -> Result<ConversationView> {
		let owner_id = crate::require_owner(&req.owner_id)?;
		let title = req
			.title
			.as_deref()
			.map(str::trim)
			.filter(|title| !title.is_empty())
			.unwrap_or(self.cfg.conversation.default_title.as_str())
			.to_string();
		let now = OffsetDateTime::now_utc();
		let row = ConversationRow {
			conversation_id: Uuid::new_v4(),
			owner_id: owner_id.to_string(),
			title,
			summary: None,
			message_count: 0,
			message_seq: 0,
			deleted_message_count: 0,
			last_message_at: now,
			created_at: now,
			updated_at: now,
		};

		self.store_call(
			"create_conversation",
			self.deadlines().store,
			self.documents.create_conversation(&row),
		)
		.await?;

		tracing::info!(%owner_id, conversation_id = %row.conversation_id, "Conversation created.");

		Ok(row.into())
	}

	pub async fn get_conversation(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
	) -> Result<ConversationView> {
		let owner_id = crate::require_owner(owner_id)?;

		Ok(self.load_conversation(owner_id, conversation_id).await?.into())
	}

	/// Most recently active first.
	pub async fn list_conversations(
		&self,
		owner_id: &str,
		limit: Option<i64>,
	) -> Result<ListConversationsResponse> {
		let owner_id = crate::require_owner(owner_id)?;
		let limit =
			crate::resolve_limit("limit", limit, self.cfg.conversation.default_list_limit)?;
		let fetch = limit.saturating_add(1);
		let documents = self.documents.as_ref();
		let mut rows = self
			.store_read("list_conversations", self.deadlines().store, move || {
				documents.list_conversations(owner_id, fetch)
			})
			.await?;
		let has_more = rows.len() > limit as usize;

		rows.truncate(limit as usize);

		Ok(ListConversationsResponse {
			items: rows.into_iter().map(ConversationView::from).collect(),
			has_more,
		})
	}

	/// Updates title and summary. Counters are maintained by appends and deletes only.
	pub async fn patch_conversation(
		&self,
		req: PatchConversationRequest,
	) -> Result<ConversationView> {
		let owner_id = crate::require_owner(&req.owner_id)?;
		let title = match req.title.as_deref().map(str::trim) {
			Some("") =>
				return Err(Error::Validation { message: "title must be non-empty.".to_string() }),
			other => other.map(str::to_string),
		};
		let summary = req.summary.map(|summary| {
			let trimmed = summary.trim();

			(!trimmed.is_empty()).then(|| trimmed.to_string())
		});
		let patch = ConversationPatch { title, summary };
		let row = self
			.store_call(
				"patch_conversation",
				self.deadlines().store,
				self.documents.patch_conversation(
					owner_id,
					req.conversation_id,
					&patch,
					OffsetDateTime::now_utc(),
				),
			)
			.await?
			.ok_or_else(|| Error::not_found("Conversation"))?;

		Ok(row.into())
	}

	/// Deletes the conversation and its messages together. Missing conversations are ignored.
	pub async fn delete_conversation(&self, owner_id: &str, conversation_id: Uuid) -> Result<()> {
		let owner_id = crate::require_owner(owner_id)?;
		let deleted = self
			.store_call(
				"delete_conversation",
				self.deadlines().store,
				self.documents.delete_conversation(owner_id, conversation_id),
			)
			.await?;

		tracing::info!(%owner_id, %conversation_id, deleted, "Conversation delete applied.");

		Ok(())
	}

	/// Appends a message and bumps the parent's counter and activity timestamp atomically.
	pub async fn append_message(&self, req: AppendMessageRequest) -> Result<Uuid> {
		Ok(self.append_message_row(req).await?.message.message_id)
	}

	pub(crate) async fn append_message_row(
		&self,
		req: AppendMessageRequest,
	) -> Result<AppendedMessage> {
		let owner_id = crate::require_owner(&req.owner_id)?;

		if req.content.trim().is_empty() {
			return Err(Error::Validation { message: "content must be non-empty.".to_string() });
		}

		memory::metadata_gate(req.metadata.as_ref())?;

		let message = NewMessage {
			message_id: Uuid::new_v4(),
			owner_id: owner_id.to_string(),
			conversation_id: req.conversation_id,
			role: req.role.as_str().to_string(),
			content: req.content,
			metadata: req.metadata,
			now: OffsetDateTime::now_utc(),
		};
		let appended = self
			.store_call(
				"append_message",
				self.deadlines().store,
				self.documents.append_message(owner_id, &message),
			)
			.await?
			.ok_or_else(|| Error::not_found("Conversation"))?;

		tracing::debug!(
			%owner_id,
			conversation_id = %req.conversation_id,
			seq = appended.message.seq,
			message_count = appended.conversation.message_count,
			"Message appended."
		);

		Ok(appended)
	}

	/// Oldest first. A foreign or deleted conversation yields an empty list.
	pub async fn list_messages(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
		limit: Option<i64>,
	) -> Result<Vec<MessageView>> {
		let owner_id = crate::require_owner(owner_id)?;
		let limit =
			crate::resolve_limit("limit", limit, self.cfg.conversation.default_message_limit)?;

		self.read_messages(owner_id, conversation_id, limit, MessageOrder::OldestFirst).await
	}

	/// Applies the configured message delete policy. Deleting a missing message is not an error.
	pub async fn delete_message(&self, owner_id: &str, message_id: Uuid) -> Result<()> {
		let owner_id = crate::require_owner(owner_id)?;
		let policy = self.message_delete_policy();
		let deleted = self
			.store_call(
				"delete_message",
				self.deadlines().store,
				self.documents.delete_message(owner_id, message_id, policy.decrements()),
			)
			.await?;

		tracing::info!(
			%owner_id,
			%message_id,
			deleted,
			policy = policy.as_str(),
			"Message delete applied."
		);

		Ok(())
	}

	/// Checks the stored counter against the live messages under the configured policy.
	pub async fn verify_conversation_integrity(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
	) -> Result<()> {
		let owner_id = crate::require_owner(owner_id)?;
		let documents = self.documents.as_ref();
		let counters = self
			.store_read("conversation_counters", self.deadlines().store, move || {
				documents.conversation_counters(owner_id, conversation_id)
			})
			.await?
			.ok_or_else(|| Error::not_found("Conversation"))?;
		let policy = self.message_delete_policy();

		if rules::counter_consistent(
			counters.message_count,
			counters.live_messages,
			policy,
			counters.deleted_message_count,
		) {
			return Ok(());
		}

		tracing::error!(
			%owner_id,
			%conversation_id,
			message_count = counters.message_count,
			live_messages = counters.live_messages,
			deleted_messages = counters.deleted_message_count,
			policy = policy.as_str(),
			"Conversation counter is out of sync."
		);

		Err(Error::Integrity {
			message: format!(
				"Conversation {conversation_id} counts {} messages but {} are stored.",
				counters.message_count, counters.live_messages
			),
		})
	}

	pub(crate) async fn load_conversation(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
	) -> Result<ConversationRow> {
		let documents = self.documents.as_ref();

		self.store_read("get_conversation", self.deadlines().store, move || {
			documents.get_conversation(owner_id, conversation_id)
		})
		.await?
		.ok_or_else(|| Error::not_found("Conversation"))
	}

	pub(crate) async fn read_messages(
		&self,
		owner_id: &str,
		conversation_id: Uuid,
		limit: u32,
		order: MessageOrder,
	) -> Result<Vec<MessageView>> {
		let documents = self.documents.as_ref();
		let rows = self
			.store_read("list_messages", self.deadlines().store, move || {
				documents.list_messages(owner_id, conversation_id, limit, order)
			})
			.await?;

		rows.into_iter().map(MessageView::try_from).collect()
	}
}
