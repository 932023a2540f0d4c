use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct MemoryRow {
	pub memory_id: Uuid,
	pub seq: i64,
	pub owner_id: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub embedding_dim: i32,
	pub source: String,
	pub metadata: Option<Value>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct NewMemory {
	pub memory_id: Uuid,
	pub owner_id: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub source: String,
	pub metadata: Option<Value>,
	/// Caller clock. The store stamps `created_at` as the later of this and the newest memory.
	pub now: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ConversationRow {
	pub conversation_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub summary: Option<String>,
	pub message_count: i64,
	pub message_seq: i64,
	pub deleted_message_count: i64,
	pub last_message_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Fields a caller may change on an existing conversation. `None` leaves the column alone.
#[derive(Clone, Debug, Default)]
pub struct ConversationPatch {
	pub title: Option<String>,
	pub summary: Option<Option<String>>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct MessageRow {
	pub message_id: Uuid,
	pub owner_id: String,
	pub conversation_id: Uuid,
	pub seq: i64,
	pub role: String,
	pub content: String,
	pub metadata: Option<Value>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct NewMessage {
	pub message_id: Uuid,
	pub owner_id: String,
	pub conversation_id: Uuid,
	pub role: String,
	pub content: String,
	pub metadata: Option<Value>,
	pub now: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct AppendedMessage {
	pub message: MessageRow,
	pub conversation: ConversationRow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOrder {
	OldestFirst,
	/// Newest `limit` messages, still returned oldest first.
	LatestWindow,
}

/// Counters read together so integrity checks see one snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationCounters {
	pub message_count: i64,
	pub deleted_message_count: i64,
	pub live_messages: i64,
}
