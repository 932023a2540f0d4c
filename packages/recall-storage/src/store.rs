use std::{future::Future, pin::Pin};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result, conversations,
	db::Db,
	memories,
	models::{
		AppendedMessage, ConversationCounters, ConversationPatch, ConversationRow, MemoryRow,
		MessageOrder, MessageRow, NewMemory, NewMessage,
	},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug, PartialEq)]
pub struct IndexHit {
	pub memory_id: Uuid,
	pub score: f32,
}

/// Nearest-neighbour search over memory vectors.
///
/// Every method takes `owner_id` first and must apply it inside the index query, before any
/// candidate is selected.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
		source: &'a str,
		vector: &'a [f32],
	) -> BoxFuture<'a, Result<()>>;

	fn remove<'a>(&'a self, owner_id: &'a str, memory_id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Up to `k` hits, highest cosine score first.
	fn nearest<'a>(
		&'a self,
		owner_id: &'a str,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<IndexHit>>>;
}

/// Owner-scoped persistence for memories, conversations and messages.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	/// Inserts the row and writes its vector to `index` as one unit. When the index write fails
	/// the row is not kept.
	fn insert_memory<'a>(
		&'a self,
		memory: &'a NewMemory,
		index: &'a dyn VectorIndex,
	) -> BoxFuture<'a, Result<MemoryRow>>;

	fn get_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<Option<MemoryRow>>>;

	/// Rows for the ids that still exist, in no particular order.
	fn get_memories<'a>(
		&'a self,
		owner_id: &'a str,
		memory_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>>;

	fn list_recent_memories<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>>;

	fn delete_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<bool>>;

	/// Admin scan across all owners, ordered by insertion sequence.
	fn scan_memories<'a>(
		&'a self,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>>;

	fn create_conversation<'a>(
		&'a self,
		conversation: &'a ConversationRow,
	) -> BoxFuture<'a, Result<()>>;

	fn get_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>>;

	fn list_conversations<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationRow>>>;

	fn patch_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		patch: &'a ConversationPatch,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>>;

	/// Removes the conversation and all of its messages together.
	fn delete_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<bool>>;

	/// Returns `None` when the conversation does not exist for this owner.
	fn append_message<'a>(
		&'a self,
		owner_id: &'a str,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<AppendedMessage>>>;

	fn list_messages<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		limit: u32,
		order: MessageOrder,
	) -> BoxFuture<'a, Result<Vec<MessageRow>>>;

	fn delete_message<'a>(
		&'a self,
		owner_id: &'a str,
		message_id: Uuid,
		decrement: bool,
	) -> BoxFuture<'a, Result<bool>>;

	fn conversation_counters<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationCounters>>>;
}

impl DocumentStore for Db {
	fn insert_memory<'a>(
		&'a self,
		memory: &'a NewMemory,
		index: &'a dyn VectorIndex,
	) -> BoxFuture<'a, Result<MemoryRow>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			memories::lock_memory_clock(&mut *tx).await?;

			let row = memories::insert_memory(&mut *tx, memory).await?;

			// Dropping `tx` on the error path rolls the insert back.
			index
				.upsert(
					memory.owner_id.as_str(),
					memory.memory_id,
					memory.source.as_str(),
					memory.embedding.as_slice(),
				)
				.await?;

			tx.commit().await?;

			Ok(row)
		})
	}

	fn get_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<Option<MemoryRow>>> {
		Box::pin(memories::get_memory(&self.pool, owner_id, memory_id))
	}

	fn get_memories<'a>(
		&'a self,
		owner_id: &'a str,
		memory_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(memories::get_memories(&self.pool, owner_id, memory_ids))
	}

	fn list_recent_memories<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(memories::list_recent_memories(&self.pool, owner_id, limit))
	}

	fn delete_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(memories::delete_memory(&self.pool, owner_id, memory_id))
	}

	fn scan_memories<'a>(
		&'a self,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(memories::scan_memories(&self.pool, after_seq, limit))
	}

	fn create_conversation<'a>(
		&'a self,
		conversation: &'a ConversationRow,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(conversations::insert_conversation(&self.pool, conversation))
	}

	fn get_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>> {
		Box::pin(conversations::get_conversation(&self.pool, owner_id, conversation_id))
	}

	fn list_conversations<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationRow>>> {
		Box::pin(conversations::list_conversations(&self.pool, owner_id, limit))
	}

	fn patch_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		patch: &'a ConversationPatch,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>> {
		Box::pin(conversations::patch_conversation(
			&self.pool,
			owner_id,
			conversation_id,
			patch,
			now,
		))
	}

	fn delete_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(conversations::delete_conversation(self, owner_id, conversation_id))
	}

	fn append_message<'a>(
		&'a self,
		owner_id: &'a str,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<AppendedMessage>>> {
		Box::pin(conversations::append_message(self, owner_id, message))
	}

	fn list_messages<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		limit: u32,
		order: MessageOrder,
	) -> BoxFuture<'a, Result<Vec<MessageRow>>> {
		Box::pin(conversations::list_messages(&self.pool, owner_id, conversation_id, limit, order))
	}

	fn delete_message<'a>(
		&'a self,
		owner_id: &'a str,
		message_id: Uuid,
		decrement: bool,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(conversations::delete_message(self, owner_id, message_id, decrement))
	}

	fn conversation_counters<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationCounters>>> {
		Box::pin(conversations::conversation_counters(&self.pool, owner_id, conversation_id))
	}
}
