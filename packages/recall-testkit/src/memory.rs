//! In-process stand-ins for the document store and vector index.
//!
//! They honour the same owner scoping and ordering contracts as the Postgres and Qdrant
//! implementations, and expose failure switches so service tests can drive error paths.

use std::{
	collections::HashMap,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use time::OffsetDateTime;
use uuid::Uuid;

use recall_domain::similarity;
use recall_storage::{
	BoxFuture, DocumentStore, Error, IndexHit, Result, VectorIndex,
	models::{
		AppendedMessage, ConversationCounters, ConversationPatch, ConversationRow, MemoryRow,
		MessageOrder, MessageRow, NewMemory, NewMessage,
	},
};

#[derive(Default)]
struct DocumentState {
	next_seq: i64,
	latest_memory_at: Option<OffsetDateTime>,
	memories: Vec<MemoryRow>,
	conversations: HashMap<Uuid, ConversationRow>,
	messages: Vec<MessageRow>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
	state: Mutex<DocumentState>,
	failing_reads: AtomicUsize,
	pub reads: AtomicUsize,
}
impl InMemoryDocumentStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// The next `count` read calls fail with a store error.
	pub fn fail_next_reads(&self, count: usize) {
		self.failing_reads.store(count, Ordering::SeqCst);
	}

	/// Raw message rows for a conversation, ignoring owner scope.
	pub fn raw_messages(&self, conversation_id: Uuid) -> Vec<MessageRow> {
		self.lock().messages.iter().filter(|m| m.conversation_id == conversation_id).cloned().collect()
	}

	fn lock(&self) -> MutexGuard<'_, DocumentState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn read_gate(&self) -> Result<()> {
		self.reads.fetch_add(1, Ordering::SeqCst);

		let pending = self.failing_reads.load(Ordering::SeqCst);

		if pending > 0 {
			self.failing_reads.store(pending - 1, Ordering::SeqCst);

			return Err(Error::InvalidArgument("Injected read failure.".to_string()));
		}

		Ok(())
	}
}
impl DocumentStore for InMemoryDocumentStore {
	fn insert_memory<'a>(
		&'a self,
		memory: &'a NewMemory,
		index: &'a dyn VectorIndex,
	) -> BoxFuture<'a, Result<MemoryRow>> {
		Box::pin(async move {
			index
				.upsert(&memory.owner_id, memory.memory_id, &memory.source, &memory.embedding)
				.await?;

			let mut state = self.lock();
			let created_at =
				state.latest_memory_at.map_or(memory.now, |latest| memory.now.max(latest));

			state.next_seq += 1;
			state.latest_memory_at = Some(created_at);

			let row = MemoryRow {
				memory_id: memory.memory_id,
				seq: state.next_seq,
				owner_id: memory.owner_id.clone(),
				content: memory.content.clone(),
				embedding: memory.embedding.clone(),
				embedding_dim: memory.embedding.len() as i32,
				source: memory.source.clone(),
				metadata: memory.metadata.clone(),
				created_at,
			};

			state.memories.push(row.clone());

			Ok(row)
		})
	}

	fn get_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<Option<MemoryRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			Ok(self
				.lock()
				.memories
				.iter()
				.find(|m| m.owner_id == owner_id && m.memory_id == memory_id)
				.cloned())
		})
	}

	fn get_memories<'a>(
		&'a self,
		owner_id: &'a str,
		memory_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			Ok(self
				.lock()
				.memories
				.iter()
				.filter(|m| m.owner_id == owner_id && memory_ids.contains(&m.memory_id))
				.cloned()
				.collect())
		})
	}

	fn list_recent_memories<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			let mut rows = self
				.lock()
				.memories
				.iter()
				.filter(|m| m.owner_id == owner_id)
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
			rows.truncate(limit as usize);

			Ok(rows)
		})
	}

	fn delete_memory<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let before = state.memories.len();

			state.memories.retain(|m| !(m.owner_id == owner_id && m.memory_id == memory_id));

			Ok(state.memories.len() != before)
		})
	}

	fn scan_memories<'a>(
		&'a self,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRow>>> {
		Box::pin(async move {
			let mut rows = self
				.lock()
				.memories
				.iter()
				.filter(|m| m.seq > after_seq)
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by_key(|m| m.seq);
			rows.truncate(limit as usize);

			Ok(rows)
		})
	}

	fn create_conversation<'a>(
		&'a self,
		conversation: &'a ConversationRow,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock().conversations.insert(conversation.conversation_id, conversation.clone());

			Ok(())
		})
	}

	fn get_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			Ok(self
				.lock()
				.conversations
				.get(&conversation_id)
				.filter(|c| c.owner_id == owner_id)
				.cloned())
		})
	}

	fn list_conversations<'a>(
		&'a self,
		owner_id: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			let mut rows = self
				.lock()
				.conversations
				.values()
				.filter(|c| c.owner_id == owner_id)
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by(|a, b| {
				b.last_message_at
					.cmp(&a.last_message_at)
					.then(a.conversation_id.cmp(&b.conversation_id))
			});
			rows.truncate(limit as usize);

			Ok(rows)
		})
	}

	fn patch_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		patch: &'a ConversationPatch,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ConversationRow>>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(row) =
				state.conversations.get_mut(&conversation_id).filter(|c| c.owner_id == owner_id)
			else {
				return Ok(None);
			};

			if let Some(title) = &patch.title {
				row.title = title.clone();
			}
			if let Some(summary) = &patch.summary {
				row.summary = summary.clone();
			}

			row.updated_at = now;

			Ok(Some(row.clone()))
		})
	}

	fn delete_conversation<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let owned =
				state.conversations.get(&conversation_id).is_some_and(|c| c.owner_id == owner_id);

			if !owned {
				return Ok(false);
			}

			state.messages.retain(|m| m.conversation_id != conversation_id);
			state.conversations.remove(&conversation_id);

			Ok(true)
		})
	}

	fn append_message<'a>(
		&'a self,
		owner_id: &'a str,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<AppendedMessage>>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(conversation) = state
				.conversations
				.get_mut(&message.conversation_id)
				.filter(|c| c.owner_id == owner_id)
			else {
				return Ok(None);
			};
			let created_at = message.now.max(conversation.last_message_at);

			conversation.message_seq += 1;
			conversation.message_count += 1;
			conversation.last_message_at = created_at;
			conversation.updated_at = created_at;

			let conversation = conversation.clone();
			let row = MessageRow {
				message_id: message.message_id,
				owner_id: owner_id.to_string(),
				conversation_id: message.conversation_id,
				seq: conversation.message_seq,
				role: message.role.clone(),
				content: message.content.clone(),
				metadata: message.metadata.clone(),
				created_at,
			};

			state.messages.push(row.clone());

			Ok(Some(AppendedMessage { message: row, conversation }))
		})
	}

	fn list_messages<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
		limit: u32,
		order: MessageOrder,
	) -> BoxFuture<'a, Result<Vec<MessageRow>>> {
		Box::pin(async move {
			self.read_gate()?;

			let mut rows = self
				.lock()
				.messages
				.iter()
				.filter(|m| m.owner_id == owner_id && m.conversation_id == conversation_id)
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));

			let limit = limit as usize;

			match order {
				MessageOrder::OldestFirst => rows.truncate(limit),
				MessageOrder::LatestWindow => {
					let skip = rows.len().saturating_sub(limit);

					rows.drain(..skip);
				},
			}

			Ok(rows)
		})
	}

	fn delete_message<'a>(
		&'a self,
		owner_id: &'a str,
		message_id: Uuid,
		decrement: bool,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(position) = state
				.messages
				.iter()
				.position(|m| m.owner_id == owner_id && m.message_id == message_id)
			else {
				return Ok(false);
			};
			let removed = state.messages.remove(position);

			if let Some(conversation) = state.conversations.get_mut(&removed.conversation_id) {
				if decrement {
					conversation.message_count = (conversation.message_count - 1).max(0);
				}

				conversation.deleted_message_count += 1;
			}

			Ok(true)
		})
	}

	fn conversation_counters<'a>(
		&'a self,
		owner_id: &'a str,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationCounters>>> {
		Box::pin(async move {
			let state = self.lock();
			let Some(conversation) =
				state.conversations.get(&conversation_id).filter(|c| c.owner_id == owner_id)
			else {
				return Ok(None);
			};
			let live_messages =
				state.messages.iter().filter(|m| m.conversation_id == conversation_id).count()
					as i64;

			Ok(Some(ConversationCounters {
				message_count: conversation.message_count,
				deleted_message_count: conversation.deleted_message_count,
				live_messages,
			}))
		})
	}
}

struct IndexPoint {
	owner_id: String,
	memory_id: Uuid,
	vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
	points: Mutex<Vec<IndexPoint>>,
	fail_upserts: AtomicBool,
	failing_queries: AtomicUsize,
	pub queries: AtomicUsize,
}
impl InMemoryVectorIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_upserts(&self, fail: bool) {
		self.fail_upserts.store(fail, Ordering::SeqCst);
	}

	/// The next `count` nearest-neighbour queries fail.
	pub fn fail_next_queries(&self, count: usize) {
		self.failing_queries.store(count, Ordering::SeqCst);
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, memory_id: Uuid) -> bool {
		self.lock().iter().any(|p| p.memory_id == memory_id)
	}

	fn lock(&self) -> MutexGuard<'_, Vec<IndexPoint>> {
		self.points.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl VectorIndex for InMemoryVectorIndex {
	fn upsert<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
		_source: &'a str,
		vector: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if self.fail_upserts.load(Ordering::SeqCst) {
				return Err(Error::InvalidArgument("Injected upsert failure.".to_string()));
			}

			let mut points = self.lock();

			points.retain(|p| p.memory_id != memory_id);
			points.push(IndexPoint {
				owner_id: owner_id.to_string(),
				memory_id,
				vector: vector.to_vec(),
			});

			Ok(())
		})
	}

	fn remove<'a>(&'a self, owner_id: &'a str, memory_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock().retain(|p| !(p.owner_id == owner_id && p.memory_id == memory_id));

			Ok(())
		})
	}

	fn nearest<'a>(
		&'a self,
		owner_id: &'a str,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<IndexHit>>> {
		Box::pin(async move {
			self.queries.fetch_add(1, Ordering::SeqCst);

			let pending = self.failing_queries.load(Ordering::SeqCst);

			if pending > 0 {
				self.failing_queries.store(pending - 1, Ordering::SeqCst);

				return Err(Error::InvalidArgument("Injected query failure.".to_string()));
			}

			let mut hits = self
				.lock()
				.iter()
				.filter(|p| p.owner_id == owner_id)
				.map(|p| IndexHit {
					memory_id: p.memory_id,
					score: similarity::rank_score(&p.vector, vector),
				})
				.collect::<Vec<_>>();

			hits.sort_by(|a, b| {
				similarity::cmp_ranked((&a.memory_id, a.score), (&b.memory_id, b.score))
			});
			hits.truncate(k as usize);

			Ok(hits)
		})
	}
}
