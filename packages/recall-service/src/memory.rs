use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Deadlines, Error, RecallService, Result};
use recall_domain::memory::{self, MemoryInput, MemorySource};
use recall_storage::models::{MemoryRow, NewMemory};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateMemoryRequest {
	pub owner_id: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub source: MemorySource,
	#[serde(default)]
	pub metadata: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportMemoryRequest {
	pub owner_id: String,
	pub content: String,
	#[serde(default)]
	pub source: Option<MemorySource>,
	#[serde(default)]
	pub metadata: Option<Value>,
}

/// A stored memory as returned to callers. The vector stays inside the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
	pub memory_id: Uuid,
	pub owner_id: String,
	pub content: String,
	pub source: MemorySource,
	pub metadata: Option<Value>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl TryFrom<MemoryRow> for MemoryView {
	type Error = Error;

	fn try_from(row: MemoryRow) -> Result<Self> {
		let source = row.source.parse::<MemorySource>().map_err(|_| Error::Integrity {
			message: format!("Memory {} has unknown source {:?}.", row.memory_id, row.source),
		})?;

		Ok(Self {
			memory_id: row.memory_id,
			owner_id: row.owner_id,
			content: row.content,
			source,
			metadata: row.metadata,
			created_at: row.created_at,
		})
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
	pub memory: MemoryView,
	pub score: f32,
}

impl RecallService {
	pub async fn create_memory(&self, req: CreateMemoryRequest) -> Result<Uuid> {
		let owner_id = crate::require_owner(&req.owner_id)?;

		memory::memory_gate(
			&MemoryInput {
				owner_id,
				content: &req.content,
				embedding: &req.embedding,
				metadata: req.metadata.as_ref(),
			},
			self.cfg.storage.qdrant.vector_dim,
			self.cfg.memory.max_content_chars,
		)?;

		let new_memory = NewMemory {
			memory_id: Uuid::new_v4(),
			owner_id: owner_id.to_string(),
			content: req.content,
			embedding: req.embedding,
			source: req.source.as_str().to_string(),
			metadata: req.metadata,
			now: OffsetDateTime::now_utc(),
		};
		let row = self
			.store_call(
				"insert_memory",
				self.deadlines().store,
				self.documents.insert_memory(&new_memory, self.index.as_ref()),
			)
			.await?;

		tracing::info!(
			owner_id = %row.owner_id,
			memory_id = %row.memory_id,
			source = %row.source,
			"Memory created."
		);

		Ok(row.memory_id)
	}

	/// Embeds `content` and stores it, defaulting the source to `import`.
	pub async fn import_memory(&self, req: ImportMemoryRequest) -> Result<Uuid> {
		let owner_id = crate::require_owner(&req.owner_id)?;

		memory::content_gate(&req.content, self.cfg.memory.max_content_chars)?;
		memory::metadata_gate(req.metadata.as_ref())?;

		let embedding = self.embed_text(&req.content, self.deadlines()).await?;

		self.create_memory(CreateMemoryRequest {
			owner_id: owner_id.to_string(),
			content: req.content,
			embedding,
			source: req.source.unwrap_or(MemorySource::Import),
			metadata: req.metadata,
		})
		.await
	}

	pub async fn get_memory(&self, owner_id: &str, memory_id: Uuid) -> Result<MemoryView> {
		let owner_id = crate::require_owner(owner_id)?;
		let documents = self.documents.as_ref();
		let row = self
			.store_read("get_memory", self.deadlines().store, move || {
				documents.get_memory(owner_id, memory_id)
			})
			.await?
			.ok_or_else(|| Error::not_found("Memory"))?;

		MemoryView::try_from(row)
	}

	/// Newest first. `limit` defaults to `memory.default_list_limit` and is capped at
	/// `memory.max_list_limit`.
	pub async fn list_recent_memories(
		&self,
		owner_id: &str,
		limit: Option<i64>,
	) -> Result<Vec<MemoryView>> {
		let owner_id = crate::require_owner(owner_id)?;
		let limit = crate::resolve_limit("limit", limit, self.cfg.memory.default_list_limit)?
			.min(self.cfg.memory.max_list_limit);
		let documents = self.documents.as_ref();
		let rows = self
			.store_read("list_recent_memories", self.deadlines().store, move || {
				documents.list_recent_memories(owner_id, limit)
			})
			.await?;

		rows.into_iter().map(MemoryView::try_from).collect()
	}

	/// Removes the record and its vector. Deleting a missing memory is not an error.
	pub async fn delete_memory(&self, owner_id: &str, memory_id: Uuid) -> Result<()> {
		let owner_id = crate::require_owner(owner_id)?;
		let deadline = self.deadlines().store;
		let deleted = self
			.store_call("delete_memory", deadline, self.documents.delete_memory(owner_id, memory_id))
			.await?;

		self.store_call("remove_vector", deadline, self.index.remove(owner_id, memory_id)).await?;

		tracing::info!(%owner_id, %memory_id, deleted, "Memory delete applied.");

		Ok(())
	}

	/// Owner-filtered nearest neighbours, highest score first. Hits whose record disappeared
	/// between the index and document lookups are dropped without reordering the rest.
	pub async fn similarity_search(
		&self,
		owner_id: &str,
		query_vector: &[f32],
		k: u32,
	) -> Result<Vec<ScoredMemory>> {
		self.similarity_search_with(owner_id, query_vector, k, self.deadlines()).await
	}

	pub(crate) async fn similarity_search_with(
		&self,
		owner_id: &str,
		query_vector: &[f32],
		k: u32,
		deadlines: Deadlines,
	) -> Result<Vec<ScoredMemory>> {
		let owner_id = crate::require_owner(owner_id)?;

		memory::embedding_gate(query_vector, self.cfg.storage.qdrant.vector_dim)?;

		if k == 0 {
			return Ok(Vec::new());
		}

		let index = self.index.as_ref();
		let hits = self
			.store_read("nearest", deadlines.store, move || index.nearest(owner_id, query_vector, k))
			.await?;

		if hits.is_empty() {
			return Ok(Vec::new());
		}

		let ids = hits.iter().map(|hit| hit.memory_id).collect::<Vec<_>>();
		let documents = self.documents.as_ref();
		let ids_ref = ids.as_slice();
		let rows = self
			.store_read("get_memories", deadlines.store, move || {
				documents.get_memories(owner_id, ids_ref)
			})
			.await?;
		let mut by_id = rows.into_iter().map(|row| (row.memory_id, row)).collect::<HashMap<_, _>>();
		let mut out = Vec::with_capacity(hits.len());

		for hit in hits {
			let Some(row) = by_id.remove(&hit.memory_id) else {
				tracing::debug!(%owner_id, memory_id = %hit.memory_id, "Dropping vector hit without a record.");

				continue;
			};

			out.push(ScoredMemory { memory: MemoryView::try_from(row)?, score: hit.score });
		}

		Ok(out)
	}

	/// Embeds one text under the embedding deadline and checks the returned vector.
	pub(crate) async fn embed_text(&self, text: &str, deadlines: Deadlines) -> Result<Vec<f32>> {
		let texts = [text.to_string()];
		let call = self.providers.embedding.embed(&self.cfg.providers.embedding, &texts);
		let vectors = match tokio::time::timeout(deadlines.embedding, call).await {
			Ok(Ok(vectors)) => vectors,
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Embedding provider failed.");

				return Err(Error::Embedding { message: err.to_string() });
			},
			Err(_) => {
				tracing::warn!(
					timeout_ms = deadlines.embedding.as_millis() as u64,
					"Embedding provider timed out."
				);

				return Err(Error::Embedding { message: "Embedding request timed out.".to_string() });
			},
		};
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Embedding {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		memory::embedding_gate(&vector, self.cfg.storage.qdrant.vector_dim).map_err(|code| {
			Error::Embedding { message: format!("Embedding provider returned an invalid vector: {code}") }
		})?;

		Ok(vector)
	}
}
