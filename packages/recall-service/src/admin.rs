use serde::{Deserialize, Serialize};

use crate::{RecallService, Result};
use recall_domain::memory;
use recall_storage::{db::Db, qdrant::QdrantStore};

const REBUILD_BATCH: u32 = 256;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
	pub rebuilt_count: u64,
	pub skipped_count: u64,
	pub failed_count: u64,
}

/// Creates the document tables and the vector collection when they are missing.
pub async fn bootstrap(db: &Db, qdrant: &QdrantStore) -> Result<()> {
	db.ensure_schema().await?;
	qdrant.ensure_collection().await?;

	Ok(())
}

impl RecallService {
	/// Re-upserts every stored vector from the document store into the index.
	pub async fn rebuild_index(&self) -> Result<RebuildReport> {
		let deadline = self.deadlines().store;
		let vector_dim = self.cfg.storage.qdrant.vector_dim;
		let documents = self.documents.as_ref();
		let mut report = RebuildReport::default();
		let mut after_seq = 0_i64;

		loop {
			let batch = self
				.store_read("scan_memories", deadline, move || {
					documents.scan_memories(after_seq, REBUILD_BATCH)
				})
				.await?;
			let Some(last) = batch.last() else {
				break;
			};

			after_seq = last.seq;

			for row in &batch {
				if memory::embedding_gate(&row.embedding, vector_dim).is_err() {
					tracing::warn!(
						memory_id = %row.memory_id,
						"Skipping memory with an unusable vector."
					);

					report.skipped_count += 1;

					continue;
				}

				let upsert =
					self.index.upsert(&row.owner_id, row.memory_id, &row.source, &row.embedding);

				match self.store_call("rebuild_upsert", deadline, upsert).await {
					Ok(()) => report.rebuilt_count += 1,
					Err(_) => report.failed_count += 1,
				}
			}
		}

		tracing::info!(
			rebuilt = report.rebuilt_count,
			skipped = report.skipped_count,
			failed = report.failed_count,
			"Vector index rebuild finished."
		);

		Ok(report)
	}
}
