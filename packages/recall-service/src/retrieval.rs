use serde::{Deserialize, Serialize};

use crate::{Deadlines, Error, MemoryView, RecallService, Result};
use recall_domain::similarity;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
	pub owner_id: String,
	pub query: String,
	#[serde(default)]
	pub limit: Option<i64>,
	#[serde(default)]
	pub threshold: Option<f32>,
	/// Overrides both the embedding and store deadlines for this request.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}
impl RetrieveRequest {
	pub fn new(owner_id: impl Into<String>, query: impl Into<String>) -> Self {
		Self {
			owner_id: owner_id.into(),
			query: query.into(),
			limit: None,
			threshold: None,
			timeout_ms: None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedMemory {
	pub memory: MemoryView,
	pub score: f32,
}

impl RecallService {
	/// Embeds the query, searches the caller's memories, and keeps hits scoring at or above the
	/// threshold in the order the index returned them.
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<Vec<RankedMemory>> {
		let owner_id = crate::require_owner(&req.owner_id)?;
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::Validation { message: "query must be non-empty.".to_string() });
		}

		let limit = crate::resolve_limit("limit", req.limit, self.cfg.retrieval.default_limit)?;

		if limit > self.cfg.retrieval.max_limit {
			return Err(Error::Validation {
				message: format!("limit must be at most {}.", self.cfg.retrieval.max_limit),
			});
		}

		let threshold = req.threshold.unwrap_or(self.cfg.retrieval.default_threshold);

		if !similarity::threshold_valid(threshold) {
			return Err(Error::Validation {
				message: "threshold must be a finite number in the range 0.0-1.0.".to_string(),
			});
		}

		let deadlines = self.deadlines().with_override(req.timeout_ms);

		self.retrieve_validated(owner_id, query, limit, threshold, deadlines).await
	}

	pub(crate) async fn retrieve_validated(
		&self,
		owner_id: &str,
		query: &str,
		limit: u32,
		threshold: f32,
		deadlines: Deadlines,
	) -> Result<Vec<RankedMemory>> {
		let query_vector = self.embed_text(query, deadlines).await?;
		let candidates =
			self.similarity_search_with(owner_id, &query_vector, limit, deadlines).await?;
		let candidate_count = candidates.len();
		let ranked = similarity::retain_above_threshold(candidates, threshold, |c| c.score)
			.into_iter()
			.map(|c| RankedMemory { memory: c.memory, score: c.score })
			.collect::<Vec<_>>();

		tracing::debug!(
			%owner_id,
			limit,
			threshold,
			candidates = candidate_count,
			kept = ranked.len(),
			"Retrieval finished."
		);

		Ok(ranked)
	}
}
