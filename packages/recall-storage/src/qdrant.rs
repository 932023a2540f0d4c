use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
		Distance, FieldType, Filter, PointId, PointStruct, Query, QueryPointsBuilder, ScoredPoint,
		UpsertPointsBuilder, Value, VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use uuid::Uuid;

use crate::{
	Result,
	store::{BoxFuture, IndexHit, VectorIndex},
};

pub const OWNER_FIELD: &str = "owner_id";
pub const MEMORY_FIELD: &str = "memory_id";
pub const SOURCE_FIELD: &str = "source";

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &recall_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection and the owner payload index when they are missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		let existing = self.client.list_collections().await?;
		let exists = existing.collections.iter().any(|c| c.name == self.collection);

		if !exists {
			self.client
				.create_collection(
					CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
						VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
					),
				)
				.await?;

			tracing::info!(collection = %self.collection, "Vector collection created.");
		}

		let payload_schema = self
			.client
			.collection_info(&self.collection)
			.await?
			.result
			.map(|info| info.payload_schema)
			.unwrap_or_default();

		if !payload_schema.contains_key(OWNER_FIELD) {
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(
						self.collection.clone(),
						OWNER_FIELD,
						FieldType::Keyword,
					)
					.wait(true),
				)
				.await?;

			tracing::info!(collection = %self.collection, "Owner payload index created.");
		}

		Ok(())
	}

	async fn upsert_point(
		&self,
		owner_id: &str,
		memory_id: Uuid,
		source: &str,
		vector: &[f32],
	) -> Result<()> {
		let mut payload = Payload::new();

		payload.insert(OWNER_FIELD, owner_id.to_string());
		payload.insert(MEMORY_FIELD, memory_id.to_string());
		payload.insert(SOURCE_FIELD, source.to_string());

		let point = PointStruct::new(memory_id.to_string(), vector.to_vec(), payload);

		self.client
			.upsert_points(
				UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true),
			)
			.await?;

		Ok(())
	}

	async fn remove_point(&self, owner_id: &str, memory_id: Uuid) -> Result<()> {
		let filter = Filter::must([
			Condition::matches(OWNER_FIELD, owner_id.to_string()),
			Condition::matches(MEMORY_FIELD, memory_id.to_string()),
		]);

		self.client
			.delete_points(
				DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true),
			)
			.await?;

		Ok(())
	}

	async fn query_nearest(&self, owner_id: &str, vector: &[f32], k: u32) -> Result<Vec<IndexHit>> {
		let filter = Filter::must([Condition::matches(OWNER_FIELD, owner_id.to_string())]);
		let response = self
			.client
			.query(
				QueryPointsBuilder::new(self.collection.clone())
					.query(Query::new_nearest(vector.to_vec()))
					.filter(filter)
					.limit(u64::from(k))
					.with_payload(true),
			)
			.await?;

		Ok(response.result.iter().filter_map(|point| scored_hit(point, owner_id)).collect())
	}
}
impl VectorIndex for QdrantStore {
	fn upsert<'a>(
		&'a self,
		owner_id: &'a str,
		memory_id: Uuid,
		source: &'a str,
		vector: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.upsert_point(owner_id, memory_id, source, vector))
	}

	fn remove<'a>(&'a self, owner_id: &'a str, memory_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.remove_point(owner_id, memory_id))
	}

	fn nearest<'a>(
		&'a self,
		owner_id: &'a str,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<IndexHit>>> {
		Box::pin(self.query_nearest(owner_id, vector, k))
	}
}

fn scored_hit(point: &ScoredPoint, owner_id: &str) -> Option<IndexHit> {
	if payload_string(&point.payload, OWNER_FIELD) != Some(owner_id) {
		tracing::warn!(owner_id, "Dropping vector hit with a foreign or missing owner.");

		return None;
	}

	let memory_id = point
		.id
		.as_ref()
		.and_then(point_id_to_uuid)
		.or_else(|| payload_string(&point.payload, MEMORY_FIELD).and_then(|raw| raw.parse().ok()))?;

	Some(IndexHit { memory_id, score: point.score })
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_string<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::StringValue(text)) => Some(text.as_str()),
		_ => None,
	}
}
