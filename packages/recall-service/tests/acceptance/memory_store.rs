use serde_json::json;

use super::{OWNER_A, OWNER_B, harness};
use recall_domain::memory::MemorySource;
use recall_service::{CreateMemoryRequest, Error, ErrorKind, ImportMemoryRequest};
use recall_storage::DocumentStore;

fn request(owner_id: &str, content: &str, embedding: Vec<f32>) -> CreateMemoryRequest {
	CreateMemoryRequest {
		owner_id: owner_id.to_string(),
		content: content.to_string(),
		embedding,
		source: MemorySource::Tool,
		metadata: Some(json!({ "origin": "notes" })),
	}
}

#[tokio::test]
async fn created_memory_reads_back_with_its_provenance() {
	let h = harness();
	let memory_id = h
		.service
		.create_memory(request(OWNER_A, "likes espresso", vec![1.0, 0.0, 0.0]))
		.await
		.expect("Failed to create memory.");
	let view = h.service.get_memory(OWNER_A, memory_id).await.expect("Failed to get memory.");

	assert_eq!(view.owner_id, OWNER_A);
	assert_eq!(view.content, "likes espresso");
	assert_eq!(view.source, MemorySource::Tool);
	assert_eq!(view.metadata, Some(json!({ "origin": "notes" })));
	assert!(h.index.contains(memory_id));
}

#[tokio::test]
async fn rejected_memories_never_reach_storage() {
	let h = harness();
	let cases = [
		request(OWNER_A, "likes espresso", vec![1.0, 0.0]),
		request(OWNER_A, "   ", vec![1.0, 0.0, 0.0]),
		request("  ", "likes espresso", vec![1.0, 0.0, 0.0]),
		request(OWNER_A, "likes espresso", vec![1.0, f32::NAN, 0.0]),
		CreateMemoryRequest {
			metadata: Some(json!(["not", "an", "object"])),
			..request(OWNER_A, "likes espresso", vec![1.0, 0.0, 0.0])
		},
	];

	for req in cases {
		let err = h.service.create_memory(req).await.expect_err("Expected validation error.");

		assert_eq!(err.kind(), ErrorKind::Validation, "Unexpected error: {err}");
	}

	assert!(h.index.is_empty());
	assert!(
		h.service.list_recent_memories(OWNER_A, None).await.expect("Failed to list.").is_empty()
	);
}

#[tokio::test]
async fn dimension_mismatch_reports_its_code() {
	let h = harness();
	let err = h
		.service
		.create_memory(request(OWNER_A, "likes espresso", vec![1.0; 4]))
		.await
		.expect_err("Expected validation error.");

	match err {
		Error::Validation { message } =>
			assert!(message.starts_with("REJECT_DIMENSION_MISMATCH"), "Unexpected message: {message}"),
		other => panic!("Unexpected error: {other}"),
	}
}

#[tokio::test]
async fn failed_index_write_leaves_no_record() {
	let h = harness();

	h.index.fail_upserts(true);

	let err = h
		.service
		.create_memory(request(OWNER_A, "likes espresso", vec![1.0, 0.0, 0.0]))
		.await
		.expect_err("Expected store error.");

	assert_eq!(err.kind(), ErrorKind::Store);
	assert!(
		h.service.list_recent_memories(OWNER_A, None).await.expect("Failed to list.").is_empty()
	);

	h.index.fail_upserts(false);
	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	assert_eq!(h.index.len(), 1);
}

#[tokio::test]
async fn memories_are_invisible_to_other_owners() {
	let h = harness();
	let a_id = h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	let b_id = h.remember(OWNER_B, "likes tea", [1.0, 0.0, 0.0]).await;
	let err = h.service.get_memory(OWNER_B, a_id).await.expect_err("Expected not found.");

	assert_eq!(err.kind(), ErrorKind::NotFound);

	let hits = h
		.service
		.similarity_search(OWNER_A, &[1.0, 0.0, 0.0], 10)
		.await
		.expect("Failed to search.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].memory.memory_id, a_id);
	assert!(hits.iter().all(|hit| hit.memory.memory_id != b_id));

	// A foreign delete is a no-op.
	h.service.delete_memory(OWNER_B, a_id).await.expect("Failed to delete.");

	assert!(h.service.get_memory(OWNER_A, a_id).await.is_ok());
}

#[tokio::test]
async fn delete_is_idempotent_and_clears_the_vector() {
	let h = harness();
	let memory_id = h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	h.service.delete_memory(OWNER_A, memory_id).await.expect("Failed to delete.");
	h.service.delete_memory(OWNER_A, memory_id).await.expect("Second delete must succeed.");

	assert!(!h.index.contains(memory_id));
	assert_eq!(
		h.service.get_memory(OWNER_A, memory_id).await.expect_err("Expected not found.").kind(),
		ErrorKind::NotFound
	);
}

#[tokio::test]
async fn recent_memories_list_newest_first_within_limits() {
	let h = harness();
	let mut ids = Vec::new();

	for content in ["first", "second", "third"] {
		ids.push(h.remember(OWNER_A, content, [1.0, 0.0, 0.0]).await);
	}

	let listed = h.service.list_recent_memories(OWNER_A, Some(2)).await.expect("Failed to list.");

	assert_eq!(
		listed.iter().map(|m| m.memory_id).collect::<Vec<_>>(),
		vec![ids[2], ids[1]]
	);

	for limit in [0, -3] {
		let err = h
			.service
			.list_recent_memories(OWNER_A, Some(limit))
			.await
			.expect_err("Expected validation error.");

		assert_eq!(err.kind(), ErrorKind::Validation);
	}

	let capped =
		h.service.list_recent_memories(OWNER_A, Some(10_000)).await.expect("Failed to list.");

	assert_eq!(capped.len(), 3);
}

#[tokio::test]
async fn search_skips_hits_whose_record_vanished() {
	let h = harness();
	let near = h.remember(OWNER_A, "near", [1.0, 0.0, 0.0]).await;
	let middle = h.remember(OWNER_A, "middle", [1.0, 1.0, 0.0]).await;
	let far = h.remember(OWNER_A, "far", [1.0, 1.0, 1.0]).await;

	// Remove the document only, leaving a stale vector behind.
	assert!(h.documents.delete_memory(OWNER_A, middle).await.expect("Failed to delete."));

	let hits = h
		.service
		.similarity_search(OWNER_A, &[1.0, 0.0, 0.0], 3)
		.await
		.expect("Failed to search.");

	assert_eq!(hits.iter().map(|hit| hit.memory.memory_id).collect::<Vec<_>>(), vec![near, far]);
	assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn search_rejects_malformed_query_vectors() {
	let h = harness();
	let err = h
		.service
		.similarity_search(OWNER_A, &[1.0, 0.0], 3)
		.await
		.expect_err("Expected validation error.");

	assert_eq!(err.kind(), ErrorKind::Validation);
	assert_eq!(h.index.queries.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn import_embeds_and_defaults_to_import_source() {
	let h = harness();
	let memory_id = h
		.service
		.import_memory(ImportMemoryRequest {
			owner_id: OWNER_A.to_string(),
			content: "likes espresso".to_string(),
			source: None,
			metadata: None,
		})
		.await
		.expect("Failed to import memory.");
	let view = h.service.get_memory(OWNER_A, memory_id).await.expect("Failed to get memory.");

	assert_eq!(view.source, MemorySource::Import);
	assert_eq!(h.embedding.count(), 1);
}
