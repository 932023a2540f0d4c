use std::{sync::atomic::Ordering, time::Duration};

use super::{
	MapEmbedding, OWNER_A, OWNER_B, RecordingCompletion, espresso_embedding, harness,
	harness_with, test_config,
};
use recall_domain::similarity;
use recall_service::{ErrorKind, RetrieveRequest};

fn request(query: &str, threshold: f32) -> RetrieveRequest {
	RetrieveRequest { threshold: Some(threshold), ..RetrieveRequest::new(OWNER_A, query) }
}

#[tokio::test]
async fn coffee_question_surfaces_only_the_espresso_memory() {
	let h = harness();
	let espresso = h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	h.remember(OWNER_A, "lives in Berlin", [0.0, 1.0, 0.0]).await;

	let ranked =
		h.service.retrieve(request("coffee preferences", 0.7)).await.expect("Failed to retrieve.");

	assert_eq!(ranked.len(), 1);
	assert_eq!(ranked[0].memory.memory_id, espresso);
	assert!(ranked[0].score >= 0.7);
}

#[tokio::test]
async fn strict_threshold_excludes_a_loosely_related_query() {
	let embedding = MapEmbedding::new(&[
		("likes espresso", [1.0, 0.0, 0.0]),
		("lives in Berlin", [0.0, 1.0, 0.0]),
		("weekend plans", [0.6, 0.8, 0.0]),
	]);
	let h = harness_with(test_config(), embedding, RecordingCompletion::replying("Noted."));

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.remember(OWNER_A, "lives in Berlin", [0.0, 1.0, 0.0]).await;

	let ranked =
		h.service.retrieve(request("weekend plans", 0.9)).await.expect("Failed to retrieve.");

	assert!(ranked.is_empty());
}

#[tokio::test]
async fn zero_threshold_keeps_the_full_top_k() {
	let h = harness();

	for (content, vector) in
		[("a", [1.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0]), ("c", [0.2, 0.2, 1.0])]
	{
		h.remember(OWNER_A, content, vector).await;
	}

	let ranked = h
		.service
		.retrieve(RetrieveRequest { limit: Some(2), ..request("coffee preferences", 0.0) })
		.await
		.expect("Failed to retrieve.");
	let scores = ranked.iter().map(|r| r.score).collect::<Vec<_>>();

	assert_eq!(ranked.len(), 2);
	assert!(similarity::is_non_increasing(&scores));
}

#[tokio::test]
async fn zero_threshold_keeps_negative_and_zero_norm_candidates() {
	let h = harness();
	let same = h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	let blank = h.remember(OWNER_A, "blank vector", [0.0, 0.0, 0.0]).await;
	let opposite = h.remember(OWNER_A, "avoids espresso", [-1.0, 0.0, 0.0]).await;
	let ranked = h
		.service
		.retrieve(RetrieveRequest { limit: Some(3), ..request("coffee preferences", 0.0) })
		.await
		.expect("Failed to retrieve.");
	let ids = ranked.iter().map(|r| r.memory.memory_id).collect::<Vec<_>>();
	let scores = ranked.iter().map(|r| r.score).collect::<Vec<_>>();

	assert_eq!(ids, [same, blank, opposite]);
	assert!(similarity::is_non_increasing(&scores));
	assert_eq!(scores[1], 0.0);
	assert!(scores[2] < 0.0);

	let positive = h
		.service
		.retrieve(RetrieveRequest { limit: Some(3), ..request("coffee preferences", 0.01) })
		.await
		.expect("Failed to retrieve.");

	assert_eq!(positive.len(), 1);
	assert_eq!(positive[0].memory.memory_id, same);
}

#[tokio::test]
async fn raising_the_threshold_only_removes_from_the_tail() {
	let h = harness();

	for (content, vector) in [
		("a", [1.0, 0.0, 0.0]),
		("b", [1.0, 1.0, 0.0]),
		("c", [0.0, 1.0, 0.0]),
		("d", [0.3, 0.3, 1.0]),
	] {
		h.remember(OWNER_A, content, vector).await;
	}

	let mut previous: Option<Vec<_>> = None;

	for threshold in [0.0, 0.2, 0.5, 0.7, 0.95] {
		let ids = h
			.service
			.retrieve(request("coffee preferences", threshold))
			.await
			.expect("Failed to retrieve.")
			.into_iter()
			.map(|r| r.memory.memory_id)
			.collect::<Vec<_>>();

		if let Some(previous) = &previous {
			assert!(ids.len() <= previous.len());
			assert_eq!(ids.as_slice(), &previous[..ids.len()]);
		}

		previous = Some(ids);
	}
}

#[tokio::test]
async fn identical_requests_rank_identically() {
	let h = harness();

	for content in ["one", "two", "three", "four"] {
		h.remember(OWNER_A, content, [1.0, 0.0, 0.0]).await;
	}

	let first = h.service.retrieve(request("coffee preferences", 0.0)).await.expect("retrieve");
	let second = h.service.retrieve(request("coffee preferences", 0.0)).await.expect("retrieve");

	assert_eq!(first, second);
}

#[tokio::test]
async fn retrieval_never_crosses_owners() {
	let h = harness();

	h.remember(OWNER_B, "likes espresso", [1.0, 0.0, 0.0]).await;

	let ranked =
		h.service.retrieve(request("coffee preferences", 0.0)).await.expect("Failed to retrieve.");

	assert!(ranked.is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_embedding() {
	let h = harness();
	let cases = [
		RetrieveRequest::new(OWNER_A, "   "),
		RetrieveRequest::new("", "coffee preferences"),
		RetrieveRequest { limit: Some(0), ..RetrieveRequest::new(OWNER_A, "coffee") },
		RetrieveRequest { limit: Some(51), ..RetrieveRequest::new(OWNER_A, "coffee") },
		request("coffee", 1.5),
		request("coffee", f32::NAN),
	];

	for req in cases {
		let err = h.service.retrieve(req).await.expect_err("Expected validation error.");

		assert_eq!(err.kind(), ErrorKind::Validation, "Unexpected error: {err}");
	}

	assert_eq!(h.embedding.count(), 0);
}

#[tokio::test]
async fn slow_embedding_fails_without_searching() {
	let h = harness_with(
		test_config(),
		espresso_embedding().with_delay(Duration::from_secs(5)),
		RecordingCompletion::replying("Noted."),
	);
	let err = h
		.service
		.retrieve(request("coffee preferences", 0.0))
		.await
		.expect_err("Expected embedding error.");

	assert_eq!(err.kind(), ErrorKind::Embedding);
	assert_eq!(h.index.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn request_timeout_overrides_the_configured_deadline() {
	let h = harness_with(
		test_config(),
		espresso_embedding().with_delay(Duration::from_millis(100)),
		RecordingCompletion::replying("Noted."),
	);

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	let ranked =
		h.service.retrieve(request("coffee preferences", 0.0)).await.expect("Failed to retrieve.");

	assert_eq!(ranked.len(), 1);

	let err = h
		.service
		.retrieve(RetrieveRequest { timeout_ms: Some(10), ..request("coffee preferences", 0.0) })
		.await
		.expect_err("Expected embedding error.");

	assert_eq!(err.kind(), ErrorKind::Embedding);
}

#[tokio::test]
async fn provider_failures_surface_as_embedding_errors() {
	for embedding in [espresso_embedding().failing(), MapEmbedding::wrong_dimension()] {
		let h = harness_with(test_config(), embedding, RecordingCompletion::replying("Noted."));
		let err = h
			.service
			.retrieve(request("coffee preferences", 0.0))
			.await
			.expect_err("Expected embedding error.");

		assert_eq!(err.kind(), ErrorKind::Embedding);
		assert!(err.is_retryable());
		assert_eq!(h.index.queries.load(Ordering::SeqCst), 0);
	}
}

#[tokio::test]
async fn one_failed_index_read_is_retried() {
	let h = harness();

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.index.fail_next_queries(1);

	let ranked =
		h.service.retrieve(request("coffee preferences", 0.0)).await.expect("Retry must succeed.");

	assert_eq!(ranked.len(), 1);
	assert_eq!(h.index.queries.load(Ordering::SeqCst), 2);

	h.index.fail_next_queries(2);

	let err = h
		.service
		.retrieve(request("coffee preferences", 0.0))
		.await
		.expect_err("Expected store error.");

	assert_eq!(err.kind(), ErrorKind::Store);
	assert_eq!(h.index.queries.load(Ordering::SeqCst), 4);
	assert_eq!(err.public_message(), "The storage service is unavailable.");
}

#[tokio::test]
async fn empty_store_returns_no_memories() {
	let h = harness();
	let ranked =
		h.service.retrieve(request("coffee preferences", 0.0)).await.expect("Failed to retrieve.");

	assert!(ranked.is_empty());
}
