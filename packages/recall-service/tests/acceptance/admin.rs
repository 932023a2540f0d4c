use std::sync::Arc;

use super::{OWNER_A, OWNER_B, RecordingCompletion, espresso_embedding, harness};
use recall_service::{Providers, RebuildReport, RecallService};
use recall_testkit::InMemoryVectorIndex;

#[tokio::test]
async fn rebuild_restores_a_lost_index() {
	let h = harness();
	let a = h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	let b = h.remember(OWNER_B, "likes tea", [1.0, 0.0, 0.0]).await;
	let fresh = Arc::new(InMemoryVectorIndex::new());
	let rebuilt = RecallService::with_providers(
		h.service.cfg.clone(),
		h.documents.clone(),
		fresh.clone(),
		Providers::new(
			Arc::new(espresso_embedding()),
			Arc::new(RecordingCompletion::replying("ok")),
		),
	);
	let report = rebuilt.rebuild_index().await.expect("Failed to rebuild index.");

	assert_eq!(report, RebuildReport { rebuilt_count: 2, skipped_count: 0, failed_count: 0 });
	assert!(fresh.contains(a) && fresh.contains(b));

	let hits = rebuilt
		.similarity_search(OWNER_A, &[1.0, 0.0, 0.0], 5)
		.await
		.expect("Failed to search.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].memory.memory_id, a);
}

#[tokio::test]
async fn rebuild_counts_failed_upserts() {
	let h = harness();

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.index.fail_upserts(true);

	let report = h.service.rebuild_index().await.expect("Failed to rebuild index.");

	assert_eq!(report.rebuilt_count, 0);
	assert_eq!(report.failed_count, 1);
}
