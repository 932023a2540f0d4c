use std::sync::Arc;

use super::{OWNER_A, OWNER_B, RecordingCompletion, espresso_embedding, test_config};
use recall_domain::conversation::MessageRole;
use recall_service::{
	AppendMessageRequest, CreateConversationRequest, ImportMemoryRequest, Providers,
	RecallService, RetrieveRequest,
};
use recall_storage::{db::Db, qdrant::QdrantStore};
use recall_testkit::TestDatabase;

async fn live_service(test_db: &TestDatabase, qdrant_url: String) -> (RecallService, Arc<Db>) {
	let mut cfg = test_config();

	cfg.storage.postgres.dsn = test_db.dsn().to_string();
	cfg.storage.qdrant.url = qdrant_url;
	cfg.storage.qdrant.collection = test_db.collection_name("recall_acceptance");

	let db = Arc::new(Db::connect(&cfg.storage.postgres).await.expect("Failed to connect."));
	let qdrant = Arc::new(QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant."));

	recall_service::admin::bootstrap(&db, &qdrant).await.expect("Failed to bootstrap.");

	let providers = Providers::new(
		Arc::new(espresso_embedding()),
		Arc::new(RecordingCompletion::replying("Noted.")),
	);

	(RecallService::with_providers(cfg, db.clone(), qdrant, providers), db)
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set RECALL_PG_DSN and RECALL_QDRANT_URL to run."]
async fn retrieval_round_trips_through_postgres_and_qdrant() {
	let Some(base_dsn) = recall_testkit::env_dsn() else {
		eprintln!("Skipping retrieval_round_trips_through_postgres_and_qdrant; set RECALL_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = recall_testkit::env_qdrant_url() else {
		eprintln!(
			"Skipping retrieval_round_trips_through_postgres_and_qdrant; set RECALL_QDRANT_URL."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let (service, db) = live_service(&test_db, qdrant_url).await;

	for (owner_id, content) in
		[(OWNER_A, "likes espresso"), (OWNER_A, "lives in Berlin"), (OWNER_B, "likes espresso")]
	{
		service
			.import_memory(ImportMemoryRequest {
				owner_id: owner_id.to_string(),
				content: content.to_string(),
				source: None,
				metadata: None,
			})
			.await
			.expect("Failed to import memory.");
	}

	let ranked = service
		.retrieve(RetrieveRequest {
			threshold: Some(0.7),
			..RetrieveRequest::new(OWNER_A, "coffee preferences")
		})
		.await
		.expect("Failed to retrieve.");

	assert_eq!(ranked.len(), 1);
	assert_eq!(ranked[0].memory.content, "likes espresso");
	assert_eq!(ranked[0].memory.owner_id, OWNER_A);

	let report = service.rebuild_index().await.expect("Failed to rebuild index.");

	assert_eq!(report.rebuilt_count, 3);

	db.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set RECALL_PG_DSN and RECALL_QDRANT_URL to run."]
async fn conversation_log_survives_on_postgres() {
	let Some(base_dsn) = recall_testkit::env_dsn() else {
		eprintln!("Skipping conversation_log_survives_on_postgres; set RECALL_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = recall_testkit::env_qdrant_url() else {
		eprintln!("Skipping conversation_log_survives_on_postgres; set RECALL_QDRANT_URL.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let (service, db) = live_service(&test_db, qdrant_url).await;
	let conversation = service
		.create_conversation(CreateConversationRequest {
			owner_id: OWNER_A.to_string(),
			title: None,
		})
		.await
		.expect("Failed to create conversation.");

	for (role, content) in
		[(MessageRole::User, "Hi"), (MessageRole::Assistant, "Hello"), (MessageRole::User, "Bye")]
	{
		service
			.append_message(AppendMessageRequest {
				owner_id: OWNER_A.to_string(),
				conversation_id: conversation.conversation_id,
				role,
				content: content.to_string(),
				metadata: None,
			})
			.await
			.expect("Failed to append message.");
	}

	let window = service
		.assemble_chat_context(OWNER_A, conversation.conversation_id, 2)
		.await
		.expect("Failed to assemble context.");

	assert_eq!(window.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["Hello", "Bye"]);

	service
		.verify_conversation_integrity(OWNER_A, conversation.conversation_id)
		.await
		.expect("Counter must verify.");
	service
		.delete_conversation(OWNER_A, conversation.conversation_id)
		.await
		.expect("Failed to delete conversation.");

	let orphans: i64 = sqlx::query_scalar("SELECT count(*) FROM messages WHERE conversation_id = $1")
		.bind(conversation.conversation_id)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to count messages.");

	assert_eq!(orphans, 0);

	db.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}
