use uuid::Uuid;

use super::{
	OWNER_A, OWNER_B, RecordingCompletion, espresso_embedding, harness, harness_with, test_config,
};
use recall_domain::conversation::MessageRole;
use recall_service::{CompletionContextRequest, ErrorKind, PatchConversationRequest};

fn completion_request(conversation_id: Uuid) -> CompletionContextRequest {
	CompletionContextRequest {
		owner_id: OWNER_A.to_string(),
		conversation_id,
		query: Some("coffee preferences".to_string()),
		max_messages: None,
		memory_limit: None,
		threshold: Some(0.7),
	}
}

#[tokio::test]
async fn chat_context_is_the_latest_window_oldest_first() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.say(OWNER_A, conversation_id, MessageRole::User, "Hi").await;
	h.say(OWNER_A, conversation_id, MessageRole::Assistant, "Hello").await;
	h.say(OWNER_A, conversation_id, MessageRole::User, "Bye").await;

	let window = h
		.service
		.assemble_chat_context(OWNER_A, conversation_id, 2)
		.await
		.expect("Failed to assemble context.");

	assert_eq!(window.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["Hello", "Bye"]);
	assert_eq!(window[0].role, MessageRole::Assistant);

	let conversation =
		h.service.get_conversation(OWNER_A, conversation_id).await.expect("Failed to get.");

	assert_eq!(conversation.message_count, 3);
	assert_eq!(conversation.last_message_at, window[1].created_at);
}

#[tokio::test]
async fn chat_context_validates_its_inputs() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, None).await;
	let err = h
		.service
		.assemble_chat_context(OWNER_A, conversation_id, 0)
		.await
		.expect_err("Expected validation error.");

	assert_eq!(err.kind(), ErrorKind::Validation);

	let err = h
		.service
		.assemble_chat_context(OWNER_B, conversation_id, 5)
		.await
		.expect_err("Expected not found.");

	assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn summary_context_prefers_summary_over_title() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, Some("Trip planning")).await;

	for n in 1..=6 {
		h.say(OWNER_A, conversation_id, MessageRole::User, &format!("message {n}")).await;
	}

	let summary = h
		.service
		.assemble_conversation_summary_context(OWNER_A, conversation_id)
		.await
		.expect("Failed to assemble summary.");

	assert_eq!(summary.context, "Trip planning");
	assert_eq!(
		summary.supporting_memories,
		["message 2", "message 3", "message 4", "message 5", "message 6"]
	);

	h.service
		.patch_conversation(PatchConversationRequest {
			owner_id: OWNER_A.to_string(),
			conversation_id,
			title: None,
			summary: Some("Booking a week in Lisbon".to_string()),
		})
		.await
		.expect("Failed to patch.");

	let summary = h
		.service
		.assemble_conversation_summary_context(OWNER_A, conversation_id)
		.await
		.expect("Failed to assemble summary.");

	assert_eq!(summary.context, "Booking a week in Lisbon");
	assert_eq!(summary.conversation_id, conversation_id);
}

#[tokio::test]
async fn completion_request_separates_memories_from_history() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.remember(OWNER_A, "lives in Berlin", [0.0, 1.0, 0.0]).await;
	h.say(OWNER_A, conversation_id, MessageRole::User, "What should I order?").await;

	let context = h
		.service
		.assemble_completion_request(completion_request(conversation_id))
		.await
		.expect("Failed to assemble completion request.");
	let roles = context.messages.iter().map(|m| m.role.as_str()).collect::<Vec<_>>();

	assert_eq!(roles, ["system", "system", "user"]);
	assert_eq!(context.messages[1].content, "Relevant memories:\n- likes espresso");
	assert_eq!(context.messages[2].content, "What should I order?");
	assert_eq!(context.memories.len(), 1);
	assert_eq!(context.dropped_messages, 0);
}

#[tokio::test]
async fn completion_request_trims_history_then_memories() {
	let mut cfg = test_config();

	cfg.context.system_prompt = "sys".to_string();
	// sys 3 + memory block 35 + three 20-char messages = 98.
	cfg.context.max_context_chars = 80;

	let h = harness_with(cfg.clone(), espresso_embedding(), RecordingCompletion::replying("ok"));
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	for content in ["a".repeat(20), "b".repeat(20), "c".repeat(20)] {
		h.say(OWNER_A, conversation_id, MessageRole::User, &content).await;
	}

	let context = h
		.service
		.assemble_completion_request(completion_request(conversation_id))
		.await
		.expect("Failed to assemble completion request.");

	assert_eq!(context.dropped_messages, 1);
	assert_eq!(context.dropped_memories, 0);
	assert_eq!(context.history.len(), 2);
	assert_eq!(context.history[0].content, "b".repeat(20));

	cfg.context.max_context_chars = 40;

	let h2 = harness_with(cfg, espresso_embedding(), RecordingCompletion::replying("ok"));
	let conversation_id = h2.conversation(OWNER_A, None).await;

	h2.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	for content in ["a".repeat(20), "b".repeat(20), "c".repeat(20)] {
		h2.say(OWNER_A, conversation_id, MessageRole::User, &content).await;
	}

	let context = h2
		.service
		.assemble_completion_request(completion_request(conversation_id))
		.await
		.expect("Failed to assemble completion request.");

	assert_eq!(context.dropped_messages, 2);
	assert_eq!(context.dropped_memories, 1);
	assert!(context.memories.is_empty());
	assert_eq!(context.messages.len(), 2);
	assert_eq!(context.messages[1].content, "c".repeat(20));
}

#[tokio::test]
async fn completion_request_degrades_when_memory_lookup_fails() {
	let h = harness_with(
		test_config(),
		espresso_embedding().failing(),
		RecordingCompletion::replying("ok"),
	);
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.say(OWNER_A, conversation_id, MessageRole::User, "What should I order?").await;

	let context = h
		.service
		.assemble_completion_request(completion_request(conversation_id))
		.await
		.expect("Lookup failure must not fail assembly.");

	assert!(context.memories.is_empty());
	assert_eq!(context.messages.len(), 2);
}

#[tokio::test]
async fn completion_request_defaults_query_to_latest_user_message() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;
	h.say(OWNER_A, conversation_id, MessageRole::User, "coffee preferences").await;
	h.say(OWNER_A, conversation_id, MessageRole::Assistant, "Tell me more.").await;

	let context = h
		.service
		.assemble_completion_request(CompletionContextRequest {
			query: None,
			..completion_request(conversation_id)
		})
		.await
		.expect("Failed to assemble completion request.");

	assert_eq!(context.memories.len(), 1);
	assert_eq!(context.memories[0].memory.content, "likes espresso");
}
