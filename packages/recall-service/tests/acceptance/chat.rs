use super::{OWNER_A, RecordingCompletion, espresso_embedding, harness, harness_with, test_config};
use recall_domain::{conversation::MessageRole, memory::MemorySource};
use recall_service::{ChatRequest, ErrorKind};

#[tokio::test]
async fn chat_turn_records_both_sides_and_uses_memories() {
	let h = harness();
	let conversation_id = h.conversation(OWNER_A, None).await;

	h.remember(OWNER_A, "likes espresso", [1.0, 0.0, 0.0]).await;

	let response = h
		.service
		.chat(ChatRequest {
			owner_id: OWNER_A.to_string(),
			conversation_id,
			message: "coffee preferences".to_string(),
		})
		.await
		.expect("Failed to chat.");

	assert_eq!(response.reply, "Noted.");
	assert_eq!(response.memories_used, 1);
	assert_eq!(response.captured_memory_id, None);

	let sent = h.completion.last_request();

	assert_eq!(sent[0].role, "system");
	assert_eq!(sent[1].content, "Relevant memories:\n- likes espresso");
	assert_eq!(sent.last().map(|m| m.content.as_str()), Some("coffee preferences"));

	let messages = h
		.service
		.list_messages(OWNER_A, conversation_id, None)
		.await
		.expect("Failed to list messages.");

	assert_eq!(messages.len(), 2);
	assert_eq!(messages[0].message_id, response.user_message_id);
	assert_eq!(messages[1].message_id, response.assistant_message_id);
	assert_eq!(messages[1].role, MessageRole::Assistant);
	assert_eq!(messages[1].content, "Noted.");
}

#[tokio::test]
async fn chat_can_capture_the_exchange_as_a_memory() {
	let mut cfg = test_config();

	cfg.chat.capture_memories = true;

	let h = harness_with(cfg, espresso_embedding(), RecordingCompletion::replying("Noted."));
	let conversation_id = h.conversation(OWNER_A, None).await;
	let response = h
		.service
		.chat(ChatRequest {
			owner_id: OWNER_A.to_string(),
			conversation_id,
			message: "I switched to oat milk".to_string(),
		})
		.await
		.expect("Failed to chat.");
	let memory_id = response.captured_memory_id.expect("Expected a captured memory.");
	let memory = h.service.get_memory(OWNER_A, memory_id).await.expect("Failed to get memory.");

	assert_eq!(memory.source, MemorySource::Conversation);
	assert_eq!(memory.content, "User: I switched to oat milk\nAssistant: Noted.");
	assert_eq!(
		memory.metadata,
		Some(serde_json::json!({ "conversation_id": conversation_id.to_string() }))
	);
}

#[tokio::test]
async fn completion_failure_keeps_the_user_message() {
	let h = harness_with(test_config(), espresso_embedding(), RecordingCompletion::failing());
	let conversation_id = h.conversation(OWNER_A, None).await;
	let err = h
		.service
		.chat(ChatRequest {
			owner_id: OWNER_A.to_string(),
			conversation_id,
			message: "hello".to_string(),
		})
		.await
		.expect_err("Expected completion error.");

	assert_eq!(err.kind(), ErrorKind::Completion);

	let view = h.service.get_conversation(OWNER_A, conversation_id).await.expect("Failed to get.");

	assert_eq!(view.message_count, 1);
}
