use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{
		AppendedMessage, ConversationCounters, ConversationPatch, ConversationRow, MessageOrder,
		MessageRow, NewMessage,
	},
};

pub async fn insert_conversation<'e, E>(executor: E, conversation: &ConversationRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO conversations (
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
	)
	.bind(conversation.conversation_id)
	.bind(conversation.owner_id.as_str())
	.bind(conversation.title.as_str())
	.bind(conversation.summary.as_deref())
	.bind(conversation.message_count)
	.bind(conversation.message_seq)
	.bind(conversation.deleted_message_count)
	.bind(conversation.last_message_at)
	.bind(conversation.created_at)
	.bind(conversation.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_conversation<'e, E>(
	executor: E,
	owner_id: &str,
	conversation_id: Uuid,
) -> Result<Option<ConversationRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ConversationRow>(
		"\
SELECT
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at
FROM conversations
WHERE owner_id = $1 AND conversation_id = $2",
	)
	.bind(owner_id)
	.bind(conversation_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn list_conversations<'e, E>(
	executor: E,
	owner_id: &str,
	limit: u32,
) -> Result<Vec<ConversationRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, ConversationRow>(
		"\
SELECT
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at
FROM conversations
WHERE owner_id = $1
ORDER BY last_message_at DESC, conversation_id ASC
LIMIT $2",
	)
	.bind(owner_id)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn patch_conversation<'e, E>(
	executor: E,
	owner_id: &str,
	conversation_id: Uuid,
	patch: &ConversationPatch,
	now: OffsetDateTime,
) -> Result<Option<ConversationRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ConversationRow>(
		"\
UPDATE conversations
SET
	title = COALESCE($3, title),
	summary = CASE WHEN $4 THEN $5 ELSE summary END,
	updated_at = $6
WHERE owner_id = $1 AND conversation_id = $2
RETURNING
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at",
	)
	.bind(owner_id)
	.bind(conversation_id)
	.bind(patch.title.as_deref())
	.bind(patch.summary.is_some())
	.bind(patch.summary.clone().flatten())
	.bind(now)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn delete_conversation(db: &Db, owner_id: &str, conversation_id: Uuid) -> Result<bool> {
	let mut tx = db.pool.begin().await?;
	let locked: Option<Uuid> = sqlx::query_scalar(
		"\
SELECT conversation_id
FROM conversations
WHERE owner_id = $1 AND conversation_id = $2
FOR UPDATE",
	)
	.bind(owner_id)
	.bind(conversation_id)
	.fetch_optional(&mut *tx)
	.await?;

	if locked.is_none() {
		return Ok(false);
	}

	let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
		.bind(conversation_id)
		.execute(&mut *tx)
		.await?
		.rows_affected();

	sqlx::query("DELETE FROM conversations WHERE owner_id = $1 AND conversation_id = $2")
		.bind(owner_id)
		.bind(conversation_id)
		.execute(&mut *tx)
		.await?;

	let orphans: i64 =
		sqlx::query_scalar("SELECT count(*) FROM messages WHERE conversation_id = $1")
			.bind(conversation_id)
			.fetch_one(&mut *tx)
			.await?;

	if orphans > 0 {
		return Err(Error::Integrity(format!(
			"Conversation {conversation_id} still has {orphans} messages after delete."
		)));
	}

	tx.commit().await?;

	tracing::debug!(%conversation_id, messages, "Conversation deleted with its messages.");

	Ok(true)
}

pub async fn append_message(
	db: &Db,
	owner_id: &str,
	message: &NewMessage,
) -> Result<Option<AppendedMessage>> {
	let mut tx = db.pool.begin().await?;
	let Some(conversation) = sqlx::query_as::<_, ConversationRow>(
		"\
SELECT
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at
FROM conversations
WHERE owner_id = $1 AND conversation_id = $2
FOR UPDATE",
	)
	.bind(owner_id)
	.bind(message.conversation_id)
	.fetch_optional(&mut *tx)
	.await?
	else {
		return Ok(None);
	};
	// Never stamp a message earlier than the previous one, even if the clock steps back.
	let created_at = message.now.max(conversation.last_message_at);
	let seq = conversation.message_seq + 1;
	let inserted = sqlx::query_as::<_, MessageRow>(
		"\
INSERT INTO messages (
	message_id,
	owner_id,
	conversation_id,
	seq,
	role,
	content,
	metadata,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING message_id, owner_id, conversation_id, seq, role, content, metadata, created_at",
	)
	.bind(message.message_id)
	.bind(owner_id)
	.bind(message.conversation_id)
	.bind(seq)
	.bind(message.role.as_str())
	.bind(message.content.as_str())
	.bind(message.metadata.as_ref())
	.bind(created_at)
	.fetch_one(&mut *tx)
	.await?;
	let conversation = sqlx::query_as::<_, ConversationRow>(
		"\
UPDATE conversations
SET
	message_count = message_count + 1,
	message_seq = $3,
	last_message_at = $4,
	updated_at = $4
WHERE owner_id = $1 AND conversation_id = $2
RETURNING
	conversation_id,
	owner_id,
	title,
	summary,
	message_count,
	message_seq,
	deleted_message_count,
	last_message_at,
	created_at,
	updated_at",
	)
	.bind(owner_id)
	.bind(message.conversation_id)
	.bind(seq)
	.bind(created_at)
	.fetch_one(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(Some(AppendedMessage { message: inserted, conversation }))
}

pub async fn list_messages<'e, E>(
	executor: E,
	owner_id: &str,
	conversation_id: Uuid,
	limit: u32,
	order: MessageOrder,
) -> Result<Vec<MessageRow>>
where
	E: PgExecutor<'e>,
{
	let sql = match order {
		MessageOrder::OldestFirst =>
			"\
SELECT message_id, owner_id, conversation_id, seq, role, content, metadata, created_at
FROM messages
WHERE owner_id = $1 AND conversation_id = $2
ORDER BY created_at ASC, seq ASC
LIMIT $3",
		MessageOrder::LatestWindow =>
			"\
SELECT message_id, owner_id, conversation_id, seq, role, content, metadata, created_at
FROM messages
WHERE owner_id = $1 AND conversation_id = $2
ORDER BY created_at DESC, seq DESC
LIMIT $3",
	};
	let mut rows = sqlx::query_as::<_, MessageRow>(sql)
		.bind(owner_id)
		.bind(conversation_id)
		.bind(i64::from(limit))
		.fetch_all(executor)
		.await?;

	if order == MessageOrder::LatestWindow {
		rows.reverse();
	}

	Ok(rows)
}

pub async fn delete_message(
	db: &Db,
	owner_id: &str,
	message_id: Uuid,
	decrement: bool,
) -> Result<bool> {
	let mut tx = db.pool.begin().await?;
	let conversation_id: Option<Uuid> = sqlx::query_scalar(
		"DELETE FROM messages WHERE owner_id = $1 AND message_id = $2 RETURNING conversation_id",
	)
	.bind(owner_id)
	.bind(message_id)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(conversation_id) = conversation_id else {
		return Ok(false);
	};

	sqlx::query(
		"\
UPDATE conversations
SET
	message_count = GREATEST(message_count - $3, 0),
	deleted_message_count = deleted_message_count + 1,
	updated_at = $4
WHERE owner_id = $1 AND conversation_id = $2",
	)
	.bind(owner_id)
	.bind(conversation_id)
	.bind(if decrement { 1_i64 } else { 0_i64 })
	.bind(OffsetDateTime::now_utc())
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(true)
}

pub async fn conversation_counters<'e, E>(
	executor: E,
	owner_id: &str,
	conversation_id: Uuid,
) -> Result<Option<ConversationCounters>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(i64, i64, i64)> = sqlx::query_as(
		"\
SELECT
	c.message_count,
	c.deleted_message_count,
	(SELECT count(*) FROM messages m WHERE m.conversation_id = c.conversation_id) AS live_messages
FROM conversations c
WHERE c.owner_id = $1 AND c.conversation_id = $2",
	)
	.bind(owner_id)
	.bind(conversation_id)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(|(message_count, deleted_message_count, live_messages)| ConversationCounters {
		message_count,
		deleted_message_count,
		live_messages,
	}))
}
