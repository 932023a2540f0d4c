use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
	Result,
	models::{MemoryRow, NewMemory},
};

const MEMORY_CLOCK_LOCK_ID: i64 = 7_310_553;

/// Serializes memory inserts so `seq` order and `created_at` order agree.
pub async fn lock_memory_clock<'e, E>(executor: E) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("SELECT pg_advisory_xact_lock($1)")
		.bind(MEMORY_CLOCK_LOCK_ID)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn insert_memory<'e, E>(executor: E, memory: &NewMemory) -> Result<MemoryRow>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, MemoryRow>(
		"\
INSERT INTO memories (
	memory_id,
	owner_id,
	content,
	embedding,
	embedding_dim,
	source,
	metadata,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, GREATEST($8, (SELECT max(created_at) FROM memories)))
RETURNING
	memory_id,
	seq,
	owner_id,
	content,
	embedding,
	embedding_dim,
	source,
	metadata,
	created_at",
	)
	.bind(memory.memory_id)
	.bind(memory.owner_id.as_str())
	.bind(memory.content.as_str())
	.bind(memory.embedding.as_slice())
	.bind(memory.embedding.len() as i32)
	.bind(memory.source.as_str())
	.bind(memory.metadata.as_ref())
	.bind(memory.now)
	.fetch_one(executor)
	.await?;

	Ok(row)
}

pub async fn get_memory<'e, E>(
	executor: E,
	owner_id: &str,
	memory_id: Uuid,
) -> Result<Option<MemoryRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, MemoryRow>(
		"\
SELECT memory_id, seq, owner_id, content, embedding, embedding_dim, source, metadata, created_at
FROM memories
WHERE owner_id = $1 AND memory_id = $2",
	)
	.bind(owner_id)
	.bind(memory_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn get_memories<'e, E>(
	executor: E,
	owner_id: &str,
	memory_ids: &[Uuid],
) -> Result<Vec<MemoryRow>>
where
	E: PgExecutor<'e>,
{
	if memory_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, MemoryRow>(
		"\
SELECT memory_id, seq, owner_id, content, embedding, embedding_dim, source, metadata, created_at
FROM memories
WHERE owner_id = $1 AND memory_id = ANY($2)",
	)
	.bind(owner_id)
	.bind(memory_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_recent_memories<'e, E>(
	executor: E,
	owner_id: &str,
	limit: u32,
) -> Result<Vec<MemoryRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MemoryRow>(
		"\
SELECT memory_id, seq, owner_id, content, embedding, embedding_dim, source, metadata, created_at
FROM memories
WHERE owner_id = $1
ORDER BY created_at DESC, seq DESC
LIMIT $2",
	)
	.bind(owner_id)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn delete_memory<'e, E>(executor: E, owner_id: &str, memory_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM memories WHERE owner_id = $1 AND memory_id = $2")
		.bind(owner_id)
		.bind(memory_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn scan_memories<'e, E>(executor: E, after_seq: i64, limit: u32) -> Result<Vec<MemoryRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MemoryRow>(
		"\
SELECT memory_id, seq, owner_id, content, embedding, embedding_dim, source, metadata, created_at
FROM memories
WHERE seq > $1
ORDER BY seq ASC
LIMIT $2",
	)
	.bind(after_seq)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
