pub mod admin;
pub mod chat;
pub mod context;
pub mod conversation;
pub mod memory;
pub mod proactive;
pub mod retrieval;
pub mod time_serde;

mod error;

pub use admin::RebuildReport;
pub use chat::{ChatRequest, ChatResponse};
pub use context::{CompletionContext, CompletionContextRequest, SummaryContext};
pub use conversation::{
	AppendMessageRequest, ConversationView, CreateConversationRequest, ListConversationsResponse,
	MessageView, PatchConversationRequest,
};
pub use error::{Error, ErrorKind, Result};
pub use memory::{CreateMemoryRequest, ImportMemoryRequest, MemoryView, ScoredMemory};
pub use proactive::{ProactiveRequest, ProactiveResponse};
pub use retrieval::{RankedMemory, RetrieveRequest};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use recall_config::{CompletionProviderConfig, Config, EmbeddingProviderConfig};
use recall_domain::conversation::MessageDeletePolicy;
use recall_providers::{completion, completion::ChatMessage, embedding};
use recall_storage::{DocumentStore, VectorIndex};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a CompletionProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub completion: Arc<dyn CompletionProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		completion: Arc<dyn CompletionProvider>,
	) -> Self {
		Self { embedding, completion }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), completion: provider }
	}
}

/// Per-call deadlines for collaborator I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadlines {
	pub embedding: Duration,
	pub store: Duration,
}
impl Deadlines {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			embedding: Duration::from_millis(cfg.providers.embedding.timeout_ms),
			store: Duration::from_millis(cfg.storage.timeout_ms),
		}
	}

	/// Applies a per-request override to both deadlines.
	pub fn with_override(self, timeout_ms: Option<u64>) -> Self {
		match timeout_ms {
			Some(ms) =>
				Self { embedding: Duration::from_millis(ms), store: Duration::from_millis(ms) },
			None => self,
		}
	}
}

pub struct RecallService {
	pub cfg: Config,
	pub documents: Arc<dyn DocumentStore>,
	pub index: Arc<dyn VectorIndex>,
	pub providers: Providers,
}
impl RecallService {
	pub fn new(cfg: Config, documents: Arc<dyn DocumentStore>, index: Arc<dyn VectorIndex>) -> Self {
		Self::with_providers(cfg, documents, index, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		documents: Arc<dyn DocumentStore>,
		index: Arc<dyn VectorIndex>,
		providers: Providers,
	) -> Self {
		Self { cfg, documents, index, providers }
	}

	pub fn message_delete_policy(&self) -> MessageDeletePolicy {
		self.cfg.conversation.message_delete_policy
	}

	pub fn deadlines(&self) -> Deadlines {
		Deadlines::from_config(&self.cfg)
	}

	/// Runs one store call under `deadline`, mapping failures into the service taxonomy.
	pub(crate) async fn store_call<T, F>(
		&self,
		op: &'static str,
		deadline: Duration,
		call: F,
	) -> Result<T>
	where
		F: Future<Output = recall_storage::Result<T>>,
	{
		match tokio::time::timeout(deadline, call).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => {
				let err = Error::from(err);

				match &err {
					Error::Integrity { message } => {
						tracing::error!(op, error = %message, "Store reported an integrity violation.")
					},
					_ => tracing::warn!(op, error = %err, "Store call failed."),
				}

				Err(err)
			},
			Err(_) => {
				tracing::warn!(op, timeout_ms = deadline.as_millis() as u64, "Store call timed out.");

				Err(Error::Store { message: format!("{op} timed out.") })
			},
		}
	}

	/// Idempotent reads get one retry on a retryable failure. Writes go through
	/// [`Self::store_call`] directly and are never retried.
	pub(crate) async fn store_read<'a, T, F>(
		&self,
		op: &'static str,
		deadline: Duration,
		call: F,
	) -> Result<T>
	where
		F: Fn() -> recall_storage::BoxFuture<'a, recall_storage::Result<T>>,
	{
		match self.store_call(op, deadline, call()).await {
			Err(err) if err.is_retryable() => {
				tracing::info!(op, "Retrying store read once.");

				self.store_call(op, deadline, call()).await
			},
			other => other,
		}
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a CompletionProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(completion::complete(cfg, messages))
	}
}

/// Validates a caller-supplied limit, applying `default` when absent.
pub(crate) fn resolve_limit(label: &str, limit: Option<i64>, default: u32) -> Result<u32> {
	match limit {
		None => Ok(default),
		Some(value) if value <= 0 =>
			Err(Error::Validation { message: format!("{label} must be greater than zero.") }),
		Some(value) => Ok(u32::try_from(value).unwrap_or(u32::MAX)),
	}
}

pub(crate) fn require_owner(owner_id: &str) -> Result<&str> {
	let trimmed = owner_id.trim();

	if trimmed.is_empty() {
		return Err(Error::from(recall_domain::memory::RejectCode::RejectEmptyOwner));
	}

	Ok(trimmed)
}
