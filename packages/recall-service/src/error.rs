use serde::{Deserialize, Serialize};

use recall_domain::memory::RejectCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Validation failed: {message}")]
	Validation { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Embedding error: {message}")]
	Embedding { message: String },
	#[error("Storage error: {message}")]
	Store { message: String },
	#[error("Integrity violation: {message}")]
	Integrity { message: String },
	#[error("Completion error: {message}")]
	Completion { message: String },
}
impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Validation { .. } => ErrorKind::Validation,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Embedding { .. } => ErrorKind::Embedding,
			Self::Store { .. } => ErrorKind::Store,
			Self::Integrity { .. } => ErrorKind::Integrity,
			Self::Completion { .. } => ErrorKind::Completion,
		}
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self.kind(), ErrorKind::Embedding | ErrorKind::Store | ErrorKind::Completion)
	}

	/// Caller-facing text. Collaborator details stay in `Display` and the logs.
	pub fn public_message(&self) -> String {
		match self {
			Self::Validation { message } => message.clone(),
			Self::NotFound { .. } => "The requested record was not found.".to_string(),
			Self::Embedding { .. } => "The embedding service is unavailable.".to_string(),
			Self::Store { .. } => "The storage service is unavailable.".to_string(),
			Self::Integrity { .. } => "An internal consistency check failed.".to_string(),
			Self::Completion { .. } => "The completion service is unavailable.".to_string(),
		}
	}

	pub(crate) fn not_found(what: &str) -> Self {
		Self::NotFound { message: format!("{what} not found.") }
	}
}
impl From<RejectCode> for Error {
	fn from(code: RejectCode) -> Self {
		Self::Validation { message: format!("{}: {}", code.as_str(), code.describe()) }
	}
}
impl From<recall_storage::Error> for Error {
	fn from(err: recall_storage::Error) -> Self {
		match err {
			recall_storage::Error::NotFound(message) => Self::NotFound { message },
			recall_storage::Error::Integrity(message) => Self::Integrity { message },
			other => Self::Store { message: other.to_string() },
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	Validation,
	NotFound,
	Embedding,
	Store,
	Integrity,
	Completion,
}
impl ErrorKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Validation => "validation",
			Self::NotFound => "not_found",
			Self::Embedding => "embedding",
			Self::Store => "store",
			Self::Integrity => "integrity",
			Self::Completion => "completion",
		}
	}
}
