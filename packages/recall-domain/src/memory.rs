use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provenance of a memory. Always supplied by the caller, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
	Import,
	Conversation,
	Proactive,
	Tool,
}
impl MemorySource {
	pub const ALL: [Self; 4] = [Self::Import, Self::Conversation, Self::Proactive, Self::Tool];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Import => "import",
			Self::Conversation => "conversation",
			Self::Proactive => "proactive",
			Self::Tool => "tool",
		}
	}
}
impl fmt::Display for MemorySource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for MemorySource {
	type Err = RejectCode;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|source| source.as_str() == raw.trim())
			.ok_or(RejectCode::RejectUnknownSource)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
	RejectEmptyOwner,
	RejectEmpty,
	RejectTooLong,
	RejectDimensionMismatch,
	RejectNonFiniteVector,
	RejectMetadataNotObject,
	RejectUnknownSource,
}
impl RejectCode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RejectEmptyOwner => "REJECT_EMPTY_OWNER",
			Self::RejectEmpty => "REJECT_EMPTY",
			Self::RejectTooLong => "REJECT_TOO_LONG",
			Self::RejectDimensionMismatch => "REJECT_DIMENSION_MISMATCH",
			Self::RejectNonFiniteVector => "REJECT_NON_FINITE_VECTOR",
			Self::RejectMetadataNotObject => "REJECT_METADATA_NOT_OBJECT",
			Self::RejectUnknownSource => "REJECT_UNKNOWN_SOURCE",
		}
	}

	pub fn describe(self) -> &'static str {
		match self {
			Self::RejectEmptyOwner => "owner_id is required.",
			Self::RejectEmpty => "content must be non-empty.",
			Self::RejectTooLong => "content exceeds the maximum length.",
			Self::RejectDimensionMismatch => "embedding dimension does not match the index.",
			Self::RejectNonFiniteVector => "embedding contains non-finite values.",
			Self::RejectMetadataNotObject => "metadata must be a JSON object.",
			Self::RejectUnknownSource => "source must be one of import, conversation, proactive, or tool.",
		}
	}
}
impl fmt::Display for RejectCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.describe())
	}
}

pub struct MemoryInput<'a> {
	pub owner_id: &'a str,
	pub content: &'a str,
	pub embedding: &'a [f32],
	pub metadata: Option<&'a Value>,
}

/// Checks a memory before any I/O happens.
pub fn memory_gate(
	input: &MemoryInput<'_>,
	vector_dim: u32,
	max_content_chars: u32,
) -> Result<(), RejectCode> {
	owner_gate(input.owner_id)?;
	content_gate(input.content, max_content_chars)?;
	embedding_gate(input.embedding, vector_dim)?;
	metadata_gate(input.metadata)?;

	Ok(())
}

pub fn owner_gate(owner_id: &str) -> Result<(), RejectCode> {
	if owner_id.trim().is_empty() {
		return Err(RejectCode::RejectEmptyOwner);
	}

	Ok(())
}

pub fn content_gate(content: &str, max_content_chars: u32) -> Result<(), RejectCode> {
	if content.trim().is_empty() {
		return Err(RejectCode::RejectEmpty);
	}
	if content.chars().count() as u64 > max_content_chars as u64 {
		return Err(RejectCode::RejectTooLong);
	}

	Ok(())
}

pub fn embedding_gate(embedding: &[f32], vector_dim: u32) -> Result<(), RejectCode> {
	if embedding.len() != vector_dim as usize {
		return Err(RejectCode::RejectDimensionMismatch);
	}
	if embedding.iter().any(|value| !value.is_finite()) {
		return Err(RejectCode::RejectNonFiniteVector);
	}

	Ok(())
}

pub fn metadata_gate(metadata: Option<&Value>) -> Result<(), RejectCode> {
	match metadata {
		None | Some(Value::Object(_)) => Ok(()),
		Some(_) => Err(RejectCode::RejectMetadataNotObject),
	}
}
