mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chat, CompletionProviderConfig, Config, Context, Conversation, EmbeddingProviderConfig,
	Memory, MessageDeletePolicy, Postgres, Proactive, Providers, Qdrant, Retrieval, Service,
	Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, timeout_ms) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("completion", cfg.providers.completion.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("completion", &cfg.providers.completion.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if !cfg.providers.completion.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.completion.temperature must be a finite number.".to_string(),
		});
	}
	if cfg.memory.max_content_chars == 0 {
		return Err(Error::Validation {
			message: "memory.max_content_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.memory.default_list_limit == 0
		|| cfg.memory.default_list_limit > cfg.memory.max_list_limit
	{
		return Err(Error::Validation {
			message: "memory.default_list_limit must be in the range 1-memory.max_list_limit."
				.to_string(),
		});
	}
	if cfg.retrieval.default_limit == 0 || cfg.retrieval.default_limit > cfg.retrieval.max_limit {
		return Err(Error::Validation {
			message: "retrieval.default_limit must be in the range 1-retrieval.max_limit."
				.to_string(),
		});
	}

	for (label, threshold) in [
		("retrieval.default_threshold", cfg.retrieval.default_threshold),
		("proactive.threshold", cfg.proactive.threshold),
	] {
		if !threshold.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number."),
			});
		}
		if !(0.0..=1.0).contains(&threshold) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if cfg.proactive.limit == 0 || cfg.proactive.limit > cfg.retrieval.max_limit {
		return Err(Error::Validation {
			message: "proactive.limit must be in the range 1-retrieval.max_limit.".to_string(),
		});
	}
	if cfg.context.max_messages == 0 {
		return Err(Error::Validation {
			message: "context.max_messages must be greater than zero.".to_string(),
		});
	}
	if cfg.context.max_context_chars == 0 {
		return Err(Error::Validation {
			message: "context.max_context_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.context.memory_limit > cfg.retrieval.max_limit {
		return Err(Error::Validation {
			message: "context.memory_limit must not exceed retrieval.max_limit.".to_string(),
		});
	}
	if cfg.conversation.default_title.trim().is_empty() {
		return Err(Error::Validation {
			message: "conversation.default_title must be non-empty.".to_string(),
		});
	}
	if cfg.conversation.default_list_limit == 0 || cfg.conversation.default_message_limit == 0 {
		return Err(Error::Validation {
			message: "conversation list limits must be greater than zero.".to_string(),
		});
	}
	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
