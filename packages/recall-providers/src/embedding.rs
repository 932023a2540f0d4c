use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	#[serde(default)]
	index: Option<usize>,
	embedding: Vec<f32>,
}

pub async fn embed(
	cfg: &recall_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = crate::endpoint(&cfg.api_base, &cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_embedding_response(json, texts.len(), cfg.dimensions as usize)
}

/// Returns one vector per input in input order, each exactly `dimensions` long.
fn parse_embedding_response(
	json: Value,
	expected: usize,
	dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse = serde_json::from_value(json)
		.map_err(|err| eyre::eyre!("Embedding response is malformed: {err}."))?;

	if response.data.len() != expected {
		return Err(eyre::eyre!(
			"Embedding response returned {} vectors for {expected} inputs.",
			response.data.len()
		));
	}

	let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];

	for (position, item) in response.data.into_iter().enumerate() {
		let index = item.index.unwrap_or(position);

		if item.embedding.len() != dimensions {
			return Err(eyre::eyre!(
				"Embedding {index} has {} dimensions, expected {dimensions}.",
				item.embedding.len()
			));
		}

		let Some(slot) = slots.get_mut(index) else {
			return Err(eyre::eyre!("Embedding index {index} is out of range."));
		};

		if slot.is_some() {
			return Err(eyre::eyre!("Embedding index {index} is duplicated."));
		}

		*slot = Some(item.embedding);
	}

	slots
		.into_iter()
		.collect::<Option<Vec<_>>>()
		.ok_or_else(|| eyre::eyre!("Embedding response is missing an index."))
}
