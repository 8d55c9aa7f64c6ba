use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// Vectors in input order plus the token usage the provider reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
	pub vectors: Vec<Vec<f32>>,
	pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub total_tokens: u64,
}

pub async fn embed(
	cfg: &tcr_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<EmbeddingBatch> {
	if texts.is_empty() {
		return Ok(EmbeddingBatch::default());
	}

	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(cfg.timeout_ms, &url, headers, &body).await?;
	let batch = parse_embedding_response(json)?;

	if batch.vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {} inputs.",
				batch.vectors.len(),
				texts.len()
			),
		});
	}

	Ok(batch)
}

fn parse_embedding_response(json: Value) -> Result<EmbeddingBatch> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	let usage = json.get("usage");
	let read = |key: &str| usage.and_then(|u| u.get(key)).and_then(|v| v.as_u64()).unwrap_or(0);
	let prompt_tokens = read("prompt_tokens");
	let total_tokens = read("total_tokens").max(prompt_tokens);

	Ok(EmbeddingBatch {
		vectors: indexed.into_iter().map(|(_, vec)| vec).collect(),
		usage: Usage { prompt_tokens, total_tokens },
	})
}
