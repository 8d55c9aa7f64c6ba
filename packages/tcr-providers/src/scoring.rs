use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

const SYSTEM_PROMPT: &str = "You grade how well a software test case matches a search query. \
Reply with a JSON object {\"score\": <number 0-100>, \"rationale\": <one short sentence>}. \
100 means the test case is exactly what the query asks for; 0 means it is unrelated.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceScore {
	/// Clamped to `[0, 100]`.
	pub score: f32,
	pub rationale: Option<String>,
}

pub async fn score(
	cfg: &tcr_config::LlmProviderConfig,
	query: &str,
	candidate: &str,
) -> Result<RelevanceScore> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"response_format": { "type": "json_object" },
		"messages": [
			{ "role": "system", "content": SYSTEM_PROMPT },
			{ "role": "user", "content": format!("Query:\n{query}\n\nTest case:\n{candidate}") },
		],
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(cfg.timeout_ms, &url, headers, &body).await?;

	parse_score(&crate::chat_json_content(&json)?)
}

fn parse_score(content: &Value) -> Result<RelevanceScore> {
	let raw = match content.get("score") {
		Some(Value::Number(number)) => number.as_f64(),
		Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
		_ => None,
	};
	let Some(raw) = raw.filter(|value| value.is_finite()) else {
		return Err(Error::InvalidResponse {
			message: "Score response is missing a numeric score.".to_string(),
		});
	};
	let rationale = content
		.get("rationale")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(ToString::to_string);

	Ok(RelevanceScore { score: raw.clamp(0.0, 100.0) as f32, rationale })
}
