use serde_json::Value;

use crate::{Error, Result};

pub async fn summarize(
	cfg: &tcr_config::LlmProviderConfig,
	text: &str,
	max_chars: usize,
) -> Result<String> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let prompt = format!(
		"Summarize the following test case description in at most {max_chars} characters. \
Keep identifiers and expected outcomes. Reply with a JSON object {{\"summary\": <text>}}."
	);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"response_format": { "type": "json_object" },
		"messages": [
			{ "role": "system", "content": prompt },
			{ "role": "user", "content": text },
		],
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(cfg.timeout_ms, &url, headers, &body).await?;

	parse_summary(&crate::chat_json_content(&json)?)
}

fn parse_summary(content: &Value) -> Result<String> {
	content
		.get("summary")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|summary| !summary.is_empty())
		.map(ToString::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Summary response is missing summary text.".to_string(),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_blank_summary() {
		assert!(parse_summary(&serde_json::json!({ "summary": "  " })).is_err());
		assert_eq!(
			parse_summary(&serde_json::json!({ "summary": "Logs in." })).expect("parse failed"),
			"Logs in."
		);
	}
}
