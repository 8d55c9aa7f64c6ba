pub mod embedding;
pub mod scoring;
pub mod summarize;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName, RETRY_AFTER},
};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Posts a JSON body and classifies transport and status failures.
pub(crate) async fn post_json(
	timeout_ms: u64,
	url: &str,
	headers: HeaderMap,
	body: &Value,
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client.post(url).headers(headers).json(body).send().await.map_err(classify)?;
	let status = res.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		let retry_after = res
			.headers()
			.get(RETRY_AFTER)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.trim().parse::<u64>().ok())
			.map(Duration::from_secs);

		tracing::debug!(url, ?retry_after, "Provider rate limited the request.");

		return Err(Error::RateLimited { retry_after });
	}
	if status.is_server_error() {
		return Err(Error::Unavailable { message: format!("status {}", status.as_u16()) });
	}
	if !status.is_success() {
		return Err(Error::Rejected { status: status.as_u16() });
	}

	res.json().await.map_err(classify)
}

fn classify(err: reqwest::Error) -> Error {
	if err.is_timeout() {
		Error::Timeout
	} else if err.is_connect() {
		Error::Unavailable { message: err.to_string() }
	} else {
		Error::Reqwest(err)
	}
}

/// Extracts and parses the JSON object a chat completion returned as its message content.
pub(crate) fn chat_json_content(json: &Value) -> Result<Value> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing message content.".to_string(),
		})?;
	let trimmed = content
		.trim()
		.trim_start_matches("```json")
		.trim_start_matches("```")
		.trim_end_matches("```")
		.trim();

	serde_json::from_str(trimmed).map_err(|_| Error::InvalidResponse {
		message: "Chat content is not valid JSON.".to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_fenced_chat_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```json\n{\"score\": 80}\n```" } }
			]
		});
		let parsed = chat_json_content(&json).expect("parse failed");

		assert_eq!(parsed["score"], 80);
	}

	#[test]
	fn missing_content_is_invalid_response() {
		let err = chat_json_content(&serde_json::json!({ "choices": [] }))
			.expect_err("Expected missing content error.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}
}
