use std::time::Duration;

use axum::{
	Json, Router,
	http::{StatusCode, header},
	routing::post,
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use tcr_config::{EmbeddingProviderConfig, LlmProviderConfig};
use tcr_providers::{Error, embedding, scoring};

async fn spawn_server(router: Router) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener.");
	let addr = listener.local_addr().expect("Failed to read listener address.");

	tokio::spawn(async move {
		let _ = axum::serve(listener, router).await;
	});

	format!("http://{addr}")
}

fn embedding_config(api_base: String) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: "secret".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "m".to_string(),
		dimensions: 2,
		timeout_ms: 2_000,
		default_headers: Map::new(),
	}
}

fn scoring_config(api_base: String) -> LlmProviderConfig {
	LlmProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: "secret".to_string(),
		path: "/v1/chat/completions".to_string(),
		model: "m".to_string(),
		temperature: 0.0,
		timeout_ms: 2_000,
		default_headers: Map::new(),
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		tcr_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("x-team".to_string(), Value::from(7));

	let err = tcr_providers::auth_headers("secret", &defaults)
		.expect_err("Expected non-string header to be rejected.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn rate_limit_reports_retry_after() {
	let router = Router::new().route(
		"/v1/embeddings",
		post(|| async { (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "2")], "slow down") }),
	);
	let base = spawn_server(router).await;
	let err = embedding::embed(&embedding_config(base), &["login".to_string()])
		.await
		.expect_err("Expected rate limit error.");

	assert!(
		matches!(err, Error::RateLimited { retry_after: Some(delay) } if delay == Duration::from_secs(2)),
		"Unexpected error: {err:?}"
	);
	assert!(err.is_transient());
}

#[tokio::test]
async fn server_errors_are_unavailable() {
	let router = Router::new()
		.route("/v1/embeddings", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));
	let base = spawn_server(router).await;
	let err = embedding::embed(&embedding_config(base), &["login".to_string()])
		.await
		.expect_err("Expected unavailable error.");

	assert!(matches!(err, Error::Unavailable { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn vector_count_must_match_inputs() {
	let router = Router::new().route(
		"/v1/embeddings",
		post(|| async { Json(serde_json::json!({ "data": [{ "index": 0, "embedding": [0.1, 0.2] }] })) }),
	);
	let base = spawn_server(router).await;
	let err = embedding::embed(&embedding_config(base), &["a".to_string(), "b".to_string()])
		.await
		.expect_err("Expected count mismatch.");

	assert!(matches!(err, Error::InvalidResponse { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn scores_candidate_through_chat_completion() {
	let router = Router::new().route(
		"/v1/chat/completions",
		post(|Json(body): Json<Value>| async move {
			let user = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
			let score = if user.contains("password") { 91 } else { 5 };

			Json(serde_json::json!({
				"choices": [{
					"message": {
						"content": format!("{{\"score\": {score}, \"rationale\": \"Checked.\"}}")
					}
				}]
			}))
		}),
	);
	let base = spawn_server(router).await;
	let scored = scoring::score(&scoring_config(base), "password reset", "Reset a password")
		.await
		.expect("Expected score.");

	assert_eq!(scored.score, 91.0);
	assert_eq!(scored.rationale.as_deref(), Some("Checked."));
}
