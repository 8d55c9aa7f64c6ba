use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use tcr_api::{routes, state::AppState};
use tcr_service::RetrieverKind;
use tcr_testkit::{InMemoryStore, test_case, test_providers, test_service};

fn app_with(store: Arc<InMemoryStore>) -> (Router, AppState) {
	let state = AppState::from_service(test_service(store, test_providers()));

	(routes::router(state.clone()), state)
}

fn app() -> Router {
	let store = InMemoryStore::with_documents([
		test_case("TC-1", "Password reset via email", "Send a reset link."),
		test_case("TC-2", "Login with valid credentials", ""),
	]);

	app_with(Arc::new(store)).0
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
	let builder = Request::builder().method(method).uri(uri);
	let request = match body {
		Some(body) => builder
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.expect("Failed to build request."),
		None => builder.body(Body::empty()).expect("Failed to build request."),
	};
	let response = app.oneshot(request).await.expect("Failed to call the router.");
	let status = response.status();
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).expect("Failed to parse response.")
	};

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let (status, _) = call(app(), "GET", "/health", None).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn search_returns_results_and_metadata() {
	let (status, json) =
		call(app(), "POST", "/v1/search", Some(json!({ "query": "pwd reset", "limit": 5 }))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["results"][0]["id"], "TC-1");
	assert_eq!(json["metadata"]["method"], "hybrid");
	assert_eq!(json["metadata"]["variants"][1]["provenance"], "abbreviation-expanded");
	assert_eq!(json["metadata"]["partial"], false);
}

#[tokio::test]
async fn invalid_search_is_a_bad_request() {
	let (status, json) =
		call(app(), "POST", "/v1/search", Some(json!({ "query": "reset", "limit": 0 }))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");

	let (status, json) =
		call(app(), "POST", "/v1/search", Some(json!({ "query": "reset", "method": "fuzzy" })))
			.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn search_without_any_retriever_is_unavailable() {
	let store = Arc::new(InMemoryStore::new());

	store.fail(RetrieverKind::Keyword, true);
	store.fail(RetrieverKind::Vector, true);

	let (app, _) = app_with(store);
	let (status, json) =
		call(app, "POST", "/v1/search", Some(json!({ "query": "reset" }))).await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(json["error_code"], "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn rerank_endpoint_reports_fallback() {
	let payload = json!({
		"query": "reset",
		"candidates": [{ "id": "A", "title": "First" }, { "id": "B", "title": "Second" }]
	});
	let (status, json) = call(app(), "POST", "/v1/search/rerank", Some(payload)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["skipped"], false);
	assert_eq!(json["results"][0]["id"], "A");
	assert_eq!(json["results"][1]["fused_rank"], 1);
}

#[tokio::test]
async fn embedding_job_is_accepted_and_pollable() {
	let store = Arc::new(InMemoryStore::new());
	let (app, state) = app_with(store.clone());
	let payload = json!({
		"documents": [
			{ "id": "TC-1", "title": "Reset password", "module": "auth", "priority": 1 },
			{ "id": "TC-2", "title": "Login" }
		]
	});
	let (status, json) = call(app.clone(), "POST", "/v1/jobs/embeddings", Some(payload)).await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(json["kind"], "embedding");
	assert_eq!(json["status"], "queued");

	let id = json["id"].as_str().expect("Snapshot must carry an id.").to_string();

	state
		.service
		.jobs
		.wait_for_terminal(id.parse().expect("Job id must be a UUID."))
		.await
		.expect("Job must exist.");

	let (status, json) = call(app, "GET", &format!("/v1/jobs/{id}"), None).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["status"], "completed");
	assert_eq!(json["progress"], 100.0);
	assert_eq!(store.indexed_ids().len(), 2);
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
	let uri = format!("/v1/jobs/{}", uuid::Uuid::new_v4());
	let (status, json) = call(app(), "GET", &uri, None).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(json["error_code"], "NOT_FOUND");

	let (status, json) = call(app(), "GET", "/v1/jobs/not-a-uuid", None).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["fields"][0], "id");
}

#[tokio::test]
async fn resuming_a_completed_job_conflicts() {
	let (app, state) = app_with(Arc::new(InMemoryStore::new()));
	let payload = json!({ "documents": [{ "id": "TC-1", "title": "Reset password" }] });
	let (_, json) = call(app.clone(), "POST", "/v1/jobs/embeddings", Some(payload)).await;
	let id = json["id"].as_str().expect("Snapshot must carry an id.").to_string();

	state
		.service
		.jobs
		.wait_for_terminal(id.parse().expect("Job id must be a UUID."))
		.await
		.expect("Job must exist.");

	let (status, json) = call(app, "POST", &format!("/v1/jobs/{id}/resume"), None).await;

	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(json["error_code"], "CONFLICT");
}

#[tokio::test]
async fn empty_rerank_batch_is_rejected() {
	let (status, json) = call(app(), "POST", "/v1/jobs/rerank", Some(json!({ "items": [] }))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");
}
