use axum::{
	Json, Router,
	extract::{
		Path, State,
		rejection::{JsonRejection, PathRejection},
	},
	http::{HeaderValue, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use tcr_service::{
	Error as ServiceError, JobSnapshot, RerankCandidate, RerankItem, RerankOutcome, SearchRequest,
	SearchResponse,
};
use tcr_storage::models::TestCaseDocument;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/search/rerank", post(rerank))
		.route("/v1/jobs/embeddings", post(submit_embeddings))
		.route("/v1/jobs/rerank", post(submit_rerank))
		.route("/v1/jobs/{id}", get(job))
		.route("/v1/jobs/{id}/resume", post(resume_job))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct RerankRequest {
	pub query: String,
	pub candidates: Vec<RerankCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingJobRequest {
	pub documents: Vec<TestCaseDocument>,
}

#[derive(Debug, Deserialize)]
pub struct RerankJobRequest {
	pub items: Vec<RerankItem>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn rerank(
	State(state): State<AppState>,
	payload: Result<Json<RerankRequest>, JsonRejection>,
) -> Result<Json<RerankOutcome<RerankCandidate>>, ApiError> {
	let Json(payload) = payload?;
	let outcome = state.service.rerank_candidates(&payload.query, payload.candidates).await?;

	Ok(Json(outcome))
}

async fn submit_embeddings(
	State(state): State<AppState>,
	payload: Result<Json<EmbeddingJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobSnapshot>), ApiError> {
	let Json(payload) = payload?;
	let snapshot = state.service.submit_embedding_job(payload.documents)?;

	Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

async fn submit_rerank(
	State(state): State<AppState>,
	payload: Result<Json<RerankJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobSnapshot>), ApiError> {
	let Json(payload) = payload?;
	let snapshot = state.service.submit_batch_rerank_job(payload.items)?;

	Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

async fn job(
	State(state): State<AppState>,
	id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<JobSnapshot>, ApiError> {
	let Path(id) = id?;

	Ok(Json(state.service.job(id)?))
}

async fn resume_job(
	State(state): State<AppState>,
	id: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, Json<JobSnapshot>), ApiError> {
	let Path(id) = id?;
	let snapshot = state.service.resume_job(id)?;

	Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
	retry_after_secs: Option<u64>,
}
impl ApiError {
	fn new(status: StatusCode, error_code: &str, message: impl Into<String>) -> Self {
		Self {
			status,
			error_code: error_code.to_string(),
			message: message.into(),
			fields: None,
			retry_after_secs: None,
		}
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let status = match &err {
			ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
			ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
			ServiceError::Conflict { .. } => StatusCode::CONFLICT,
			ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
			ServiceError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			ServiceError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
			ServiceError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			ServiceError::InternalFusion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		};

		if status.is_server_error() {
			tracing::error!(error = %err, code = err.code(), "Request failed.");
		}

		let mut api_error = Self::new(status, err.code(), err.to_string());

		// Whole seconds, rounded up.
		api_error.retry_after_secs =
			err.retry_after().map(|delay| delay.as_millis().div_ceil(1_000) as u64);

		api_error
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
	}
}
impl From<PathRejection> for ApiError {
	fn from(rejection: PathRejection) -> Self {
		let mut api_error =
			Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text());

		api_error.fields = Some(vec!["id".to_string()]);

		api_error
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };
		let mut response = (self.status, Json(body)).into_response();

		if let Some(secs) = self.retry_after_secs {
			response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
		}

		response
	}
}
