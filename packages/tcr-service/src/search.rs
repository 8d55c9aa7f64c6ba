use std::time::Instant;

use futures::future;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{
	Error, Ranked, Result, TcrService,
	dedupe::{self, Summarizer},
	fusion::{self, FusedResult, Weights},
	rerank::{RerankCandidate, RerankOutcome, RerankedResult, Reranker},
	retrieval::{Candidate, RankedList, RetrieverKind},
};
use tcr_domain::{QueryVariant, SimilarityMeasure};
use tcr_storage::filter::SearchFilters;

/// Which indexes a search consults. Every method goes through the same fusion step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
	Vector,
	Bm25,
	#[default]
	Hybrid,
}
impl SearchMethod {
	pub fn sources(self) -> &'static [RetrieverKind] {
		match self {
			Self::Vector => &[RetrieverKind::Vector],
			Self::Bm25 => &[RetrieverKind::Keyword],
			Self::Hybrid => &[RetrieverKind::Keyword, RetrieverKind::Vector],
		}
	}

	/// Single-source methods pin the weights; hybrid takes the request's pair or the default.
	pub fn weights(self, requested: Option<Weights>, default: Weights) -> Weights {
		match self {
			Self::Vector => Weights::VECTOR_ONLY,
			Self::Bm25 => Weights::KEYWORD_ONLY,
			Self::Hybrid => requested.unwrap_or(default),
		}
	}

	fn single_source(self) -> Option<RetrieverKind> {
		match self {
			Self::Vector => Some(RetrieverKind::Vector),
			Self::Bm25 => Some(RetrieverKind::Keyword),
			Self::Hybrid => None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub method: SearchMethod,
	pub limit: Option<u32>,
	#[serde(default)]
	pub filters: SearchFilters,
	pub weights: Option<Weights>,
	/// Overrides `rerank.enabled`.
	pub rerank: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
	Candidates(Vec<Candidate>),
	Fused(Vec<FusedResult>),
	Reranked(Vec<RerankedResult<FusedResult>>),
}
impl SearchResults {
	pub fn len(&self) -> usize {
		match self {
			Self::Candidates(items) => items.len(),
			Self::Fused(items) => items.len(),
			Self::Reranked(items) => items.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Document ids in result order.
	pub fn ids(&self) -> Vec<&str> {
		match self {
			Self::Candidates(items) => items.iter().map(|item| item.id()).collect(),
			Self::Fused(items) => items.iter().map(|item| item.document.id.as_str()).collect(),
			Self::Reranked(items) => items.iter().map(|item| item.document().id.as_str()).collect(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalFailure {
	pub source: RetrieverKind,
	pub variant: usize,
	pub error_code: &'static str,
	pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMetadata {
	pub method: SearchMethod,
	pub variants: Vec<QueryVariant>,
	pub identifiers: Vec<String>,
	pub weights: Weights,
	pub limit: u32,
	/// Some retriever calls failed; results come from the rest.
	pub partial: bool,
	pub failures: Vec<RetrievalFailure>,
	pub reranked: bool,
	pub rerank_skipped: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank_reason: Option<String>,
	pub duplicates_removed: usize,
	pub summarized: usize,
	pub took_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub results: SearchResults,
	pub metadata: SearchMetadata,
}

impl TcrService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let limit = self.resolve_limit(req.limit)?;

		req.filters.validate()?;

		let weights = req.method.weights(req.weights, self.cfg.search.weights.into()).validate()?;
		let plan = self.preprocessor.preprocess(&req.query, &self.preprocessor.defaults());

		if plan.is_blank() {
			return Err(Error::Validation {
				message: "query must contain searchable text.".to_string(),
			});
		}

		let (lists, failures) =
			self.retrieve_all(&plan.variants, req.method.sources(), limit, &req.filters).await;

		if lists.is_empty() {
			let detail = failures
				.iter()
				.map(|failure| format!("{}: {}", failure.source, failure.message))
				.collect::<Vec<_>>()
				.join("; ");

			return Err(Error::UpstreamUnavailable {
				message: format!("All retrievers failed. {detail}"),
			});
		}

		let fused = fusion::fuse(&lists, weights)?;
		let mut metadata = SearchMetadata {
			method: req.method,
			variants: plan.variants.clone(),
			identifiers: plan.identifiers.clone(),
			weights,
			limit,
			partial: !failures.is_empty(),
			failures,
			reranked: false,
			rerank_skipped: false,
			rerank_reason: None,
			duplicates_removed: 0,
			summarized: 0,
			took_ms: 0,
		};
		let results = if req.rerank.unwrap_or(self.cfg.rerank.enabled) {
			let outcome = self.reranker().rerank(req.query.trim(), fused).await;

			metadata.reranked = !outcome.skipped;
			metadata.rerank_skipped = outcome.skipped;
			metadata.rerank_reason = outcome.reason;

			SearchResults::Reranked(self.finish(outcome.results, limit, &mut metadata).await)
		} else {
			let fused = self.finish(fused, limit, &mut metadata).await;

			match req.method.single_source() {
				Some(source) => SearchResults::Candidates(
					fused
						.into_iter()
						.map(|result| Candidate {
							raw_score: result.raw_score(source).unwrap_or(0.0),
							document: result.document,
							source,
						})
						.collect(),
				),
				None => SearchResults::Fused(fused),
			}
		};

		metadata.took_ms = started.elapsed().as_millis() as u64;

		tracing::info!(
			method = ?metadata.method,
			variants = metadata.variants.len(),
			results = results.len(),
			partial = metadata.partial,
			took_ms = metadata.took_ms,
			"Search completed."
		);

		Ok(SearchResponse { results, metadata })
	}

	/// Reranks caller-supplied candidates. Scoring failures return the input order with
	/// `skipped` set.
	pub async fn rerank_candidates(
		&self,
		query: &str,
		candidates: Vec<RerankCandidate>,
	) -> Result<RerankOutcome<RerankCandidate>> {
		if query.trim().is_empty() {
			return Err(Error::Validation { message: "query must be non-empty.".to_string() });
		}
		if candidates.iter().any(|candidate| candidate.document.id.trim().is_empty()) {
			return Err(Error::Validation {
				message: "candidates must have non-empty ids.".to_string(),
			});
		}

		Ok(self.reranker().rerank(query.trim(), candidates).await)
	}

	pub(crate) fn reranker(&self) -> Reranker<'_> {
		Reranker {
			scorer: self.providers.scoring.as_ref(),
			cfg: &self.cfg.providers.scoring,
			max_candidates: self.cfg.rerank.max_candidates,
			concurrency: self.cfg.rerank.concurrency,
		}
	}

	fn resolve_limit(&self, requested: Option<u32>) -> Result<u32> {
		let limit = requested.unwrap_or(self.cfg.search.default_limit);

		if limit == 0 || limit > self.cfg.search.max_top_n {
			return Err(Error::Validation {
				message: format!("limit must be between 1 and {}.", self.cfg.search.max_top_n),
			});
		}

		Ok(limit)
	}

	/// Issues every (variant, source) call concurrently, at most `search.concurrency_limit` at a
	/// time. Failures are collected rather than propagated.
	async fn retrieve_all(
		&self,
		variants: &[QueryVariant],
		sources: &[RetrieverKind],
		limit: u32,
		filters: &SearchFilters,
	) -> (Vec<RankedList>, Vec<RetrievalFailure>) {
		let limiter = Semaphore::new(self.cfg.search.concurrency_limit.max(1));
		let calls = variants
			.iter()
			.enumerate()
			.flat_map(|(idx, variant)| sources.iter().map(move |source| (idx, variant, *source)))
			.map(|(idx, variant, source)| {
				let limiter = &limiter;

				async move {
					let outcome = match limiter.acquire().await {
						Ok(_permit) =>
							self.retriever(source).retrieve(variant, limit, filters).await,
						Err(err) => Err(Error::UpstreamUnavailable { message: err.to_string() }),
					};

					(idx, source, outcome)
				}
			});
		let mut lists = Vec::new();
		let mut failures = Vec::new();

		for (variant, source, outcome) in future::join_all(calls).await {
			match outcome {
				Ok(candidates) => lists.push(RankedList { source, variant, candidates }),
				Err(err) => {
					tracing::warn!(error = %err, %source, variant, "Retriever call failed.");

					failures.push(RetrievalFailure {
						source,
						variant,
						error_code: err.code(),
						message: err.to_string(),
					});
				},
			}
		}

		(lists, failures)
	}

	/// Dedupes, cuts to `limit`, then summarizes. Ranking is fixed before summaries run.
	async fn finish<T>(&self, items: Vec<T>, limit: u32, metadata: &mut SearchMetadata) -> Vec<T>
	where
		T: Ranked + Send,
	{
		let dedupe_cfg = &self.cfg.dedupe;
		let (mut items, dropped) = if dedupe_cfg.enabled {
			let measure = SimilarityMeasure::from_name(&dedupe_cfg.measure)
				.unwrap_or(SimilarityMeasure::Jaccard);

			dedupe::dedupe(items, measure, dedupe_cfg.similarity_threshold)
		} else {
			(items, 0)
		};

		items.truncate(limit as usize);

		metadata.duplicates_removed = dropped;

		if dedupe_cfg.summarize {
			let summarizer = Summarizer {
				provider: self.providers.summary.as_ref(),
				cfg: &self.cfg.providers.scoring,
				max_chars: dedupe_cfg.summary_max_chars,
				concurrency: self.cfg.rerank.concurrency,
			};

			metadata.summarized = summarizer.summarize(&mut items).await;
		}

		items
	}
}
