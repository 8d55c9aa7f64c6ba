pub mod batch_rerank;
pub mod dedupe;
pub mod embedding_job;
pub mod fusion;
pub mod jobs;
pub mod rerank;
pub mod retrieval;
pub mod retry;
pub mod search;
pub mod time_serde;

mod error;

pub use batch_rerank::RerankItem;
pub use error::{Error, Result};
pub use fusion::{FusedResult, Weights};
pub use jobs::{
	JobCheckpoint, JobFailure, JobHandle, JobKind, JobMetrics, JobSnapshot, JobStatus, JobTracker,
};
pub use rerank::{RerankCandidate, RerankOutcome, RerankedResult};
pub use retrieval::{Candidate, RankedList, RetrieverKind};
pub use search::{SearchMetadata, SearchMethod, SearchRequest, SearchResponse, SearchResults};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tcr_config::{BOOSTABLE_FIELDS, Config, EmbeddingProviderConfig, LlmProviderConfig};
use tcr_domain::QueryPreprocessor;
use tcr_providers::{
	embedding::{self, EmbeddingBatch},
	scoring::{self, RelevanceScore},
	summarize,
};
use tcr_storage::{
	filter::SearchFilters,
	models::{StoreHit, TestCaseDocument},
	qdrant::{KeywordClause, QdrantStore},
};

use crate::retrieval::{KeywordRetriever, Retriever, VectorRetriever};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>>;
}

pub trait ScoringProvider
where
	Self: Send + Sync,
{
	fn score<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
		candidate: &'a str,
	) -> BoxFuture<'a, Result<RelevanceScore>>;
}

pub trait SummaryProvider
where
	Self: Send + Sync,
{
	fn summarize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		text: &'a str,
		max_chars: usize,
	) -> BoxFuture<'a, Result<String>>;
}

/// What to look up in the document index.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryClause {
	Keyword(KeywordClause),
	/// Query embedding for cosine search.
	Vector(Vec<f32>),
}

pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		clause: &'a QueryClause,
		filters: &'a SearchFilters,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>>;

	fn upsert<'a>(
		&'a self,
		documents: &'a [TestCaseDocument],
		vectors: &'a [Vec<f32>],
	) -> BoxFuture<'a, Result<()>>;
}

/// Access to the test case behind a ranked item.
pub trait Ranked {
	fn document(&self) -> &TestCaseDocument;

	fn document_mut(&mut self) -> &mut TestCaseDocument;
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl ScoringProvider for DefaultProviders {
	fn score<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
		candidate: &'a str,
	) -> BoxFuture<'a, Result<RelevanceScore>> {
		Box::pin(async move { Ok(scoring::score(cfg, query, candidate).await?) })
	}
}
impl SummaryProvider for DefaultProviders {
	fn summarize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		text: &'a str,
		max_chars: usize,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(summarize::summarize(cfg, text, max_chars).await?) })
	}
}

impl DocumentStore for QdrantStore {
	fn search<'a>(
		&'a self,
		clause: &'a QueryClause,
		filters: &'a SearchFilters,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		Box::pin(async move {
			let filter = filters.to_qdrant();
			let hits = match clause {
				QueryClause::Keyword(keyword) => self.search_keyword(keyword, filter, limit).await?,
				QueryClause::Vector(vector) =>
					self.search_dense(vector.clone(), filter, limit).await?,
			};

			Ok(hits)
		})
	}

	fn upsert<'a>(
		&'a self,
		documents: &'a [TestCaseDocument],
		vectors: &'a [Vec<f32>],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			QdrantStore::upsert(self, documents, vectors, &BOOSTABLE_FIELDS).await?;

			Ok(())
		})
	}
}

pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub scoring: Arc<dyn ScoringProvider>,
	pub summary: Arc<dyn SummaryProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		scoring: Arc<dyn ScoringProvider>,
		summary: Arc<dyn SummaryProvider>,
	) -> Self {
		Self { embedding, scoring, summary }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), scoring: provider.clone(), summary: provider }
	}
}

pub struct TcrService {
	pub cfg: Config,
	pub store: Arc<dyn DocumentStore>,
	pub providers: Providers,
	pub preprocessor: QueryPreprocessor,
	pub jobs: JobTracker,
	keyword: KeywordRetriever,
	vector: VectorRetriever,
}
impl TcrService {
	pub fn new(cfg: Config, store: QdrantStore) -> Result<Self> {
		Self::with_providers(cfg, Arc::new(store), Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn DocumentStore>,
		providers: Providers,
	) -> Result<Self> {
		let preprocessor = QueryPreprocessor::new(&cfg.preprocess).map_err(|err| {
			Error::Validation {
				message: format!("preprocess.identifier_pattern is invalid: {err}"),
			}
		})?;
		let keyword = KeywordRetriever::new(store.clone(), &cfg.search);
		let vector = VectorRetriever::new(
			store.clone(),
			providers.embedding.clone(),
			cfg.providers.embedding.clone(),
			&cfg.search,
		);
		let jobs = JobTracker::new(Duration::from_secs(cfg.jobs.retention_secs));

		Ok(Self { cfg, store, providers, preprocessor, jobs, keyword, vector })
	}

	pub(crate) fn retriever(&self, kind: RetrieverKind) -> &dyn Retriever {
		match kind {
			RetrieverKind::Keyword => &self.keyword,
			RetrieverKind::Vector => &self.vector,
		}
	}
}
