use std::{
	collections::BTreeMap,
	fmt::{Display, Formatter, Result as FmtResult},
	sync::Arc,
	time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
	BoxFuture, DocumentStore, EmbeddingProvider, Error, QueryClause, Ranked, Result,
	retry::RetryPolicy,
};
use tcr_config::{EmbeddingProviderConfig, MAX_TOP_N};
use tcr_domain::QueryVariant;
use tcr_storage::{
	filter::SearchFilters,
	models::{StoreHit, TestCaseDocument},
	qdrant::KeywordClause,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
	Keyword,
	Vector,
}
impl Display for RetrieverKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Keyword => f.write_str("keyword"),
			Self::Vector => f.write_str("vector"),
		}
	}
}

/// A document as one retriever ranked it. `raw_score` is on that retriever's own scale.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
	#[serde(flatten)]
	pub document: TestCaseDocument,
	pub source: RetrieverKind,
	pub raw_score: f32,
}
impl Candidate {
	pub fn id(&self) -> &str {
		&self.document.id
	}
}
impl Ranked for Candidate {
	fn document(&self) -> &TestCaseDocument {
		&self.document
	}

	fn document_mut(&mut self) -> &mut TestCaseDocument {
		&mut self.document
	}
}

/// Output of one retriever call for one query variant.
#[derive(Debug, Clone)]
pub struct RankedList {
	pub source: RetrieverKind,
	pub variant: usize,
	pub candidates: Vec<Candidate>,
}

pub trait Retriever
where
	Self: Send + Sync,
{
	fn kind(&self) -> RetrieverKind;

	fn retrieve<'a>(
		&'a self,
		variant: &'a QueryVariant,
		top_n: u32,
		filters: &'a SearchFilters,
	) -> BoxFuture<'a, Result<Vec<Candidate>>>;
}

pub fn clamp_top_n(top_n: u32) -> u32 {
	top_n.clamp(1, MAX_TOP_N)
}

/// BM25 over the boosted test case fields.
pub struct KeywordRetriever {
	store: Arc<dyn DocumentStore>,
	field_boosts: BTreeMap<String, f32>,
	fuzzy: tcr_config::Fuzzy,
	timeout: Duration,
	retry: RetryPolicy,
}
impl KeywordRetriever {
	pub fn new(store: Arc<dyn DocumentStore>, cfg: &tcr_config::Search) -> Self {
		Self {
			store,
			field_boosts: cfg.field_boosts.clone(),
			fuzzy: cfg.fuzzy,
			timeout: Duration::from_millis(cfg.retriever_timeout_ms),
			retry: RetryPolicy::for_search(&cfg.retry),
		}
	}
}
impl Retriever for KeywordRetriever {
	fn kind(&self) -> RetrieverKind {
		RetrieverKind::Keyword
	}

	fn retrieve<'a>(
		&'a self,
		variant: &'a QueryVariant,
		top_n: u32,
		filters: &'a SearchFilters,
	) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move {
			let clause = QueryClause::Keyword(KeywordClause {
				text: variant.text.clone(),
				field_boosts: self.field_boosts.clone(),
				fuzzy: self.fuzzy,
			});
			let limit = clamp_top_n(top_n);
			let hits = self
				.retry
				.run("keyword_search", || {
					let call = self.store.search(&clause, filters, limit);

					with_deadline(self.timeout, "Keyword", call)
				})
				.await?;

			Ok(into_candidates(hits, RetrieverKind::Keyword, limit))
		})
	}
}

/// Cosine similarity against the embedded query variant.
pub struct VectorRetriever {
	store: Arc<dyn DocumentStore>,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
	timeout: Duration,
	retry: RetryPolicy,
}
impl VectorRetriever {
	pub fn new(
		store: Arc<dyn DocumentStore>,
		embedding: Arc<dyn EmbeddingProvider>,
		embedding_cfg: EmbeddingProviderConfig,
		cfg: &tcr_config::Search,
	) -> Self {
		Self {
			store,
			embedding,
			embedding_cfg,
			timeout: Duration::from_millis(cfg.retriever_timeout_ms),
			retry: RetryPolicy::for_search(&cfg.retry),
		}
	}

	async fn embed_variant(&self, text: &str) -> Result<Vec<f32>> {
		let texts = vec![text.to_string()];
		let batch = self
			.retry
			.run("embed_query", || {
				let call = self.embedding.embed(&self.embedding_cfg, &texts);

				with_deadline(self.timeout, "Embedding", call)
			})
			.await?;
		let Some(vector) = batch.vectors.into_iter().next() else {
			return Err(Error::UpstreamUnavailable {
				message: "Embedding provider returned no vector.".to_string(),
			});
		};

		if vector.len() != self.embedding_cfg.dimensions as usize {
			return Err(Error::UpstreamUnavailable {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}
}
impl Retriever for VectorRetriever {
	fn kind(&self) -> RetrieverKind {
		RetrieverKind::Vector
	}

	fn retrieve<'a>(
		&'a self,
		variant: &'a QueryVariant,
		top_n: u32,
		filters: &'a SearchFilters,
	) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move {
			let vector = self.embed_variant(&variant.text).await?;
			let clause = QueryClause::Vector(vector);
			let limit = clamp_top_n(top_n);
			let hits = self
				.retry
				.run("vector_search", || {
					let call = self.store.search(&clause, filters, limit);

					with_deadline(self.timeout, "Vector", call)
				})
				.await?;

			Ok(into_candidates(hits, RetrieverKind::Vector, limit))
		})
	}
}

/// Runs one upstream attempt under a deadline. Running out of time is a failure, never an empty
/// result.
async fn with_deadline<T, F>(deadline: Duration, label: &str, call: F) -> Result<T>
where
	F: std::future::Future<Output = Result<T>>,
{
	match tokio::time::timeout(deadline, call).await {
		Ok(result) => result,
		Err(_) => Err(Error::UpstreamTimeout {
			message: format!("{label} call exceeded {} ms.", deadline.as_millis()),
		}),
	}
}

fn into_candidates(hits: Vec<StoreHit>, source: RetrieverKind, limit: u32) -> Vec<Candidate> {
	hits.into_iter()
		.take(limit as usize)
		.map(|hit| Candidate { document: hit.document, source, raw_score: hit.score })
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn top_n_is_bounded() {
		assert_eq!(clamp_top_n(0), 1);
		assert_eq!(clamp_top_n(50), 50);
		assert_eq!(clamp_top_n(1_000), 100);
	}

	#[tokio::test(start_paused = true)]
	async fn slow_calls_become_timeouts() {
		let result: Result<()> = with_deadline(Duration::from_millis(10), "Vector", async {
			tokio::time::sleep(Duration::from_secs(5)).await;

			Ok(())
		})
		.await;

		assert!(matches!(result, Err(Error::UpstreamTimeout { .. })));
	}
}
