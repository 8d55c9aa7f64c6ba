use std::{
	collections::{BTreeMap, hash_map::DefaultHasher},
	hash::{Hash, Hasher},
	sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tcr_config::{EmbeddingProviderConfig, LlmProviderConfig};
use tcr_domain::normalize::{normalize, tokens};
use tcr_providers::{
	embedding::{EmbeddingBatch, Usage},
	scoring::RelevanceScore,
};
use tcr_service::{BoxFuture, EmbeddingProvider, Error, Result, ScoringProvider, SummaryProvider};

/// Bag-of-words embedding: every token lands in a hashed bucket, so texts sharing words point
/// in similar directions. Reports one token per word.
pub struct HashEmbedding {
	pub vector_dim: u32,
	calls: AtomicUsize,
}
impl HashEmbedding {
	pub fn new(vector_dim: u32) -> Self {
		Self { vector_dim, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn vector_for(&self, text: &str) -> Vec<f32> {
		let dim = self.vector_dim.max(1) as usize;
		let normalized = normalize(text);
		let mut values = vec![0.0_f32; dim];

		for token in tokens(&normalized) {
			let mut hasher = DefaultHasher::new();

			token.hash(&mut hasher);

			values[(hasher.finish() % dim as u64) as usize] += 1.0;
		}

		let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();

		if norm > 0.0 {
			values.iter_mut().for_each(|v| *v /= norm);
		}

		values
	}

	fn batch(&self, texts: &[String]) -> EmbeddingBatch {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let tokens = texts.iter().map(|text| tokens(&normalize(text)).count() as u64).sum();

		EmbeddingBatch {
			vectors: texts.iter().map(|text| self.vector_for(text)).collect(),
			usage: Usage { prompt_tokens: tokens, total_tokens: tokens },
		}
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>> {
		let batch = self.batch(texts);

		Box::pin(async move { Ok(batch) })
	}
}

/// Fails any batch containing `marker` while switched on; otherwise behaves like
/// [`HashEmbedding`].
pub struct FlakyEmbedding {
	pub inner: HashEmbedding,
	marker: String,
	failing: AtomicBool,
	failures: AtomicUsize,
}
impl FlakyEmbedding {
	pub fn new(vector_dim: u32, marker: impl Into<String>) -> Self {
		Self {
			inner: HashEmbedding::new(vector_dim),
			marker: marker.into(),
			failing: AtomicBool::new(true),
			failures: AtomicUsize::new(0),
		}
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn failures(&self) -> usize {
		self.failures.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for FlakyEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>> {
		let marked = texts.iter().any(|text| text.contains(&self.marker));

		if self.failing.load(Ordering::SeqCst) && marked {
			self.failures.fetch_add(1, Ordering::SeqCst);

			return Box::pin(async move {
				Err(Error::UpstreamUnavailable {
					message: "Embedding service is unavailable.".to_string(),
				})
			});
		}

		self.inner.embed(cfg, texts)
	}
}

/// Scores candidates by the document id found in the scoring text. Unknown ids score zero.
#[derive(Default)]
pub struct ScriptedScorer {
	scores: BTreeMap<String, f32>,
	calls: AtomicUsize,
}
impl ScriptedScorer {
	pub fn new<I, S>(scores: I) -> Self
	where
		I: IntoIterator<Item = (S, f32)>,
		S: Into<String>,
	{
		Self {
			scores: scores.into_iter().map(|(id, score)| (id.into(), score)).collect(),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl ScoringProvider for ScriptedScorer {
	fn score<'a>(
		&'a self,
		_: &'a LlmProviderConfig,
		_: &'a str,
		candidate: &'a str,
	) -> BoxFuture<'a, Result<RelevanceScore>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let score = self
			.scores
			.iter()
			.find(|(id, _)| candidate.starts_with(&format!("[{id}]")))
			.map(|(_, score)| *score)
			.unwrap_or(0.0);

		Box::pin(async move { Ok(RelevanceScore { score, rationale: None }) })
	}
}

/// Always fails, as an unreachable scoring service would.
pub struct FailingScorer;
impl ScoringProvider for FailingScorer {
	fn score<'a>(
		&'a self,
		_: &'a LlmProviderConfig,
		_: &'a str,
		_: &'a str,
	) -> BoxFuture<'a, Result<RelevanceScore>> {
		Box::pin(async move {
			Err(Error::UpstreamTimeout { message: "Scoring call timed out.".to_string() })
		})
	}
}

/// Returns the first sentence of the text.
pub struct FirstSentenceSummary;
impl SummaryProvider for FirstSentenceSummary {
	fn summarize<'a>(
		&'a self,
		_: &'a LlmProviderConfig,
		text: &'a str,
		_: usize,
	) -> BoxFuture<'a, Result<String>> {
		let summary = text.split_inclusive('.').next().unwrap_or(text).trim().to_string();

		Box::pin(async move { Ok(summary) })
	}
}
