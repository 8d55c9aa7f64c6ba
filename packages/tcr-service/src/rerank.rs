use futures::future;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{Ranked, ScoringProvider, fusion::cmp_f32_desc};
use tcr_config::{LlmProviderConfig, MAX_RERANK_CANDIDATES};
use tcr_providers::scoring::RelevanceScore;
use tcr_storage::models::TestCaseDocument;

/// Caller-supplied candidate for a standalone rerank request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankCandidate {
	#[serde(flatten)]
	pub document: TestCaseDocument,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub score: Option<f32>,
}
impl Ranked for RerankCandidate {
	fn document(&self) -> &TestCaseDocument {
		&self.document
	}

	fn document_mut(&mut self) -> &mut TestCaseDocument {
		&mut self.document
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankedResult<T> {
	#[serde(flatten)]
	pub item: T,
	/// External relevance in `[0, 100]`; absent when the item was not scored.
	pub relevance_score: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rationale: Option<String>,
	/// Zero-based position before reranking.
	pub fused_rank: usize,
}
impl<T> Ranked for RerankedResult<T>
where
	T: Ranked,
{
	fn document(&self) -> &TestCaseDocument {
		self.item.document()
	}

	fn document_mut(&mut self) -> &mut TestCaseDocument {
		self.item.document_mut()
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankOutcome<T> {
	pub results: Vec<RerankedResult<T>>,
	/// True when scoring failed and the input order was returned unchanged.
	pub skipped: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}
impl<T> RerankOutcome<T> {
	fn unchanged(items: Vec<T>, skipped: bool, reason: Option<String>) -> Self {
		let results = items
			.into_iter()
			.enumerate()
			.map(|(fused_rank, item)| RerankedResult {
				item,
				relevance_score: None,
				rationale: None,
				fused_rank,
			})
			.collect();

		Self { results, skipped, reason }
	}
}

pub struct Reranker<'a> {
	pub scorer: &'a dyn ScoringProvider,
	pub cfg: &'a LlmProviderConfig,
	pub max_candidates: usize,
	pub concurrency: usize,
}
impl Reranker<'_> {
	/// Reorders the first `max_candidates` items by external relevance. Ties keep their prior
	/// order and items past the scored head follow unchanged. Any scoring failure returns the
	/// input order with `skipped` set.
	pub async fn rerank<T>(&self, query: &str, items: Vec<T>) -> RerankOutcome<T>
	where
		T: Ranked + Send + Sync,
	{
		let head_len = self.max_candidates.min(MAX_RERANK_CANDIDATES).min(items.len());

		if head_len == 0 {
			return RerankOutcome::unchanged(items, false, None);
		}

		let limiter = Semaphore::new(self.concurrency.max(1));
		let calls = items[..head_len].iter().map(|item| {
			let text = scoring_text(item.document());
			let limiter = &limiter;

			async move {
				let _permit = limiter.acquire().await.map_err(|err| err.to_string())?;

				self.scorer
					.score(self.cfg, query, &text)
					.await
					.map_err(|err| err.to_string())
					.and_then(|scored| {
						if scored.score.is_finite() {
							Ok(scored)
						} else {
							Err("Scoring service returned a non-finite score.".to_string())
						}
					})
			}
		});
		let scores = match future::join_all(calls).await.into_iter().collect::<Result<Vec<_>, _>>()
		{
			Ok(scores) => scores,
			Err(reason) => {
				tracing::warn!(
					error = %reason,
					candidates = head_len,
					"Rerank failed. Keeping fused order."
				);

				return RerankOutcome::unchanged(items, true, Some(reason));
			},
		};

		RerankOutcome { results: reorder(items, scores), skipped: false, reason: None }
	}
}

fn reorder<T>(items: Vec<T>, scores: Vec<RelevanceScore>) -> Vec<RerankedResult<T>> {
	let head_len = scores.len();
	let mut scores = scores.into_iter();
	let mut head = Vec::with_capacity(head_len);
	let mut tail = Vec::with_capacity(items.len().saturating_sub(head_len));

	for (fused_rank, item) in items.into_iter().enumerate() {
		match scores.next() {
			Some(scored) => head.push(RerankedResult {
				item,
				relevance_score: Some(scored.score.clamp(0.0, 100.0)),
				rationale: scored.rationale,
				fused_rank,
			}),
			None => tail.push(RerankedResult {
				item,
				relevance_score: None,
				rationale: None,
				fused_rank,
			}),
		}
	}

	// `sort_by` is stable, so equal scores stay in fused order.
	head.sort_by(|a, b| {
		cmp_f32_desc(a.relevance_score.unwrap_or(0.0), b.relevance_score.unwrap_or(0.0))
	});
	head.extend(tail);

	head
}

fn scoring_text(document: &TestCaseDocument) -> String {
	format!("[{}] {}", document.id, document.descriptive_text())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equal_scores_keep_fused_rank() {
		let scores = [40.0, 90.0, 40.0, 90.0]
			.into_iter()
			.map(|score| RelevanceScore { score, rationale: None })
			.collect();
		let reordered = reorder(vec!["a", "b", "c", "d", "e"], scores);
		let order = reordered.iter().map(|result| result.item).collect::<Vec<_>>();

		assert_eq!(order, vec!["b", "d", "a", "c", "e"]);
		assert_eq!(reordered[4].relevance_score, None);
		assert_eq!(reordered[0].fused_rank, 1);
	}
}
