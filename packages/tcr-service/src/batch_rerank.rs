use std::{sync::Arc, time::Duration};

use futures::future;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
	Error, Result, ScoringProvider, TcrService,
	jobs::{JobCheckpoint, JobFailure, JobHandle, JobInput, JobKind, JobSnapshot},
	rerank::{RerankCandidate, RerankOutcome, Reranker},
};
use tcr_config::{Jobs, LlmProviderConfig};

/// One query and the candidates to reorder for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankItem {
	pub query: String,
	pub candidates: Vec<RerankCandidate>,
}

#[derive(Debug, Clone, Serialize)]
struct ItemOutcome {
	item: usize,
	query: String,
	#[serde(flatten)]
	outcome: RerankOutcome<RerankCandidate>,
}

impl TcrService {
	/// Reranks each item as its own chunk. Scoring failures fall back per item and never fail
	/// the job. Must be called inside a tokio runtime.
	pub fn submit_batch_rerank_job(&self, items: Vec<RerankItem>) -> Result<JobSnapshot> {
		if items.is_empty() {
			return Err(Error::Validation { message: "items must be non-empty.".to_string() });
		}
		if let Some(idx) = items.iter().position(|item| item.query.trim().is_empty()) {
			return Err(Error::Validation {
				message: format!("items[{idx}].query must be non-empty."),
			});
		}

		let total_chunks = items.len();

		self.spawn_batch_rerank_job(Arc::new(items), JobCheckpoint::new(total_chunks), None)
	}

	pub(crate) fn spawn_batch_rerank_job(
		&self,
		items: Arc<Vec<RerankItem>>,
		checkpoint: JobCheckpoint,
		resumed_from: Option<uuid::Uuid>,
	) -> Result<JobSnapshot> {
		let handle = self.jobs.register(
			JobKind::BatchRerank,
			JobInput::BatchRerank(items.clone()),
			checkpoint,
			resumed_from,
		)?;
		let snapshot = handle.snapshot();
		let runner = BatchRerankRunner {
			scorer: self.providers.scoring.clone(),
			scoring_cfg: self.cfg.providers.scoring.clone(),
			max_candidates: self.cfg.rerank.max_candidates,
			concurrency: self.cfg.rerank.concurrency,
			jobs: self.cfg.jobs.clone(),
			items,
		};

		tokio::spawn(runner.run(handle));

		Ok(snapshot)
	}
}

struct BatchRerankRunner {
	scorer: Arc<dyn ScoringProvider>,
	scoring_cfg: LlmProviderConfig,
	max_candidates: usize,
	concurrency: usize,
	jobs: Jobs,
	items: Arc<Vec<RerankItem>>,
}
impl BatchRerankRunner {
	async fn run(self, mut handle: JobHandle) {
		if let Err(err) = handle.start() {
			tracing::error!(error = %err, job_id = %handle.id(), "Failed to start rerank job.");

			return;
		}

		let reranker = Reranker {
			scorer: self.scorer.as_ref(),
			cfg: &self.scoring_cfg,
			max_candidates: self.max_candidates,
			concurrency: self.concurrency,
		};
		let pending = handle.snapshot().checkpoint.pending_chunks();
		let mut outcomes = Vec::with_capacity(pending.len());

		for (wave_idx, wave) in pending.chunks(self.jobs.concurrency.max(1)).enumerate() {
			if wave_idx > 0 && self.jobs.inter_batch_delay_ms > 0 {
				tokio::time::sleep(Duration::from_millis(self.jobs.inter_batch_delay_ms)).await;
			}

			let calls = wave
				.iter()
				.filter_map(|&idx| self.items.get(idx).map(|item| (idx, item)))
				.map(|(idx, item)| {
					let reranker = &reranker;

					async move {
						let outcome =
							reranker.rerank(item.query.trim(), item.candidates.clone()).await;

						ItemOutcome { item: idx, query: item.query.clone(), outcome }
					}
				});

			for outcome in future::join_all(calls).await {
				if let Err(err) = handle.record_chunk(outcome.item, 0, 0.0) {
					let failure = JobFailure { chunk_index: outcome.item, reason: err.to_string() };

					if let Err(err) = handle.fail(failure) {
						tracing::error!(error = %err, "Failed to record rerank job failure.");
					}

					return;
				}

				outcomes.push(outcome);
			}
		}

		let skipped_items = outcomes.iter().filter(|outcome| outcome.outcome.skipped).count();
		let result = match serde_json::to_value(&outcomes) {
			Ok(items) => json!({ "items": items, "skipped_items": skipped_items }),
			Err(err) => {
				let failure = JobFailure {
					chunk_index: 0,
					reason: format!("Failed to encode rerank outcomes: {err}"),
				};

				if let Err(err) = handle.fail(failure) {
					tracing::error!(error = %err, "Failed to record rerank job failure.");
				}

				return;
			},
		};

		if let Err(err) = handle.complete(result) {
			tracing::error!(error = %err, "Failed to complete rerank job.");
		}
	}
}
