use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::future;
use serde_json::json;

use crate::{
	DocumentStore, EmbeddingProvider, Error, Result, TcrService,
	jobs::{JobCheckpoint, JobFailure, JobHandle, JobInput, JobKind, JobSnapshot},
	retry::RetryPolicy,
};
use tcr_config::{EmbeddingProviderConfig, Jobs};
use tcr_storage::models::TestCaseDocument;

impl TcrService {
	/// Registers an embedding job and runs it in the background. Must be called inside a tokio
	/// runtime.
	pub fn submit_embedding_job(&self, documents: Vec<TestCaseDocument>) -> Result<JobSnapshot> {
		validate_documents(&documents)?;

		let total_chunks = documents.len().div_ceil(self.cfg.jobs.batch_size.max(1));

		self.spawn_embedding_job(Arc::new(documents), JobCheckpoint::new(total_chunks), None)
	}

	pub(crate) fn spawn_embedding_job(
		&self,
		documents: Arc<Vec<TestCaseDocument>>,
		checkpoint: JobCheckpoint,
		resumed_from: Option<uuid::Uuid>,
	) -> Result<JobSnapshot> {
		let handle = self.jobs.register(
			JobKind::Embedding,
			JobInput::Embedding(documents.clone()),
			checkpoint,
			resumed_from,
		)?;
		let snapshot = handle.snapshot();
		let runner = EmbeddingRunner {
			store: self.store.clone(),
			embedding: self.providers.embedding.clone(),
			embedding_cfg: self.cfg.providers.embedding.clone(),
			jobs: self.cfg.jobs.clone(),
			documents,
		};

		tokio::spawn(runner.run(handle));

		Ok(snapshot)
	}
}

struct EmbeddingRunner {
	store: Arc<dyn DocumentStore>,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
	jobs: Jobs,
	documents: Arc<Vec<TestCaseDocument>>,
}
impl EmbeddingRunner {
	async fn run(self, mut handle: JobHandle) {
		if let Err(err) = handle.start() {
			tracing::error!(error = %err, job_id = %handle.id(), "Failed to start embedding job.");

			return;
		}

		let retry = RetryPolicy::for_jobs(&self.jobs);
		let chunks = self.documents.chunks(self.jobs.batch_size.max(1)).collect::<Vec<_>>();
		let pending = handle.snapshot().checkpoint.pending_chunks();
		let skipped = chunks.len() - pending.len();
		let runner = &self;
		let mut vectors_written = 0;

		for (wave_idx, wave) in pending.chunks(self.jobs.concurrency.max(1)).enumerate() {
			if wave_idx > 0 && self.jobs.inter_batch_delay_ms > 0 {
				tokio::time::sleep(Duration::from_millis(self.jobs.inter_batch_delay_ms)).await;
			}

			let calls = wave.iter().map(|&chunk_index| {
				let retry = &retry;
				let chunk = chunks.get(chunk_index).copied();

				async move {
					let outcome = match chunk {
						Some(chunk) => {
							let tokens = runner.embed_chunk(chunk, retry).await;

							tokens.map(|tokens| (tokens, chunk.len()))
						},
						None => Err(Error::Validation {
							message: format!("Chunk {chunk_index} does not exist."),
						}),
					};

					(chunk_index, outcome)
				}
			});
			let mut failure: Option<JobFailure> = None;

			for (chunk_index, outcome) in future::join_all(calls).await {
				let recorded = outcome.and_then(|(tokens, written)| {
					vectors_written += written;

					handle.record_chunk(chunk_index, tokens, self.cost_for(tokens))
				});

				if let Err(err) = recorded
					&& failure.as_ref().is_none_or(|failure| chunk_index < failure.chunk_index)
				{
					failure = Some(JobFailure { chunk_index, reason: err.to_string() });
				}
			}

			if let Some(failure) = failure {
				if let Err(err) = handle.fail(failure) {
					tracing::error!(error = %err, "Failed to record embedding job failure.");
				}

				return;
			}
		}

		let result = json!({
			"documents": self.documents.len(),
			"chunks": chunks.len(),
			"chunks_skipped": skipped,
			"vectors_written": vectors_written,
		});

		if let Err(err) = handle.complete(result) {
			tracing::error!(error = %err, "Failed to complete embedding job.");
		}
	}

	/// Embeds and upserts one chunk. Returns the provider-reported token count.
	async fn embed_chunk(&self, chunk: &[TestCaseDocument], retry: &RetryPolicy) -> Result<u64> {
		let texts = chunk.iter().map(TestCaseDocument::embedding_text).collect::<Vec<_>>();
		let batch =
			retry.run("embed_batch", || self.embedding.embed(&self.embedding_cfg, &texts)).await?;

		if batch.vectors.len() != chunk.len() {
			return Err(Error::UpstreamUnavailable {
				message: format!(
					"Embedding provider returned {} vectors for {} documents.",
					batch.vectors.len(),
					chunk.len()
				),
			});
		}
		if batch.vectors.iter().any(|vector| vector.len() != self.embedding_cfg.dimensions as usize)
		{
			return Err(Error::UpstreamUnavailable {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		retry.run("upsert_batch", || self.store.upsert(chunk, &batch.vectors)).await?;

		Ok(batch.usage.total_tokens)
	}

	fn cost_for(&self, tokens: u64) -> f64 {
		tokens as f64 / 1_000.0 * self.jobs.cost_per_1k_tokens
	}
}

fn validate_documents(documents: &[TestCaseDocument]) -> Result<()> {
	if documents.is_empty() {
		return Err(Error::Validation { message: "documents must be non-empty.".to_string() });
	}

	let mut seen = HashSet::new();

	for document in documents {
		if document.id.trim().is_empty() {
			return Err(Error::Validation {
				message: "documents must have non-empty ids.".to_string(),
			});
		}
		if !seen.insert(document.id.as_str()) {
			return Err(Error::Validation {
				message: format!("document id {} appears more than once.", document.id),
			});
		}
	}

	Ok(())
}
