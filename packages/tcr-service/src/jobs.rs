//! In-process registry for long-running batch jobs.
//!
//! Every job has exactly one [`JobHandle`], owned by the task executing it. The handle publishes
//! snapshots through a `watch` channel; readers only ever see whole snapshots.

use std::{
	collections::{BTreeSet, HashMap},
	fmt::{Display, Formatter, Result as FmtResult},
	sync::{Arc, PoisonError, RwLock},
	time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{Error, Result, TcrService, batch_rerank::RerankItem};
use tcr_storage::models::TestCaseDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Processing,
	Completed,
	Failed,
}
impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}

	/// Status only moves forward: `queued -> processing -> {completed, failed}`. A queued job
	/// may also fail before it starts.
	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Queued, Self::Processing)
				| (Self::Queued, Self::Failed)
				| (Self::Processing, Self::Completed)
				| (Self::Processing, Self::Failed)
		)
	}
}
impl Display for JobStatus {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Queued => f.write_str("queued"),
			Self::Processing => f.write_str("processing"),
			Self::Completed => f.write_str("completed"),
			Self::Failed => f.write_str("failed"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
	Embedding,
	BatchRerank,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobMetrics {
	pub tokens: u64,
	pub cost_estimate: f64,
	pub elapsed_ms: u64,
}

/// Which chunks of the job's input are done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCheckpoint {
	pub total_chunks: usize,
	pub completed_chunks: BTreeSet<usize>,
}
impl JobCheckpoint {
	pub fn new(total_chunks: usize) -> Self {
		Self { total_chunks, completed_chunks: BTreeSet::new() }
	}

	pub fn pending_chunks(&self) -> Vec<usize> {
		(0..self.total_chunks).filter(|idx| !self.completed_chunks.contains(idx)).collect()
	}

	/// Percentage of completed chunks. An empty job counts as done.
	pub fn progress(&self) -> f32 {
		if self.total_chunks == 0 {
			return 100.0;
		}

		self.completed_chunks.len() as f32 / self.total_chunks as f32 * 100.0
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
	pub chunk_index: usize,
	pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
	pub id: Uuid,
	pub kind: JobKind,
	pub status: JobStatus,
	pub progress: f32,
	pub metrics: JobMetrics,
	pub checkpoint: JobCheckpoint,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<JobFailure>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	pub resumed_from: Option<Uuid>,
	/// Set once a resumed job has taken over this one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resumed_by: Option<Uuid>,
	#[serde(serialize_with = "crate::time_serde::serialize")]
	pub created_at: OffsetDateTime,
	#[serde(serialize_with = "crate::time_serde::serialize")]
	pub updated_at: OffsetDateTime,
	#[serde(serialize_with = "crate::time_serde::option::serialize")]
	pub finished_at: Option<OffsetDateTime>,
}

/// The input a job was submitted with, kept so a failed job can be resumed.
#[derive(Debug, Clone)]
pub enum JobInput {
	Embedding(Arc<Vec<TestCaseDocument>>),
	BatchRerank(Arc<Vec<RerankItem>>),
}

struct JobEntry {
	rx: watch::Receiver<JobSnapshot>,
	input: JobInput,
	resumed_by: Option<Uuid>,
}
impl JobEntry {
	fn snapshot(&self) -> JobSnapshot {
		let mut snapshot = self.rx.borrow().clone();

		snapshot.resumed_by = self.resumed_by;

		snapshot
	}

	/// A failed job hands its pending chunks to exactly one successor.
	fn claim_resume(&mut self, id: Uuid, successor: Uuid) -> Result<()> {
		let status = self.rx.borrow().status;

		if status != JobStatus::Failed {
			return Err(Error::Conflict {
				message: format!("Job {id} is {status} and only failed jobs can be resumed."),
			});
		}
		if let Some(resumed_by) = self.resumed_by {
			return Err(Error::Conflict {
				message: format!("Job {id} was already resumed as {resumed_by}."),
			});
		}

		self.resumed_by = Some(successor);

		Ok(())
	}
}

pub struct JobTracker {
	jobs: RwLock<HashMap<Uuid, JobEntry>>,
	retention: Duration,
}
impl JobTracker {
	pub fn new(retention: Duration) -> Self {
		Self { jobs: RwLock::new(HashMap::new()), retention }
	}

	pub fn register(
		&self,
		kind: JobKind,
		input: JobInput,
		checkpoint: JobCheckpoint,
		resumed_from: Option<Uuid>,
	) -> Result<JobHandle> {
		let now = OffsetDateTime::now_utc();
		let snapshot = JobSnapshot {
			id: Uuid::new_v4(),
			kind,
			status: JobStatus::Queued,
			progress: checkpoint.progress(),
			metrics: JobMetrics::default(),
			checkpoint,
			failure: None,
			result: None,
			resumed_from,
			resumed_by: None,
			created_at: now,
			updated_at: now,
			finished_at: None,
		};
		let id = snapshot.id;
		let (tx, rx) = watch::channel(snapshot);

		{
			let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

			if let Some(previous) = resumed_from {
				let entry = jobs.get_mut(&previous).ok_or_else(|| not_found(previous))?;

				entry.claim_resume(previous, id)?;
			}

			jobs.insert(id, JobEntry { rx, input, resumed_by: None });
		}

		tracing::info!(job_id = %id, ?kind, "Job registered.");

		Ok(JobHandle { id, tx, started: Instant::now() })
	}

	pub fn get(&self, id: Uuid) -> Result<JobSnapshot> {
		let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);

		jobs.get(&id).map(JobEntry::snapshot).ok_or_else(|| not_found(id))
	}

	pub fn input(&self, id: Uuid) -> Result<JobInput> {
		let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);

		jobs.get(&id).map(|entry| entry.input.clone()).ok_or_else(|| not_found(id))
	}

	pub fn len(&self) -> usize {
		self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Resolves once the job is completed or failed.
	pub async fn wait_for_terminal(&self, id: Uuid) -> Result<JobSnapshot> {
		let mut rx = {
			let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);

			jobs.get(&id).map(|entry| entry.rx.clone()).ok_or_else(|| not_found(id))?
		};
		// A closed channel means the handle is gone and its last snapshot is final.
		let _ = rx.wait_for(|snapshot| snapshot.status.is_terminal()).await;

		// Picks up `resumed_by`, which lives outside the channel.
		self.get(id).or_else(|_| Ok(rx.borrow().clone()))
	}

	/// Drops terminal jobs that finished at least `retention` before `now`. Queued and
	/// processing jobs are never removed. Returns the number of purged jobs.
	pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
		let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
		let before = jobs.len();

		jobs.retain(|_, entry| {
			let snapshot = entry.rx.borrow();

			match snapshot.finished_at {
				Some(finished_at) if snapshot.status.is_terminal() =>
					now - finished_at < self.retention,
				_ => true,
			}
		});

		let purged = before - jobs.len();

		if purged > 0 {
			tracing::info!(purged, "Expired jobs purged.");
		}

		purged
	}
}

/// Sole writer for one job.
pub struct JobHandle {
	id: Uuid,
	tx: watch::Sender<JobSnapshot>,
	started: Instant,
}
impl JobHandle {
	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn snapshot(&self) -> JobSnapshot {
		self.tx.borrow().clone()
	}

	pub fn start(&mut self) -> Result<()> {
		self.check_transition(JobStatus::Processing)?;
		self.publish(|snapshot| snapshot.status = JobStatus::Processing);

		Ok(())
	}

	/// Marks `chunk_index` done and adds its usage to the metrics.
	pub fn record_chunk(&mut self, chunk_index: usize, tokens: u64, cost: f64) -> Result<()> {
		{
			let current = self.tx.borrow();

			if current.status != JobStatus::Processing {
				return Err(Error::Conflict {
					message: format!(
						"Job {} is {} and cannot record chunks.",
						self.id, current.status
					),
				});
			}
			if chunk_index >= current.checkpoint.total_chunks {
				return Err(Error::Conflict {
					message: format!("Chunk {chunk_index} is out of range for job {}.", self.id),
				});
			}
		}

		self.publish(|snapshot| {
			snapshot.checkpoint.completed_chunks.insert(chunk_index);

			snapshot.progress = snapshot.checkpoint.progress();
			snapshot.metrics.tokens += tokens;
			snapshot.metrics.cost_estimate += cost;
		});

		Ok(())
	}

	/// Sets progress directly. Moving backwards is rejected.
	pub fn set_progress(&mut self, progress: f32) -> Result<()> {
		let current = self.tx.borrow().progress;

		if !progress.is_finite() || progress < current || progress > 100.0 {
			return Err(Error::Conflict {
				message: format!(
					"Progress for job {} cannot move from {current} to {progress}.",
					self.id
				),
			});
		}

		self.publish(|snapshot| snapshot.progress = progress);

		Ok(())
	}

	pub fn complete(mut self, result: Value) -> Result<JobSnapshot> {
		self.check_transition(JobStatus::Completed)?;
		self.publish(|snapshot| {
			snapshot.status = JobStatus::Completed;
			snapshot.progress = 100.0;
			snapshot.result = Some(result);
			snapshot.finished_at = Some(snapshot.updated_at);
		});

		tracing::info!(job_id = %self.id, "Job completed.");

		Ok(self.snapshot())
	}

	pub fn fail(mut self, failure: JobFailure) -> Result<JobSnapshot> {
		self.check_transition(JobStatus::Failed)?;

		tracing::warn!(
			job_id = %self.id,
			chunk_index = failure.chunk_index,
			reason = %failure.reason,
			"Job failed."
		);

		self.publish(|snapshot| {
			snapshot.status = JobStatus::Failed;
			snapshot.failure = Some(failure);
			snapshot.finished_at = Some(snapshot.updated_at);
		});

		Ok(self.snapshot())
	}

	fn check_transition(&self, next: JobStatus) -> Result<()> {
		let current = self.tx.borrow().status;

		if !current.can_transition_to(next) {
			return Err(Error::Conflict {
				message: format!("Job {} cannot move from {current} to {next}.", self.id),
			});
		}

		Ok(())
	}

	fn publish(&mut self, update: impl FnOnce(&mut JobSnapshot)) {
		let elapsed_ms = self.started.elapsed().as_millis() as u64;

		self.tx.send_modify(|snapshot| {
			snapshot.updated_at = OffsetDateTime::now_utc();
			snapshot.metrics.elapsed_ms = elapsed_ms;

			update(snapshot);
		});
	}
}
impl Drop for JobHandle {
	fn drop(&mut self) {
		let (status, chunk_index) = {
			let current = self.tx.borrow();

			(current.status, current.checkpoint.pending_chunks().first().copied().unwrap_or(0))
		};

		if status.is_terminal() {
			return;
		}

		tracing::warn!(job_id = %self.id, %status, "Job handle dropped before finishing.");

		self.tx.send_modify(|snapshot| {
			let now = OffsetDateTime::now_utc();

			snapshot.status = JobStatus::Failed;
			snapshot.failure = Some(JobFailure {
				chunk_index,
				reason: "Job stopped before reaching a terminal state.".to_string(),
			});
			snapshot.updated_at = now;
			snapshot.finished_at = Some(now);
		});
	}
}

impl TcrService {
	pub fn job(&self, id: Uuid) -> Result<JobSnapshot> {
		self.jobs.get(id)
	}

	/// Starts a new job from a failed one. Completed chunks are carried over and skipped. A
	/// failed job can be resumed once; later attempts are a conflict.
	pub fn resume_job(&self, id: Uuid) -> Result<JobSnapshot> {
		let previous = self.jobs.get(id)?;
		let snapshot = match self.jobs.input(id)? {
			JobInput::Embedding(documents) =>
				self.spawn_embedding_job(documents, previous.checkpoint, Some(id))?,
			JobInput::BatchRerank(items) =>
				self.spawn_batch_rerank_job(items, previous.checkpoint, Some(id))?,
		};

		tracing::info!(job_id = %snapshot.id, resumed_from = %id, "Job resumed.");

		Ok(snapshot)
	}
}

fn not_found(id: Uuid) -> Error {
	Error::NotFound { message: format!("Job {id} was not found.") }
}
