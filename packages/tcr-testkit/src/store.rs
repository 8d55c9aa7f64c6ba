use std::{
	cmp::Ordering,
	collections::BTreeMap,
	sync::{
		Mutex, PoisonError,
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering},
	},
	time::Duration,
};

use tcr_domain::normalize::{normalize, tokens};
use tcr_service::{BoxFuture, DocumentStore, Error, QueryClause, Result, RetrieverKind};
use tcr_storage::{
	filter::SearchFilters,
	models::{StoreHit, TestCaseDocument},
	qdrant::KeywordClause,
};

struct StoredDocument {
	document: TestCaseDocument,
	vector: Option<Vec<f32>>,
}

/// Document store backed by a map. Keyword search counts boosted (optionally fuzzy) term
/// matches per field; vector search is exact cosine similarity.
#[derive(Default)]
pub struct InMemoryStore {
	documents: Mutex<BTreeMap<String, StoredDocument>>,
	scripted: Mutex<BTreeMap<RetrieverKind, Vec<StoreHit>>>,
	fail_keyword: AtomicBool,
	fail_vector: AtomicBool,
	upsert_calls: AtomicUsize,
	search_calls: AtomicUsize,
	search_delay_ms: AtomicU64,
	in_flight: AtomicUsize,
	peak_in_flight: AtomicUsize,
}
impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_documents(documents: impl IntoIterator<Item = TestCaseDocument>) -> Self {
		let store = Self::new();

		store.insert(documents);

		store
	}

	/// Adds documents without vectors, visible to keyword search only.
	pub fn insert(&self, documents: impl IntoIterator<Item = TestCaseDocument>) {
		let mut stored = self.documents.lock().unwrap_or_else(PoisonError::into_inner);

		for document in documents {
			stored.insert(document.id.clone(), StoredDocument { document, vector: None });
		}
	}

	/// Makes every search against `kind` return `hits` as-is.
	pub fn script(&self, kind: RetrieverKind, hits: Vec<StoreHit>) {
		self.scripted.lock().unwrap_or_else(PoisonError::into_inner).insert(kind, hits);
	}

	pub fn fail(&self, kind: RetrieverKind, failing: bool) {
		match kind {
			RetrieverKind::Keyword => self.fail_keyword.store(failing, AtomicOrdering::SeqCst),
			RetrieverKind::Vector => self.fail_vector.store(failing, AtomicOrdering::SeqCst),
		}
	}

	pub fn vector(&self, id: &str) -> Option<Vec<f32>> {
		let stored = self.documents.lock().unwrap_or_else(PoisonError::into_inner);

		stored.get(id).and_then(|stored| stored.vector.clone())
	}

	pub fn indexed_ids(&self) -> Vec<String> {
		let stored = self.documents.lock().unwrap_or_else(PoisonError::into_inner);

		stored
			.values()
			.filter(|stored| stored.vector.is_some())
			.map(|stored| stored.document.id.clone())
			.collect()
	}

	pub fn upsert_calls(&self) -> usize {
		self.upsert_calls.load(AtomicOrdering::SeqCst)
	}

	pub fn search_calls(&self) -> usize {
		self.search_calls.load(AtomicOrdering::SeqCst)
	}

	/// Holds every search open for `delay` so overlapping calls become observable.
	pub fn set_search_delay(&self, delay: Duration) {
		self.search_delay_ms.store(delay.as_millis() as u64, AtomicOrdering::SeqCst);
	}

	/// Most searches that were running at the same time.
	pub fn peak_in_flight(&self) -> usize {
		self.peak_in_flight.load(AtomicOrdering::SeqCst)
	}

	fn search_now(
		&self,
		clause: &QueryClause,
		filters: &SearchFilters,
		limit: u32,
	) -> Result<Vec<StoreHit>> {
		let kind = match clause {
			QueryClause::Keyword(_) => RetrieverKind::Keyword,
			QueryClause::Vector(_) => RetrieverKind::Vector,
		};
		let failing = match kind {
			RetrieverKind::Keyword => self.fail_keyword.load(AtomicOrdering::SeqCst),
			RetrieverKind::Vector => self.fail_vector.load(AtomicOrdering::SeqCst),
		};

		if failing {
			return Err(Error::UpstreamUnavailable {
				message: format!("In-memory {kind} index is switched off."),
			});
		}

		let scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some(hits) = scripted.get(&kind) {
			return Ok(hits.iter().take(limit as usize).cloned().collect());
		}

		drop(scripted);

		let stored = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
		let mut hits = stored
			.values()
			.filter(|stored| filters.matches(&stored.document.metadata))
			.filter_map(|stored| {
				let score = match clause {
					QueryClause::Keyword(keyword) => keyword_score(keyword, &stored.document),
					QueryClause::Vector(query) => cosine(query, stored.vector.as_deref()?),
				};

				(score > 0.0).then(|| StoreHit { document: stored.document.clone(), score })
			})
			.collect::<Vec<_>>();

		hits.sort_by(|a, b| {
			b.score
				.partial_cmp(&a.score)
				.unwrap_or(Ordering::Equal)
				.then_with(|| a.document.id.cmp(&b.document.id))
		});
		hits.truncate(limit as usize);

		Ok(hits)
	}
}
impl DocumentStore for InMemoryStore {
	fn search<'a>(
		&'a self,
		clause: &'a QueryClause,
		filters: &'a SearchFilters,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		Box::pin(async move {
			let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
			let delay_ms = self.search_delay_ms.load(AtomicOrdering::SeqCst);

			self.search_calls.fetch_add(1, AtomicOrdering::SeqCst);

			if delay_ms > 0 {
				tokio::time::sleep(Duration::from_millis(delay_ms)).await;
			}

			self.search_now(clause, filters, limit)
		})
	}

	fn upsert<'a>(
		&'a self,
		documents: &'a [TestCaseDocument],
		vectors: &'a [Vec<f32>],
	) -> BoxFuture<'a, Result<()>> {
		self.upsert_calls.fetch_add(1, AtomicOrdering::SeqCst);

		let result = if documents.len() == vectors.len() {
			let mut stored = self.documents.lock().unwrap_or_else(PoisonError::into_inner);

			for (document, vector) in documents.iter().zip(vectors) {
				stored.insert(
					document.id.clone(),
					StoredDocument { document: document.clone(), vector: Some(vector.clone()) },
				);
			}

			Ok(())
		} else {
			Err(Error::Validation {
				message: "documents and vectors differ in length.".to_string(),
			})
		};

		Box::pin(async move { result })
	}
}

struct InFlight<'a> {
	current: &'a AtomicUsize,
}
impl<'a> InFlight<'a> {
	fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
		let now = current.fetch_add(1, AtomicOrdering::SeqCst) + 1;

		peak.fetch_max(now, AtomicOrdering::SeqCst);

		Self { current }
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.current.fetch_sub(1, AtomicOrdering::SeqCst);
	}
}

fn keyword_score(clause: &KeywordClause, document: &TestCaseDocument) -> f32 {
	let query = normalize(&clause.text);
	let terms = tokens(&query).collect::<Vec<_>>();

	clause
		.field_boosts
		.iter()
		.filter_map(|(field, boost)| Some((document.field(field)?, boost)))
		.map(|(text, boost)| {
			let field_text = normalize(text);
			let field_terms = tokens(&field_text).collect::<Vec<_>>();
			let matched = terms
				.iter()
				.filter(|term| {
					field_terms.iter().any(|candidate| {
						tcr_domain::fuzzy_match(
							term,
							candidate,
							clause.fuzzy.max_edits,
							clause.fuzzy.prefix_length,
						)
					})
				})
				.count();

			matched as f32 * boost
		})
		.sum()
}

fn cosine(left: &[f32], right: &[f32]) -> f32 {
	if left.len() != right.len() {
		return 0.0;
	}

	let dot = left.iter().zip(right).map(|(l, r)| l * r).sum::<f32>();
	let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
	let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	dot / (left_norm * right_norm)
}
