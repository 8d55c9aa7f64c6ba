//! Test support: an in-memory document store, deterministic providers and fixtures.

mod config;
mod providers;
mod store;

pub use config::{TEST_VECTOR_DIM, test_config};
pub use providers::{
	FailingScorer, FirstSentenceSummary, FlakyEmbedding, HashEmbedding, ScriptedScorer,
};
pub use store::InMemoryStore;

use std::sync::Arc;

use tcr_service::{EmbeddingProvider, Providers, ScoringProvider, TcrService};
use tcr_storage::models::{DocumentMetadata, TestCaseDocument};

pub fn test_case(id: &str, title: &str, description: &str) -> TestCaseDocument {
	TestCaseDocument {
		id: id.to_string(),
		title: title.to_string(),
		description: description.to_string(),
		steps: String::new(),
		expected_results: String::new(),
		pre_requisites: String::new(),
		metadata: DocumentMetadata::default(),
	}
}

pub fn test_case_in(id: &str, title: &str, module: &str, priority: i64) -> TestCaseDocument {
	let mut document = test_case(id, title, "");

	document.metadata.module = Some(module.to_string());
	document.metadata.priority = Some(priority);

	document
}

/// Providers backed by [`HashEmbedding`], a scorer that knows no ids and a first-sentence
/// summarizer.
pub fn test_providers() -> Providers {
	providers_with(
		Arc::new(HashEmbedding::new(TEST_VECTOR_DIM)),
		Arc::new(ScriptedScorer::default()),
	)
}

pub fn providers_with(
	embedding: Arc<dyn EmbeddingProvider>,
	scoring: Arc<dyn ScoringProvider>,
) -> Providers {
	Providers::new(embedding, scoring, Arc::new(FirstSentenceSummary))
}

/// A service over `store` using the test configuration.
pub fn test_service(store: Arc<InMemoryStore>, providers: Providers) -> TcrService {
	TcrService::with_providers(test_config(), store, providers).expect("Test service must build.")
}
