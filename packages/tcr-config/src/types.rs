use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Fields of a test case that the keyword index scores.
pub const BOOSTABLE_FIELDS: [&str; 7] =
	["id", "title", "module", "description", "expected_results", "steps", "pre_requisites"];
/// Metadata fields that search filters may constrain.
pub const FILTERABLE_FIELDS: [&str; 4] = ["module", "priority", "risk", "category"];
/// Hard ceiling on how many candidates a single retriever call may request.
pub const MAX_TOP_N: u32 = 100;
/// Hard ceiling on how many fused candidates are sent to the scoring service.
pub const MAX_RERANK_CANDIDATES: usize = 20;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub preprocess: Preprocess,
	pub search: Search,
	pub rerank: Rerank,
	pub dedupe: Dedupe,
	pub jobs: Jobs,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
	pub timeout_ms: u64,
	/// Optional. Blank values are treated as absent.
	pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	/// Chat model used for relevance scoring and summarization.
	pub scoring: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Preprocess {
	#[serde(default = "default_identifier_pattern")]
	pub identifier_pattern: String,
	#[serde(default = "default_true")]
	pub preserve_identifiers: bool,
	#[serde(default = "default_max_synonym_variations")]
	pub max_synonym_variations: usize,
	/// Token to expansion, e.g. `pwd = "password"`.
	#[serde(default)]
	pub abbreviations: BTreeMap<String, String>,
	/// Content word to its alternatives, tried in list order.
	#[serde(default)]
	pub synonyms: BTreeMap<String, Vec<String>>,
}
impl Default for Preprocess {
	fn default() -> Self {
		Self {
			identifier_pattern: default_identifier_pattern(),
			preserve_identifiers: true,
			max_synonym_variations: default_max_synonym_variations(),
			abbreviations: BTreeMap::new(),
			synonyms: BTreeMap::new(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Search {
	pub default_limit: u32,
	#[serde(default = "default_max_top_n")]
	pub max_top_n: u32,
	/// Maximum number of retriever calls in flight for one request.
	pub concurrency_limit: usize,
	pub retriever_timeout_ms: u64,
	pub weights: FusionWeights,
	#[serde(default = "default_field_boosts")]
	pub field_boosts: BTreeMap<String, f32>,
	#[serde(default)]
	pub fuzzy: Fuzzy,
	pub retry: Retry,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FusionWeights {
	pub keyword: f32,
	pub vector: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Fuzzy {
	pub max_edits: u8,
	pub prefix_length: u8,
}
impl Default for Fuzzy {
	fn default() -> Self {
		Self { max_edits: 1, prefix_length: 2 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Rerank {
	pub enabled: bool,
	pub max_candidates: usize,
	pub concurrency: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Dedupe {
	pub enabled: bool,
	pub similarity_threshold: f32,
	/// One of `jaccard` or `cosine`.
	pub measure: String,
	pub summarize: bool,
	pub summary_max_chars: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Jobs {
	/// How long a terminal job stays pollable.
	pub retention_secs: u64,
	pub purge_interval_secs: u64,
	/// Documents per chunk.
	pub batch_size: usize,
	/// Chunks processed per wave.
	pub concurrency: usize,
	pub inter_batch_delay_ms: u64,
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub cost_per_1k_tokens: f64,
}

fn default_true() -> bool {
	true
}

fn default_identifier_pattern() -> String {
	r"\b[A-Za-z][A-Za-z0-9]{1,9}-\d{1,6}\b".to_string()
}

fn default_max_synonym_variations() -> usize {
	5
}

fn default_max_top_n() -> u32 {
	MAX_TOP_N
}

fn default_field_boosts() -> BTreeMap<String, f32> {
	[
		("id", 10.0),
		("title", 5.0),
		("module", 3.0),
		("description", 2.0),
		("expected_results", 1.5),
		("steps", 1.0),
		("pre_requisites", 0.8),
	]
	.into_iter()
	.map(|(field, boost)| (field.to_string(), boost))
	.collect()
}
