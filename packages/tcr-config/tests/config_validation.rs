use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use tcr_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let mut path = env::temp_dir();

	path.push(format!("tcr_config_test_{nanos}_{}_{ordinal}.toml", std::process::id()));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> tcr_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = tcr_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

fn assert_validation(cfg: &Config, expected: &str) {
	let err = tcr_config::validate(cfg).expect_err("Expected validation error.");

	assert!(err.to_string().contains(expected), "Unexpected error: {err}");
}

#[test]
fn tcr_example_toml_is_valid() {
	let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

	path.push("../../tcr.example.toml");

	tcr_config::load(&path).expect("Expected tcr.example.toml to be a valid config.");
}

#[test]
fn load_normalizes_blank_qdrant_api_key_and_lexicon_case() {
	let payload = sample_toml_with("preprocess.abbreviations", "  PWD ", Value::String("Password".into()));
	let cfg = load_payload(payload).expect("Expected config to load.");

	assert!(cfg.storage.qdrant.api_key.is_none());
	assert_eq!(cfg.preprocess.abbreviations.get("pwd").map(String::as_str), Some("password"));
}

#[test]
fn missing_preprocess_section_uses_defaults() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");

	root.as_table_mut().expect("Sample config must be a table.").remove("preprocess");

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render config."))
		.expect("Expected config to load.");

	assert!(cfg.preprocess.preserve_identifiers);
	assert_eq!(cfg.preprocess.max_synonym_variations, 5);
	assert!(cfg.preprocess.abbreviations.is_empty());
}

#[test]
fn default_field_boosts_apply_when_table_is_omitted() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");

	root.get_mut("search")
		.and_then(Value::as_table_mut)
		.expect("Sample config must include [search].")
		.remove("field_boosts");

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render config."))
		.expect("Expected config to load.");

	assert_eq!(cfg.search.field_boosts.get("id"), Some(&10.0));
	assert_eq!(cfg.search.field_boosts.get("pre_requisites"), Some(&0.8));
	assert_eq!(cfg.search.field_boosts.len(), tcr_config::BOOSTABLE_FIELDS.len());
}

#[test]
fn invalid_identifier_pattern_is_rejected() {
	let payload = sample_toml_with("preprocess", "identifier_pattern", Value::String("[A-Z".into()));
	let err = load_payload(payload).expect_err("Expected pattern error.");

	assert!(matches!(err, Error::IdentifierPattern { .. }), "Unexpected error: {err}");
}

#[test]
fn weights_must_sum_to_one() {
	let mut cfg = base_config();

	cfg.search.weights.keyword = 0.7;
	cfg.search.weights.vector = 0.7;

	assert_validation(&cfg, "search.weights must sum to 1.0.");
}

#[test]
fn weights_within_tolerance_are_accepted() {
	let mut cfg = base_config();

	cfg.search.weights.keyword = 0.3333;
	cfg.search.weights.vector = 0.6666;

	tcr_config::validate(&cfg).expect("Expected weights within tolerance to validate.");
}

#[test]
fn weights_must_be_non_negative_and_finite() {
	let mut cfg = base_config();

	cfg.search.weights.keyword = -0.5;
	cfg.search.weights.vector = 1.5;

	assert_validation(&cfg, "search.weights must be zero or greater.");

	cfg.search.weights.keyword = f32::NAN;

	assert_validation(&cfg, "search.weights must be finite numbers.");
}

#[test]
fn default_limit_must_be_within_max_top_n() {
	let mut cfg = base_config();

	cfg.search.default_limit = 0;

	assert_validation(&cfg, "search.default_limit must be between 1 and search.max_top_n.");

	cfg.search.default_limit = 101;

	assert_validation(&cfg, "search.default_limit must be between 1 and search.max_top_n.");
}

#[test]
fn max_top_n_cannot_exceed_hard_limit() {
	let mut cfg = base_config();

	cfg.search.max_top_n = 500;

	assert_validation(&cfg, "search.max_top_n must be in the range 1-100.");
}

#[test]
fn unknown_boost_field_is_rejected() {
	let mut cfg = base_config();

	cfg.search.field_boosts.insert("owner".to_string(), 1.0);

	assert_validation(&cfg, "search.field_boosts.owner is not a boostable field.");
}

#[test]
fn rerank_candidates_are_capped() {
	let mut cfg = base_config();

	cfg.rerank.max_candidates = 21;

	assert_validation(&cfg, "rerank.max_candidates must be in the range 1-20.");
}

#[test]
fn dedupe_measure_must_be_known() {
	let mut cfg = base_config();

	cfg.dedupe.measure = "levenshtein".to_string();

	assert_validation(&cfg, "dedupe.measure must be one of jaccard or cosine.");
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut cfg = base_config();

	cfg.providers.embedding.dimensions = 768;

	assert_validation(&cfg, "providers.embedding.dimensions must match storage.qdrant.vector_dim.");
}

#[test]
fn job_batch_size_must_be_positive() {
	let mut cfg = base_config();

	cfg.jobs.batch_size = 0;

	assert_validation(&cfg, "jobs.batch_size must be greater than zero.");
}

#[test]
fn empty_synonym_entries_are_rejected() {
	let mut cfg = base_config();

	cfg.preprocess.synonyms.insert("login".to_string(), vec![" ".to_string()]);

	assert_validation(&cfg, "preprocess.synonyms.login must not contain empty entries.");
}
