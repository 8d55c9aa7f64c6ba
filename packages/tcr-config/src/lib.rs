mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	BOOSTABLE_FIELDS, Config, Dedupe, EmbeddingProviderConfig, FILTERABLE_FIELDS, FusionWeights,
	Fuzzy, Jobs, LlmProviderConfig, MAX_RERANK_CANDIDATES, MAX_TOP_N, Preprocess, Providers,
	Qdrant, Rerank, Retry, Search, Service, Storage,
};

use std::{fs, path::Path};

/// Tolerance applied when checking that fusion weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, timeout_ms) in [
		("storage.qdrant.timeout_ms", cfg.storage.qdrant.timeout_ms),
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.scoring.timeout_ms", cfg.providers.scoring.timeout_ms),
		("search.retriever_timeout_ms", cfg.search.retriever_timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("scoring", &cfg.providers.scoring.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	validate_preprocess(cfg)?;
	validate_search(cfg)?;

	if cfg.rerank.max_candidates == 0 || cfg.rerank.max_candidates > MAX_RERANK_CANDIDATES {
		return Err(Error::Validation {
			message: format!(
				"rerank.max_candidates must be in the range 1-{MAX_RERANK_CANDIDATES}."
			),
		});
	}
	if cfg.rerank.concurrency == 0 {
		return Err(Error::Validation {
			message: "rerank.concurrency must be greater than zero.".to_string(),
		});
	}
	if !cfg.dedupe.similarity_threshold.is_finite()
		|| !(0.0..=1.0).contains(&cfg.dedupe.similarity_threshold)
	{
		return Err(Error::Validation {
			message: "dedupe.similarity_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !matches!(cfg.dedupe.measure.as_str(), "jaccard" | "cosine") {
		return Err(Error::Validation {
			message: "dedupe.measure must be one of jaccard or cosine.".to_string(),
		});
	}
	if cfg.dedupe.summarize && cfg.dedupe.summary_max_chars == 0 {
		return Err(Error::Validation {
			message: "dedupe.summary_max_chars must be greater than zero when summarize is enabled."
				.to_string(),
		});
	}

	validate_jobs(cfg)?;

	Ok(())
}

fn validate_preprocess(cfg: &Config) -> Result<()> {
	let preprocess = &cfg.preprocess;

	if preprocess.identifier_pattern.trim().is_empty() {
		return Err(Error::Validation {
			message: "preprocess.identifier_pattern must be non-empty.".to_string(),
		});
	}

	regex::Regex::new(&preprocess.identifier_pattern)
		.map_err(|err| Error::IdentifierPattern { source: err })?;

	for (abbreviation, expansion) in &preprocess.abbreviations {
		if abbreviation.trim().is_empty() || expansion.trim().is_empty() {
			return Err(Error::Validation {
				message: "preprocess.abbreviations entries must be non-empty.".to_string(),
			});
		}
	}
	for (word, alternatives) in &preprocess.synonyms {
		if word.trim().is_empty() {
			return Err(Error::Validation {
				message: "preprocess.synonyms keys must be non-empty.".to_string(),
			});
		}
		if alternatives.iter().any(|alt| alt.trim().is_empty()) {
			return Err(Error::Validation {
				message: format!("preprocess.synonyms.{word} must not contain empty entries."),
			});
		}
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	if search.max_top_n == 0 || search.max_top_n > MAX_TOP_N {
		return Err(Error::Validation {
			message: format!("search.max_top_n must be in the range 1-{MAX_TOP_N}."),
		});
	}
	if search.default_limit == 0 || search.default_limit > search.max_top_n {
		return Err(Error::Validation {
			message: "search.default_limit must be between 1 and search.max_top_n.".to_string(),
		});
	}
	if search.concurrency_limit == 0 {
		return Err(Error::Validation {
			message: "search.concurrency_limit must be greater than zero.".to_string(),
		});
	}

	check_weights(search.weights.keyword, search.weights.vector)
		.map_err(|message| Error::Validation { message: format!("search.weights {message}") })?;

	if search.field_boosts.is_empty() {
		return Err(Error::Validation {
			message: "search.field_boosts must be non-empty.".to_string(),
		});
	}

	for (field, boost) in &search.field_boosts {
		if !BOOSTABLE_FIELDS.contains(&field.as_str()) {
			return Err(Error::Validation {
				message: format!("search.field_boosts.{field} is not a boostable field."),
			});
		}
		if !boost.is_finite() || *boost <= 0.0 {
			return Err(Error::Validation {
				message: format!("search.field_boosts.{field} must be a positive finite number."),
			});
		}
	}

	if search.fuzzy.max_edits > 2 {
		return Err(Error::Validation {
			message: "search.fuzzy.max_edits must be 2 or less.".to_string(),
		});
	}
	if search.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "search.retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if search.retry.base_backoff_ms > search.retry.max_backoff_ms {
		return Err(Error::Validation {
			message: "search.retry.base_backoff_ms must not exceed search.retry.max_backoff_ms."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_jobs(cfg: &Config) -> Result<()> {
	let jobs = &cfg.jobs;

	for (label, value) in [
		("jobs.retention_secs", jobs.retention_secs),
		("jobs.purge_interval_secs", jobs.purge_interval_secs),
		("jobs.batch_size", jobs.batch_size as u64),
		("jobs.concurrency", jobs.concurrency as u64),
		("jobs.max_attempts", u64::from(jobs.max_attempts)),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if jobs.base_backoff_ms > jobs.max_backoff_ms {
		return Err(Error::Validation {
			message: "jobs.base_backoff_ms must not exceed jobs.max_backoff_ms.".to_string(),
		});
	}
	if !jobs.cost_per_1k_tokens.is_finite() || jobs.cost_per_1k_tokens < 0.0 {
		return Err(Error::Validation {
			message: "jobs.cost_per_1k_tokens must be a finite number zero or greater.".to_string(),
		});
	}

	Ok(())
}

/// Checks a keyword/vector weight pair. The returned message is a predicate fragment so callers
/// can prefix the field path.
pub fn check_weights(keyword: f32, vector: f32) -> std::result::Result<(), String> {
	if !keyword.is_finite() || !vector.is_finite() {
		return Err("must be finite numbers.".to_string());
	}
	if keyword < 0.0 || vector < 0.0 {
		return Err("must be zero or greater.".to_string());
	}
	if (keyword + vector - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
		return Err("must sum to 1.0.".to_string());
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.qdrant.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.storage.qdrant.api_key = None;
	}

	let preprocess = &mut cfg.preprocess;

	preprocess.abbreviations = std::mem::take(&mut preprocess.abbreviations)
		.into_iter()
		.map(|(abbreviation, expansion)| {
			(abbreviation.trim().to_lowercase(), expansion.trim().to_lowercase())
		})
		.collect();
	preprocess.synonyms = std::mem::take(&mut preprocess.synonyms)
		.into_iter()
		.map(|(word, alternatives)| {
			(
				word.trim().to_lowercase(),
				alternatives.into_iter().map(|alt| alt.trim().to_lowercase()).collect(),
			)
		})
		.collect();
}
