use std::collections::{BTreeMap, HashSet};

use crate::normalize::{normalize, tokens};

const STOPWORDS: [&str; 32] = [
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its",
	"of", "on", "or", "that", "the", "this", "to", "was", "when", "where", "which", "while", "who",
	"will", "with", "without", "should",
];

/// Immutable abbreviation and synonym tables, keyed by normalized single tokens.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
	abbreviations: BTreeMap<String, String>,
	synonyms: BTreeMap<String, Vec<String>>,
}
impl Lexicon {
	pub fn new(
		abbreviations: &BTreeMap<String, String>,
		synonyms: &BTreeMap<String, Vec<String>>,
	) -> Self {
		let abbreviations = abbreviations
			.iter()
			.filter_map(|(key, expansion)| {
				let key = normalize(key);
				let expansion = normalize(expansion);

				(!key.is_empty() && !expansion.is_empty()).then_some((key, expansion))
			})
			.collect();
		let synonyms = synonyms
			.iter()
			.filter_map(|(key, alternatives)| {
				let key = normalize(key);
				let mut seen = HashSet::new();
				let alternatives = alternatives
					.iter()
					.map(|alt| normalize(alt))
					.filter(|alt| !alt.is_empty() && *alt != key && seen.insert(alt.clone()))
					.collect::<Vec<_>>();

				(!key.is_empty() && !alternatives.is_empty()).then_some((key, alternatives))
			})
			.collect();

		Self { abbreviations, synonyms }
	}

	pub fn from_config(cfg: &tcr_config::Preprocess) -> Self {
		Self::new(&cfg.abbreviations, &cfg.synonyms)
	}

	/// Expands every known abbreviation token. Returns `None` when nothing changed.
	pub fn expand_abbreviations(&self, normalized: &str) -> Option<String> {
		let mut changed = false;
		let expanded = tokens(normalized)
			.map(|token| match self.abbreviations.get(token) {
				Some(expansion) => {
					changed = true;

					expansion.as_str()
				},
				None => token,
			})
			.collect::<Vec<_>>()
			.join(" ");

		changed.then_some(expanded)
	}

	/// Substitutes one content word at a time. Entries are visited in mapping order (sorted by
	/// key), then each occurrence of the key left to right, then its alternatives in list order.
	/// At most `cap` variants are produced.
	pub fn synonym_variants(&self, normalized: &str, cap: usize) -> Vec<String> {
		let words = tokens(normalized).collect::<Vec<_>>();
		let mut out = Vec::new();

		for (key, alternatives) in &self.synonyms {
			if is_stopword(key) {
				continue;
			}

			let positions = words
				.iter()
				.enumerate()
				.filter(|(_, word)| **word == key.as_str())
				.map(|(idx, _)| idx);

			for idx in positions {
				for alternative in alternatives {
					if out.len() >= cap {
						return out;
					}

					let mut replaced = words.clone();

					replaced[idx] = alternative.as_str();

					out.push(replaced.join(" "));
				}
			}
		}

		out
	}

	pub fn is_empty(&self) -> bool {
		self.abbreviations.is_empty() && self.synonyms.is_empty()
	}
}

pub fn is_stopword(token: &str) -> bool {
	STOPWORDS.contains(&token)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lexicon() -> Lexicon {
		let abbreviations = BTreeMap::from([
			("PWD".to_string(), "password".to_string()),
			("ui".to_string(), "User Interface".to_string()),
		]);
		let synonyms = BTreeMap::from([
			("reset".to_string(), vec!["recover".to_string(), "change".to_string()]),
			("the".to_string(), vec!["a".to_string()]),
		]);

		Lexicon::new(&abbreviations, &synonyms)
	}

	#[test]
	fn expands_known_abbreviations_once() {
		let lexicon = lexicon();

		assert_eq!(lexicon.expand_abbreviations("pwd reset").as_deref(), Some("password reset"));
		assert_eq!(
			lexicon.expand_abbreviations("ui pwd").as_deref(),
			Some("user interface password")
		);
		assert_eq!(lexicon.expand_abbreviations("login fails"), None);
	}

	#[test]
	fn synonym_variants_skip_stopwords_and_respect_cap() {
		let lexicon = lexicon();

		assert_eq!(
			lexicon.synonym_variants("reset the password", 5),
			vec!["recover the password".to_string(), "change the password".to_string()]
		);
		assert_eq!(lexicon.synonym_variants("reset the password", 1).len(), 1);
		assert!(lexicon.synonym_variants("reset", 0).is_empty());
	}

	#[test]
	fn synonym_variants_follow_mapping_order() {
		let synonyms = BTreeMap::from([
			("reset".to_string(), vec!["recover".to_string()]),
			("login".to_string(), vec!["sign in".to_string(), "logon".to_string()]),
		]);
		let lexicon = Lexicon::new(&BTreeMap::new(), &synonyms);

		assert_eq!(
			lexicon.synonym_variants("reset login", 5),
			vec![
				"reset sign in".to_string(),
				"reset logon".to_string(),
				"recover login".to_string(),
			]
		);
		assert_eq!(lexicon.synonym_variants("reset login", 1), vec!["reset sign in".to_string()]);
	}
}
