use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Serialize, Serializer};
use unicode_normalization::UnicodeNormalization;

use crate::{identifiers::IdentifierExtractor, lexicon::Lexicon, normalize::normalize};

/// Where a query variant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantProvenance {
	Original,
	AbbreviationExpanded,
	/// One-based position among the synonym variants.
	Synonym(usize),
}
impl Display for VariantProvenance {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Original => f.write_str("original"),
			Self::AbbreviationExpanded => f.write_str("abbreviation-expanded"),
			Self::Synonym(n) => write!(f, "synonym-{n}"),
		}
	}
}
impl Serialize for VariantProvenance {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(self)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryVariant {
	pub text: String,
	pub provenance: VariantProvenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
	pub raw: String,
	/// Normalized query text without preserved identifiers.
	pub normalized: String,
	pub identifiers: Vec<String>,
	/// Always starts with the original variant.
	pub variants: Vec<QueryVariant>,
}
impl QueryPlan {
	/// True when there is nothing left to search for.
	pub fn is_blank(&self) -> bool {
		self.normalized.is_empty() && self.identifiers.is_empty()
	}
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
	pub preserve_identifiers: bool,
	pub expand_abbreviations: bool,
	pub expand_synonyms: bool,
	pub max_synonym_variations: usize,
}

#[derive(Debug, Clone)]
pub struct QueryPreprocessor {
	extractor: IdentifierExtractor,
	lexicon: Lexicon,
	defaults: PreprocessOptions,
}
impl QueryPreprocessor {
	pub fn new(cfg: &tcr_config::Preprocess) -> Result<Self, regex::Error> {
		Ok(Self {
			extractor: IdentifierExtractor::new(&cfg.identifier_pattern)?,
			lexicon: Lexicon::from_config(cfg),
			defaults: PreprocessOptions {
				preserve_identifiers: cfg.preserve_identifiers,
				expand_abbreviations: true,
				expand_synonyms: true,
				max_synonym_variations: cfg.max_synonym_variations,
			},
		})
	}

	pub fn defaults(&self) -> PreprocessOptions {
		self.defaults
	}

	/// Builds the variant set for a raw query. Lexicon lookups never fail; at worst the plan
	/// holds only the original variant.
	pub fn preprocess(&self, raw: &str, options: &PreprocessOptions) -> QueryPlan {
		let folded = raw.nfkc().collect::<String>();
		let extraction = self.extractor.extract(&folded);
		let normalized = if options.preserve_identifiers {
			normalize(&extraction.remainder)
		} else {
			normalize(&folded)
		};
		let suffix = if options.preserve_identifiers {
			extraction.identifiers.join(" ")
		} else {
			String::new()
		};
		let mut variants = Vec::new();

		push_variant(&mut variants, &normalized, &suffix, VariantProvenance::Original, true);

		let expanded = if options.expand_abbreviations {
			self.lexicon.expand_abbreviations(&normalized)
		} else {
			None
		};

		if let Some(expanded) = expanded.as_deref() {
			push_variant(
				&mut variants,
				expanded,
				&suffix,
				VariantProvenance::AbbreviationExpanded,
				false,
			);
		}
		if options.expand_synonyms && options.max_synonym_variations > 0 {
			let base = expanded.as_deref().unwrap_or(&normalized);
			let mut produced = 0;

			for text in self.lexicon.synonym_variants(base, options.max_synonym_variations) {
				if push_variant(
					&mut variants,
					&text,
					&suffix,
					VariantProvenance::Synonym(produced + 1),
					false,
				) {
					produced += 1;
				}
			}
		}

		QueryPlan {
			raw: raw.to_string(),
			normalized,
			identifiers: extraction.identifiers,
			variants,
		}
	}
}

fn push_variant(
	variants: &mut Vec<QueryVariant>,
	text: &str,
	suffix: &str,
	provenance: VariantProvenance,
	always: bool,
) -> bool {
	let text = match (text.is_empty(), suffix.is_empty()) {
		(_, true) => text.to_string(),
		(true, false) => suffix.to_string(),
		(false, false) => format!("{text} {suffix}"),
	};

	if !always && variants.iter().any(|variant| variant.text == text) {
		return false;
	}

	variants.push(QueryVariant { text, provenance });

	true
}
