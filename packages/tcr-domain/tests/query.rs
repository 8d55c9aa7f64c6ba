use std::collections::BTreeMap;

use proptest::prelude::*;

use tcr_config::Preprocess;
use tcr_domain::{QueryPreprocessor, VariantProvenance, normalize};

fn preprocess_config() -> Preprocess {
	Preprocess {
		abbreviations: BTreeMap::from([
			("pwd".to_string(), "password".to_string()),
			("cfg".to_string(), "configuration".to_string()),
		]),
		synonyms: BTreeMap::from([
			(
				"reset".to_string(),
				vec![
					"recover".to_string(),
					"change".to_string(),
					"restore".to_string(),
					"renew".to_string(),
				],
			),
			(
				"password".to_string(),
				vec!["passphrase".to_string(), "credential".to_string(), "pin".to_string()],
			),
		]),
		..Preprocess::default()
	}
}

fn preprocessor() -> QueryPreprocessor {
	QueryPreprocessor::new(&preprocess_config()).expect("Preprocessor must build.")
}

#[test]
fn pwd_reset_expands_abbreviation_then_synonyms() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("pwd reset", &preprocessor.defaults());

	assert_eq!(plan.variants[0].text, "pwd reset");
	assert_eq!(plan.variants[0].provenance, VariantProvenance::Original);
	assert_eq!(plan.variants[1].text, "password reset");
	assert_eq!(plan.variants[1].provenance, VariantProvenance::AbbreviationExpanded);

	let synonyms = plan
		.variants
		.iter()
		.filter(|variant| matches!(variant.provenance, VariantProvenance::Synonym(_)))
		.collect::<Vec<_>>();

	assert_eq!(synonyms.len(), 5);
	assert_eq!(synonyms[0].text, "passphrase reset");
	assert_eq!(synonyms[0].provenance, VariantProvenance::Synonym(1));
	assert_eq!(synonyms[3].text, "password recover");
	assert_eq!(synonyms[4].provenance, VariantProvenance::Synonym(5));
}

#[test]
fn synonym_cap_is_configurable() {
	let preprocessor = preprocessor();
	let mut options = preprocessor.defaults();

	options.max_synonym_variations = 2;

	let plan = preprocessor.preprocess("pwd reset", &options);

	assert_eq!(plan.variants.len(), 4);
}

#[test]
fn original_variant_survives_when_nothing_expands() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("Checkout  Totals!", &preprocessor.defaults());

	assert_eq!(plan.variants.len(), 1);
	assert_eq!(plan.variants[0].text, "checkout totals");
	assert_eq!(plan.variants[0].provenance, VariantProvenance::Original);
}

#[test]
fn identifiers_are_reattached_verbatim_to_every_variant() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("pwd reset for LOGIN-42", &preprocessor.defaults());

	assert_eq!(plan.identifiers, vec!["LOGIN-42".to_string()]);
	assert_eq!(plan.normalized, "pwd reset for");
	assert!(plan.variants.iter().all(|variant| variant.text.ends_with(" LOGIN-42")));
	assert_eq!(plan.variants[1].text, "password reset for LOGIN-42");
}

#[test]
fn identifiers_are_lowercased_in_place_when_not_preserved() {
	let preprocessor = preprocessor();
	let mut options = preprocessor.defaults();

	options.preserve_identifiers = false;

	let plan = preprocessor.preprocess("LOGIN-42 pwd", &options);

	assert_eq!(plan.identifiers, vec!["LOGIN-42".to_string()]);
	assert_eq!(plan.variants[0].text, "login-42 pwd");
	assert_eq!(plan.variants[1].text, "login-42 password");
}

#[test]
fn identifier_only_query_is_not_blank() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("  TC-101 ", &preprocessor.defaults());

	assert!(!plan.is_blank());
	assert_eq!(plan.variants[0].text, "TC-101");
}

#[test]
fn punctuation_only_query_is_blank_but_keeps_original_variant() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("?!", &preprocessor.defaults());

	assert!(plan.is_blank());
	assert_eq!(plan.variants.len(), 1);
}

#[test]
fn full_width_identifiers_match_after_folding() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("ＴＣ－１０１ crash", &preprocessor.defaults());

	assert_eq!(plan.identifiers, vec!["TC-101".to_string()]);
}

#[test]
fn provenance_serializes_as_tags() {
	let preprocessor = preprocessor();
	let plan = preprocessor.preprocess("pwd reset", &preprocessor.defaults());
	let json = serde_json::to_value(&plan.variants).expect("Variants must serialize.");

	assert_eq!(json[0]["provenance"], "original");
	assert_eq!(json[1]["provenance"], "abbreviation-expanded");
	assert_eq!(json[2]["provenance"], "synonym-1");
}

proptest! {
	#[test]
	fn normalize_is_idempotent(input in ".*") {
		let once = normalize(&input);

		prop_assert_eq!(normalize(&once), once);
	}

	#[test]
	fn preprocessing_never_drops_the_original_variant(input in "[ -~]{0,64}") {
		let preprocessor = preprocessor();
		let plan = preprocessor.preprocess(&input, &preprocessor.defaults());

		prop_assert!(!plan.variants.is_empty());
		prop_assert_eq!(plan.variants[0].provenance, VariantProvenance::Original);
		prop_assert!(plan.variants.len() <= 2 + preprocess_config().max_synonym_variations);
	}
}
