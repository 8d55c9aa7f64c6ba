use std::{cmp::Ordering, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use crate::{
	Error, Ranked, Result,
	retrieval::{RankedList, RetrieverKind},
};
use tcr_storage::models::TestCaseDocument;

/// Keyword and vector contribution to the final score. Valid pairs are non-negative and sum to
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
	pub keyword: f32,
	pub vector: f32,
}
impl Weights {
	pub const KEYWORD_ONLY: Self = Self { keyword: 1.0, vector: 0.0 };
	pub const VECTOR_ONLY: Self = Self { keyword: 0.0, vector: 1.0 };

	pub fn validate(self) -> Result<Self> {
		tcr_config::check_weights(self.keyword, self.vector)
			.map_err(|message| Error::Validation { message: format!("weights {message}") })?;

		Ok(self)
	}
}
impl From<tcr_config::FusionWeights> for Weights {
	fn from(cfg: tcr_config::FusionWeights) -> Self {
		Self { keyword: cfg.keyword, vector: cfg.vector }
	}
}

/// One document after merging every list it appeared in.
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
	#[serde(flatten)]
	pub document: TestCaseDocument,
	/// Best normalized keyword score across variants, in `[0, 1]`.
	pub keyword_score: Option<f32>,
	/// Best normalized vector score across variants, in `[0, 1]`.
	pub vector_score: Option<f32>,
	pub weights: Weights,
	pub score: f32,
	#[serde(skip)]
	pub keyword_raw_score: Option<f32>,
	#[serde(skip)]
	pub vector_raw_score: Option<f32>,
}
impl FusedResult {
	fn new(document: TestCaseDocument, weights: Weights) -> Self {
		Self {
			document,
			keyword_score: None,
			vector_score: None,
			weights,
			score: 0.0,
			keyword_raw_score: None,
			vector_raw_score: None,
		}
	}

	/// Best raw score seen from `source`.
	pub fn raw_score(&self, source: RetrieverKind) -> Option<f32> {
		match source {
			RetrieverKind::Keyword => self.keyword_raw_score,
			RetrieverKind::Vector => self.vector_raw_score,
		}
	}
}
impl Ranked for FusedResult {
	fn document(&self) -> &TestCaseDocument {
		&self.document
	}

	fn document_mut(&mut self) -> &mut TestCaseDocument {
		&mut self.document
	}
}

/// Merges ranked lists from every variant and source into one ordering.
///
/// Each list is normalized on its own, a document keeps its best score per source, and the final
/// score is `keyword * w_k + vector * w_v` with absent sides counted as zero. Ties fall back to the
/// document id so the output is deterministic.
pub fn fuse(lists: &[RankedList], weights: Weights) -> Result<Vec<FusedResult>> {
	let weights = weights.validate()?;
	let mut merged: BTreeMap<&str, FusedResult> = BTreeMap::new();

	for list in lists {
		let raw = list.candidates.iter().map(|candidate| candidate.raw_score).collect::<Vec<_>>();

		check_raw_scores(list.source, &raw)?;

		for (candidate, normalized) in list.candidates.iter().zip(normalize_scores(&raw)) {
			let entry = merged
				.entry(candidate.id())
				.or_insert_with(|| FusedResult::new(candidate.document.clone(), weights));
			let (score, raw_score) = match list.source {
				RetrieverKind::Keyword => (&mut entry.keyword_score, &mut entry.keyword_raw_score),
				RetrieverKind::Vector => (&mut entry.vector_score, &mut entry.vector_raw_score),
			};

			*score = Some(score.map_or(normalized, |best| best.max(normalized)));
			*raw_score =
				Some(raw_score.map_or(candidate.raw_score, |best| best.max(candidate.raw_score)));
		}
	}

	let mut fused = merged
		.into_values()
		.map(|mut result| {
			let combined = weights.keyword * result.keyword_score.unwrap_or(0.0)
				+ weights.vector * result.vector_score.unwrap_or(0.0);

			result.score = combined.clamp(0.0, 1.0);

			result
		})
		.collect::<Vec<_>>();

	fused.sort_by(|a, b| {
		cmp_f32_desc(a.score, b.score).then_with(|| a.document.id.cmp(&b.document.id))
	});

	Ok(fused)
}

/// Scales one list into `[0, 1]`.
///
/// A list with fewer than two distinct scores maps to 1.0. A list already inside `[0, 1]` is kept
/// as is. Anything else is min-max scaled.
pub fn normalize_scores(raw: &[f32]) -> Vec<f32> {
	let Some(first) = raw.first() else { return Vec::new() };
	let (min, max) =
		raw.iter().fold((*first, *first), |(lo, hi), score| (lo.min(*score), hi.max(*score)));

	if min == max {
		return vec![1.0; raw.len()];
	}
	if min >= 0.0 && max <= 1.0 {
		return raw.to_vec();
	}

	let span = max - min;

	raw.iter().map(|score| ((score - min) / span).clamp(0.0, 1.0)).collect()
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn check_raw_scores(source: RetrieverKind, raw: &[f32]) -> Result<()> {
	if let Some(bad) = raw.iter().find(|score| !score.is_finite()) {
		tracing::error!(?source, score = %bad, "Retriever returned a non-finite score.");

		return Err(Error::InternalFusion {
			message: format!("{source} retriever returned a non-finite score."),
		});
	}
	if source == RetrieverKind::Keyword && raw.iter().any(|score| *score < 0.0) {
		tracing::error!(?source, "Keyword retriever returned a negative score.");

		return Err(Error::InternalFusion {
			message: "keyword retriever returned a negative score.".to_string(),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn degenerate_lists_map_to_one() {
		assert_eq!(normalize_scores(&[3.5, 3.5]), vec![1.0, 1.0]);
		assert_eq!(normalize_scores(&[0.2]), vec![1.0]);
		assert!(normalize_scores(&[]).is_empty());
	}

	#[test]
	fn in_range_lists_pass_through() {
		assert_eq!(normalize_scores(&[0.2, 0.8]), vec![0.2, 0.8]);
	}

	/// Equal scores take the degenerate rule even inside `[0, 1]`; one distinct score more and
	/// the list passes through untouched.
	#[test]
	fn degenerate_rule_wins_over_pass_through() {
		assert_eq!(normalize_scores(&[0.3, 0.3]), vec![1.0, 1.0]);
		assert_eq!(normalize_scores(&[0.3, 0.31]), vec![0.3, 0.31]);
		assert_eq!(normalize_scores(&[0.0, 0.0]), vec![1.0, 1.0]);
		assert_eq!(normalize_scores(&[0.0, 1.0]), vec![0.0, 1.0]);
	}

	#[test]
	fn out_of_range_lists_are_min_max_scaled() {
		assert_eq!(normalize_scores(&[2.0, 12.0, 7.0]), vec![0.0, 1.0, 0.5]);
		assert_eq!(normalize_scores(&[-0.5, 0.5]), vec![0.0, 1.0]);
	}

	#[test]
	fn weights_must_sum_to_one() {
		assert!(Weights { keyword: 0.6, vector: 0.6 }.validate().is_err());
		assert!(Weights { keyword: -0.1, vector: 1.1 }.validate().is_err());
		assert!(Weights::VECTOR_ONLY.validate().is_ok());
	}

	#[test]
	fn nan_sorts_last() {
		assert_eq!(cmp_f32_desc(f32::NAN, 0.1), Ordering::Greater);
		assert_eq!(cmp_f32_desc(0.9, 0.1), Ordering::Less);
	}
}
