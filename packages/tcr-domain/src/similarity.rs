use std::collections::{HashMap, HashSet};

use crate::normalize::{normalize, tokens};

/// Text similarity used to spot near-duplicate results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMeasure {
	/// Token set overlap.
	Jaccard,
	/// Cosine over term frequencies.
	Cosine,
}
impl SimilarityMeasure {
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"jaccard" => Some(Self::Jaccard),
			"cosine" => Some(Self::Cosine),
			_ => None,
		}
	}

	/// Similarity in `[0, 1]`. Texts without tokens are never similar to anything.
	pub fn similarity(self, left: &str, right: &str) -> f32 {
		let left = normalize(left);
		let right = normalize(right);

		match self {
			Self::Jaccard => jaccard(&left, &right),
			Self::Cosine => cosine(&left, &right),
		}
	}
}

fn jaccard(left: &str, right: &str) -> f32 {
	let left = tokens(left).collect::<HashSet<_>>();
	let right = tokens(right).collect::<HashSet<_>>();

	if left.is_empty() || right.is_empty() {
		return 0.0;
	}

	let shared = left.intersection(&right).count();
	let union = left.len() + right.len() - shared;

	shared as f32 / union as f32
}

fn cosine(left: &str, right: &str) -> f32 {
	let left = term_frequencies(left);
	let right = term_frequencies(right);

	if left.is_empty() || right.is_empty() {
		return 0.0;
	}

	let dot = left
		.iter()
		.filter_map(|(term, count)| right.get(term).map(|other| (*count * *other) as f32))
		.sum::<f32>();
	let norm = |freqs: &HashMap<&str, u32>| {
		freqs.values().map(|count| (*count * *count) as f32).sum::<f32>().sqrt()
	};

	(dot / (norm(&left) * norm(&right))).clamp(0.0, 1.0)
}

fn term_frequencies(text: &str) -> HashMap<&str, u32> {
	let mut freqs = HashMap::new();

	for token in tokens(text) {
		*freqs.entry(token).or_insert(0) += 1;
	}

	freqs
}
