use futures::future;
use tokio::sync::Semaphore;
use unicode_segmentation::UnicodeSegmentation;

use crate::{Ranked, SummaryProvider};
use tcr_config::LlmProviderConfig;
use tcr_domain::{SimilarityMeasure, normalize};

const ELLIPSIS: char = '…';

/// Drops every item whose descriptive text is too similar to a higher-ranked item that was
/// kept. Returns the survivors in their original order and the number dropped.
pub fn dedupe<T>(items: Vec<T>, measure: SimilarityMeasure, threshold: f32) -> (Vec<T>, usize)
where
	T: Ranked,
{
	let mut kept: Vec<T> = Vec::with_capacity(items.len());
	let mut seen: Vec<(Option<blake3::Hash>, String)> = Vec::with_capacity(items.len());
	let mut dropped = 0;

	for item in items {
		let text = item.document().descriptive_text();
		let normalized = normalize(&text);
		let fingerprint =
			(!normalized.is_empty()).then(|| blake3::hash(normalized.as_bytes()));
		let duplicate = seen.iter().any(|(other_fingerprint, other_text)| {
			(fingerprint.is_some() && fingerprint == *other_fingerprint)
				|| measure.similarity(&text, other_text) > threshold
		});

		if duplicate {
			tracing::debug!(doc_id = %item.document().id, "Dropped near-duplicate result.");

			dropped += 1;

			continue;
		}

		seen.push((fingerprint, text));
		kept.push(item);
	}

	(kept, dropped)
}

pub struct Summarizer<'a> {
	pub provider: &'a dyn SummaryProvider,
	pub cfg: &'a LlmProviderConfig,
	pub max_chars: usize,
	pub concurrency: usize,
}
impl Summarizer<'_> {
	/// Shortens long descriptions in place. Order is never touched. Returns how many descriptions
	/// were shortened.
	pub async fn summarize<T>(&self, items: &mut [T]) -> usize
	where
		T: Ranked,
	{
		let limiter = Semaphore::new(self.concurrency.max(1));
		let targets = items
			.iter()
			.enumerate()
			.filter(|(_, item)| item.document().description.chars().count() > self.max_chars)
			.map(|(idx, item)| (idx, item.document().description.clone()))
			.collect::<Vec<_>>();
		let calls = targets.iter().map(|(idx, text)| {
			let limiter = &limiter;

			async move {
				let summary = match limiter.acquire().await {
					Ok(_permit) => self.provider.summarize(self.cfg, text, self.max_chars).await,
					Err(err) => Err(crate::Error::UpstreamUnavailable { message: err.to_string() }),
				};
				let shortened = match summary {
					Ok(summary) => truncate_words(&summary, self.max_chars),
					Err(err) => {
						tracing::warn!(error = %err, "Summary failed. Truncating instead.");

						truncate_words(text, self.max_chars)
					},
				};

				(*idx, shortened)
			}
		});
		let summaries = future::join_all(calls).await;
		let count = summaries.len();

		for (idx, summary) in summaries {
			items[idx].document_mut().description = summary;
		}

		count
	}
}

/// Cuts `text` to at most `max_chars` characters, preferring a word boundary.
pub fn truncate_words(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let budget = max_chars.saturating_sub(1);
	let mut end = 0;
	let mut used = 0;

	for (idx, word) in text.split_word_bound_indices() {
		let len = word.chars().count();

		if used + len > budget {
			break;
		}

		used += len;
		end = idx + word.len();
	}

	if end == 0 {
		end = text.char_indices().nth(budget).map(|(idx, _)| idx).unwrap_or(text.len());
	}

	let mut out = text[..end].trim_end().to_string();

	out.push(ELLIPSIS);

	out
}
