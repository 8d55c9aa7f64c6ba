/// Characters kept inside a token when both neighbours are alphanumeric, e.g. `tc-101`, `v1.2`.
pub const CONNECTORS: [char; 4] = ['-', '_', '.', '/'];

/// Lowercases, replaces punctuation with spaces and collapses whitespace.
///
/// Connector characters survive only between two alphanumerics, so `normalize` is idempotent.
pub fn normalize(input: &str) -> String {
	let lowered = input.to_lowercase();
	let chars = lowered.chars().collect::<Vec<_>>();
	let mut cleaned = String::with_capacity(lowered.len());

	for (idx, ch) in chars.iter().copied().enumerate() {
		if ch.is_alphanumeric() {
			cleaned.push(ch);

			continue;
		}

		let joins = CONNECTORS.contains(&ch)
			&& idx > 0
			&& chars[idx - 1].is_alphanumeric()
			&& chars.get(idx + 1).is_some_and(|next| next.is_alphanumeric());

		cleaned.push(if joins { ch } else { ' ' });
	}

	cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits normalized text into tokens.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
	normalized.split(' ').filter(|token| !token.is_empty())
}
