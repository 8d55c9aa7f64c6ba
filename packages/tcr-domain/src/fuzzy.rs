//! Edit-distance term matching used for typo-tolerant keyword lookups.

/// True when `candidate` equals `term`, or shares its first `prefix_length` characters and is
/// within `max_edits` insertions, deletions or substitutions of it.
pub fn fuzzy_match(term: &str, candidate: &str, max_edits: u8, prefix_length: u8) -> bool {
	if term == candidate {
		return true;
	}
	if max_edits == 0 {
		return false;
	}

	let term = term.chars().collect::<Vec<_>>();
	let candidate = candidate.chars().collect::<Vec<_>>();
	let prefix = prefix_length as usize;

	// Terms shorter than the prefix only ever match exactly.
	if term.len() <= prefix || candidate.len() < prefix || term[..prefix] != candidate[..prefix] {
		return false;
	}

	bounded_distance(&term[prefix..], &candidate[prefix..], max_edits as usize).is_some()
}

/// Levenshtein distance, or `None` once it is certain to exceed `limit`.
fn bounded_distance(left: &[char], right: &[char], limit: usize) -> Option<usize> {
	if left.len().abs_diff(right.len()) > limit {
		return None;
	}

	let mut previous = (0..=right.len()).collect::<Vec<_>>();
	let mut current = vec![0; right.len() + 1];

	for (i, l) in left.iter().enumerate() {
		current[0] = i + 1;

		let mut row_min = current[0];

		for (j, r) in right.iter().enumerate() {
			let substitution = previous[j] + usize::from(l != r);

			current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
			row_min = row_min.min(current[j + 1]);
		}

		if row_min > limit {
			return None;
		}

		std::mem::swap(&mut previous, &mut current);
	}

	let distance = previous[right.len()];

	(distance <= limit).then_some(distance)
}
