use regex::Regex;

/// Literal identifiers found in a query and the text left once they are cut out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
	/// Verbatim matches in first-seen order, without case-insensitive repeats.
	pub identifiers: Vec<String>,
	pub remainder: String,
}

#[derive(Debug, Clone)]
pub struct IdentifierExtractor {
	pattern: Regex,
}
impl IdentifierExtractor {
	pub fn new(pattern: &str) -> Result<Self, regex::Error> {
		Ok(Self { pattern: Regex::new(pattern)? })
	}

	pub fn extract(&self, text: &str) -> Extraction {
		let mut identifiers: Vec<String> = Vec::new();

		for found in self.pattern.find_iter(text) {
			let candidate = found.as_str();

			if candidate.is_empty()
				|| identifiers.iter().any(|seen| seen.eq_ignore_ascii_case(candidate))
			{
				continue;
			}

			identifiers.push(candidate.to_string());
		}

		let remainder = self.pattern.replace_all(text, " ").into_owned();

		Extraction { identifiers, remainder }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_ticket_codes_in_order_without_repeats() {
		let extractor = IdentifierExtractor::new(r"\b[A-Za-z][A-Za-z0-9]{1,9}-\d{1,6}\b")
			.expect("Pattern must compile.");
		let extraction = extractor.extract("Retest TC-101 and AUTH-7, then tc-101 again.");

		assert_eq!(extraction.identifiers, vec!["TC-101".to_string(), "AUTH-7".to_string()]);
		assert!(!extraction.remainder.contains("TC-101"));
		assert!(extraction.remainder.contains("Retest"));
	}

	#[test]
	fn text_without_identifiers_is_untouched() {
		let extractor = IdentifierExtractor::new(r"\bTC-\d+\b").expect("Pattern must compile.");
		let extraction = extractor.extract("reset password flow");

		assert!(extraction.identifiers.is_empty());
		assert_eq!(extraction.remainder, "reset password flow");
	}
}
