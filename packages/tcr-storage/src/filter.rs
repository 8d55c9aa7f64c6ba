use std::collections::BTreeMap;

use qdrant_client::qdrant::{Condition, Filter, Range};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, models::DocumentMetadata};

/// Fields that accept range constraints.
pub const RANGE_FIELDS: [&str; 1] = ["priority"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
	Integer(i64),
	Text(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gte: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lte: Option<f64>,
}

/// Equality and range constraints over document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchFilters {
	#[serde(default)]
	pub equals: BTreeMap<String, FilterValue>,
	#[serde(default)]
	pub ranges: BTreeMap<String, RangeBounds>,
}
impl SearchFilters {
	pub fn is_empty(&self) -> bool {
		self.equals.is_empty() && self.ranges.is_empty()
	}

	/// Checks shape only: known fields, well-formed bounds.
	pub fn validate(&self) -> Result<()> {
		for field in self.equals.keys() {
			if !tcr_config::FILTERABLE_FIELDS.contains(&field.as_str()) {
				return Err(Error::InvalidArgument(format!("{field} is not a filterable field.")));
			}
		}
		for (field, bounds) in &self.ranges {
			if !RANGE_FIELDS.contains(&field.as_str()) {
				return Err(Error::InvalidArgument(format!(
					"{field} does not support range filters."
				)));
			}

			match (bounds.gte, bounds.lte) {
				(None, None) =>
					return Err(Error::InvalidArgument(format!(
						"Range filter on {field} needs gte or lte."
					))),
				(Some(gte), Some(lte)) if gte > lte =>
					return Err(Error::InvalidArgument(format!(
						"Range filter on {field} has gte greater than lte."
					))),
				_ => {},
			}

			if bounds.gte.is_some_and(|v| !v.is_finite())
				|| bounds.lte.is_some_and(|v| !v.is_finite())
			{
				return Err(Error::InvalidArgument(format!(
					"Range filter on {field} must use finite bounds."
				)));
			}
		}

		Ok(())
	}

	/// Builds the index filter. `None` means unfiltered.
	pub fn to_qdrant(&self) -> Option<Filter> {
		if self.is_empty() {
			return None;
		}

		let mut conditions = Vec::with_capacity(self.equals.len() + self.ranges.len());

		for (field, value) in &self.equals {
			conditions.push(match value {
				FilterValue::Integer(number) => Condition::matches(field.as_str(), *number),
				FilterValue::Text(text) => Condition::matches(field.as_str(), text.clone()),
			});
		}
		for (field, bounds) in &self.ranges {
			conditions.push(Condition::range(
				field.as_str(),
				Range { gte: bounds.gte, lte: bounds.lte, gt: None, lt: None },
			));
		}

		Some(Filter::all(conditions))
	}

	/// Evaluates the filter against metadata held in memory.
	pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
		let equals_ok = self.equals.iter().all(|(field, expected)| {
			match (field.as_str(), expected) {
				("module", FilterValue::Text(text)) => metadata.module.as_ref() == Some(text),
				("risk", FilterValue::Text(text)) => metadata.risk.as_ref() == Some(text),
				("category", FilterValue::Text(text)) => metadata.category.as_ref() == Some(text),
				("priority", FilterValue::Integer(number)) => metadata.priority == Some(*number),
				_ => false,
			}
		});

		equals_ok
			&& self.ranges.iter().all(|(field, bounds)| {
				let value = match field.as_str() {
					"priority" => metadata.priority.map(|p| p as f64),
					_ => None,
				};

				value.is_some_and(|value| {
					bounds.gte.is_none_or(|gte| value >= gte)
						&& bounds.lte.is_none_or(|lte| value <= lte)
				})
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(value: serde_json::Value) -> SearchFilters {
		serde_json::from_value(value).expect("Filter must parse.")
	}

	#[test]
	fn rejects_unknown_fields_and_bad_ranges() {
		assert!(parse(serde_json::json!({ "equals": { "owner": "qa" } })).validate().is_err());
		assert!(parse(serde_json::json!({ "ranges": { "module": { "gte": 1 } } })).validate().is_err());
		assert!(parse(serde_json::json!({ "ranges": { "priority": {} } })).validate().is_err());
		assert!(
			parse(serde_json::json!({ "ranges": { "priority": { "gte": 3, "lte": 1 } } }))
				.validate()
				.is_err()
		);
		assert!(serde_json::from_value::<SearchFilters>(serde_json::json!({ "where": {} })).is_err());
	}

	#[test]
	fn builds_one_condition_per_constraint() {
		let filters = parse(serde_json::json!({
			"equals": { "module": "auth", "priority": 1 },
			"ranges": { "priority": { "lte": 2 } }
		}));

		filters.validate().expect("Filter must validate.");

		let filter = filters.to_qdrant().expect("Expected a filter.");

		assert_eq!(filter.must.len(), 3);
		assert!(SearchFilters::default().to_qdrant().is_none());
	}

	#[test]
	fn matches_metadata_in_memory() {
		let filters = parse(serde_json::json!({
			"equals": { "module": "auth" },
			"ranges": { "priority": { "gte": 1, "lte": 2 } }
		}));
		let mut metadata = DocumentMetadata {
			module: Some("auth".to_string()),
			priority: Some(2),
			..DocumentMetadata::default()
		};

		assert!(filters.matches(&metadata));

		metadata.priority = Some(3);

		assert!(!filters.matches(&metadata));

		metadata.priority = None;

		assert!(!filters.matches(&metadata));
	}
}
