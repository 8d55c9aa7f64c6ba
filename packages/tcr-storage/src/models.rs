use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filterable attributes of a test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	/// Lower is more urgent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub priority: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub risk: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseDocument {
	pub id: String,
	pub title: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub steps: String,
	#[serde(default)]
	pub expected_results: String,
	#[serde(default)]
	pub pre_requisites: String,
	#[serde(flatten)]
	pub metadata: DocumentMetadata,
}
impl TestCaseDocument {
	/// Point id derived from the document id, so re-indexing overwrites instead of duplicating.
	pub fn point_id(&self) -> Uuid {
		point_id_for(&self.id)
	}

	/// Text of a boostable field, or `None` for unknown field names.
	pub fn field(&self, name: &str) -> Option<&str> {
		let value = match name {
			"id" => self.id.as_str(),
			"title" => self.title.as_str(),
			"module" => self.metadata.module.as_deref().unwrap_or_default(),
			"description" => self.description.as_str(),
			"expected_results" => self.expected_results.as_str(),
			"steps" => self.steps.as_str(),
			"pre_requisites" => self.pre_requisites.as_str(),
			_ => return None,
		};

		Some(value)
	}

	/// Text sent to the embedding service.
	pub fn embedding_text(&self) -> String {
		let mut parts = vec![self.title.as_str()];

		if let Some(module) = self.metadata.module.as_deref() {
			parts.push(module);
		}

		parts.extend([
			self.description.as_str(),
			self.pre_requisites.as_str(),
			self.steps.as_str(),
			self.expected_results.as_str(),
		]);

		join_non_empty(&parts)
	}

	/// Text compared when looking for near-duplicate results.
	pub fn descriptive_text(&self) -> String {
		join_non_empty(&[
			self.title.as_str(),
			self.description.as_str(),
			self.steps.as_str(),
			self.expected_results.as_str(),
		])
	}
}

/// One document returned by the index, scored on the index's own scale.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
	pub document: TestCaseDocument,
	pub score: f32,
}

pub fn point_id_for(doc_id: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("tcr:test_case:{doc_id}").as_bytes())
}

fn join_non_empty(parts: &[&str]) -> String {
	parts
		.iter()
		.map(|part| part.trim())
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn document() -> TestCaseDocument {
		TestCaseDocument {
			id: "TC-1".to_string(),
			title: "Reset password".to_string(),
			description: " Reset via email link. ".to_string(),
			steps: String::new(),
			expected_results: "Email arrives.".to_string(),
			pre_requisites: String::new(),
			metadata: DocumentMetadata {
				module: Some("auth".to_string()),
				..DocumentMetadata::default()
			},
		}
	}

	#[test]
	fn point_ids_are_stable_per_document_id() {
		assert_eq!(document().point_id(), point_id_for("TC-1"));
		assert_ne!(point_id_for("TC-1"), point_id_for("TC-2"));
	}

	#[test]
	fn embedding_text_skips_empty_fields() {
		assert_eq!(
			document().embedding_text(),
			"Reset password\nauth\nReset via email link.\nEmail arrives."
		);
	}

	#[test]
	fn flattened_metadata_round_trips_through_json() {
		let json = serde_json::to_value(document()).expect("Document must serialize.");

		assert_eq!(json["module"], "auth");
		assert!(json.get("priority").is_none());

		let parsed: TestCaseDocument = serde_json::from_value(json).expect("Document must parse.");

		assert_eq!(parsed, document());
	}
}
