use std::{
	collections::{BTreeMap, HashMap},
	time::Duration,
};

use futures::future;
use qdrant_client::{
	Payload,
	qdrant::{
		CreateCollectionBuilder, Distance, Document, Filter, Modifier, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
		UpsertPointsBuilder, Value, Vector, VectorParamsBuilder, VectorsConfigBuilder,
		value::Kind,
	},
};
use serde_json::Value as JsonValue;

use crate::{
	Error, Result,
	models::{DocumentMetadata, StoreHit, TestCaseDocument},
};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_MODEL: &str = "qdrant/bm25";

/// Keyword query: one BM25 lookup per boosted field.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordClause {
	pub text: String,
	pub field_boosts: BTreeMap<String, f32>,
	pub fuzzy: tcr_config::Fuzzy,
}

pub fn bm25_vector_name(field: &str) -> String {
	format!("bm25_{field}")
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &tcr_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url)
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.api_key(cfg.api_key.clone())
			.build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with one dense vector and one BM25 sparse vector per field.
	pub async fn ensure_collection(&self, fields: &[&str]) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		for field in fields {
			sparse_vectors_config.add_named_vector_params(
				bm25_vector_name(field),
				SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
			);
		}

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors_config)
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(())
	}

	pub async fn search_dense(
		&self,
		vector: Vec<f32>,
		filter: Option<Filter>,
		limit: u32,
	) -> Result<Vec<StoreHit>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions, expected {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.limit(u64::from(limit))
			.with_payload(true);

		if let Some(filter) = filter {
			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;

		response.result.iter().map(hit_from_point).collect()
	}

	/// Runs the per-field BM25 lookups concurrently and sums `boost * score` per document.
	///
	/// Qdrant's BM25 inference has no edit-distance matching, so `clause.fuzzy` is not applied
	/// here.
	pub async fn search_keyword(
		&self,
		clause: &KeywordClause,
		filter: Option<Filter>,
		limit: u32,
	) -> Result<Vec<StoreHit>> {
		let lookups = clause.field_boosts.iter().map(|(field, boost)| {
			let mut search = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(Document::new(clause.text.clone(), BM25_MODEL)))
				.using(bm25_vector_name(field))
				.limit(u64::from(limit))
				.with_payload(true);

			if let Some(filter) = filter.clone() {
				search = search.filter(filter);
			}

			async move { self.client.query(search).await.map(|response| (*boost, response.result)) }
		});
		let mut combined: HashMap<String, StoreHit> = HashMap::new();

		for outcome in future::join_all(lookups).await {
			let (boost, points) = outcome?;

			for point in &points {
				let hit = hit_from_point(point)?;
				let weighted = boost * hit.score;

				combined
					.entry(hit.document.id.clone())
					.and_modify(|existing| existing.score += weighted)
					.or_insert(StoreHit { score: weighted, ..hit });
			}
		}

		let mut hits = combined.into_values().collect::<Vec<_>>();

		hits.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.document.id.cmp(&b.document.id))
		});
		hits.truncate(limit as usize);

		Ok(hits)
	}

	/// Upserts documents with their dense vectors; BM25 vectors are inferred server-side.
	pub async fn upsert(
		&self,
		documents: &[TestCaseDocument],
		vectors: &[Vec<f32>],
		fields: &[&str],
	) -> Result<()> {
		if documents.len() != vectors.len() {
			return Err(Error::InvalidArgument(
				"Each document needs exactly one vector.".to_string(),
			));
		}
		if documents.is_empty() {
			return Ok(());
		}

		let mut points = Vec::with_capacity(documents.len());

		for (document, vector) in documents.iter().zip(vectors) {
			let mut vector_map = HashMap::new();

			vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector.clone()));

			for field in fields {
				let text = document.field(field).unwrap_or_default();

				if text.trim().is_empty() {
					continue;
				}

				vector_map.insert(
					bm25_vector_name(field),
					Vector::from(Document::new(text.to_string(), BM25_MODEL)),
				);
			}

			points.push(PointStruct::new(
				document.point_id().to_string(),
				vector_map,
				document_payload(document),
			));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}
}

fn document_payload(document: &TestCaseDocument) -> Payload {
	let mut payload = Payload::new();

	payload.insert("doc_id", document.id.clone());
	payload.insert("title", document.title.clone());
	payload.insert("description", document.description.clone());
	payload.insert("steps", document.steps.clone());
	payload.insert("expected_results", document.expected_results.clone());
	payload.insert("pre_requisites", document.pre_requisites.clone());

	let metadata = &document.metadata;

	payload.insert("module", optional_json(metadata.module.clone().map(JsonValue::String)));
	payload.insert("priority", optional_json(metadata.priority.map(JsonValue::from)));
	payload.insert("risk", optional_json(metadata.risk.clone().map(JsonValue::String)));
	payload.insert("category", optional_json(metadata.category.clone().map(JsonValue::String)));

	payload
}

fn optional_json(value: Option<JsonValue>) -> JsonValue {
	value.unwrap_or(JsonValue::Null)
}

fn hit_from_point(point: &ScoredPoint) -> Result<StoreHit> {
	let payload = &point.payload;
	let Some(id) = payload_string(payload, "doc_id") else {
		return Err(Error::InvalidPayload {
			point: format!("{:?}", point.id),
			message: "missing doc_id".to_string(),
		});
	};
	let document = TestCaseDocument {
		title: payload_string(payload, "title").unwrap_or_default(),
		description: payload_string(payload, "description").unwrap_or_default(),
		steps: payload_string(payload, "steps").unwrap_or_default(),
		expected_results: payload_string(payload, "expected_results").unwrap_or_default(),
		pre_requisites: payload_string(payload, "pre_requisites").unwrap_or_default(),
		metadata: DocumentMetadata {
			module: payload_string(payload, "module"),
			priority: payload_i64(payload, "priority"),
			risk: payload_string(payload, "risk"),
			category: payload_string(payload, "category"),
		},
		id,
	};

	Ok(StoreHit { document, score: point.score })
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) if value.fract() == 0.0 => Some(*value as i64),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn payload(entries: &[(&str, JsonValue)]) -> HashMap<String, Value> {
		entries.iter().map(|(key, value)| (key.to_string(), Value::from(value.clone()))).collect()
	}

	#[test]
	fn reads_documents_back_from_payload() {
		let point = ScoredPoint {
			payload: payload(&[
				("doc_id", JsonValue::from("TC-9")),
				("title", JsonValue::from("Checkout totals")),
				("priority", JsonValue::from(2)),
				("module", JsonValue::Null),
			]),
			score: 0.42,
			..ScoredPoint::default()
		};
		let hit = hit_from_point(&point).expect("Hit must parse.");

		assert_eq!(hit.document.id, "TC-9");
		assert_eq!(hit.document.metadata.priority, Some(2));
		assert_eq!(hit.document.metadata.module, None);
		assert_eq!(hit.score, 0.42);
	}

	#[test]
	fn payload_without_doc_id_is_rejected() {
		let point = ScoredPoint {
			payload: payload(&[("title", JsonValue::from("x"))]),
			..ScoredPoint::default()
		};

		assert!(matches!(hit_from_point(&point), Err(Error::InvalidPayload { .. })));
	}

	#[test]
	fn sparse_vector_names_follow_field_names() {
		assert_eq!(bm25_vector_name("expected_results"), "bm25_expected_results");
	}

	#[test]
	fn keyword_clauses_compare_fuzzy_settings() {
		let clause = KeywordClause {
			text: "password reset".to_string(),
			field_boosts: BTreeMap::from([("title".to_string(), 2.0)]),
			fuzzy: tcr_config::Fuzzy::default(),
		};
		let strict = KeywordClause {
			fuzzy: tcr_config::Fuzzy { max_edits: 0, prefix_length: 2 },
			..clause.clone()
		};

		assert_eq!(clause, clause.clone());
		assert_ne!(clause, strict);
	}
}
