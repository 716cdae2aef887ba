use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DatetimeRange,
		Distance, FieldType, Filter, PointStruct, Query, QueryPointsBuilder, ScoredPoint,
		Timestamp, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder, VectorsConfigBuilder,
		point_id::PointIdOptions,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const NAMESPACE_FIELD: &str = "namespace";
pub const CREATED_AT_FIELD: &str = "created_at";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &recall_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection and its payload indexes when missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.as_str()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let builder =
			CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config);

		self.client.create_collection(builder).await?;

		for (field, field_type) in
			[(NAMESPACE_FIELD, FieldType::Keyword), (CREATED_AT_FIELD, FieldType::Datetime)]
		{
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(
						self.collection.clone(),
						field,
						field_type,
					)
					.wait(true),
				)
				.await?;
		}

		Ok(())
	}

	/// Nearest-neighbour search inside one namespace. Returns `(fragment_id, similarity)` pairs in
	/// descending similarity.
	pub async fn search(
		&self,
		vector: &[f32],
		top_k: u32,
		namespace: &str,
		since: Option<OffsetDateTime>,
	) -> Result<Vec<(Uuid, f32)>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions; collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.filter(namespace_filter(namespace, since))
			.with_payload(false)
			.limit(top_k as u64);
		let response = self.client.query(search).await?;
		let mut hits = Vec::with_capacity(response.result.len());

		for point in &response.result {
			match point_uuid(point) {
				Some(id) => hits.push((id, point.score)),
				None => {
					tracing::warn!(point = ?point.id, "Skipping Qdrant point without a uuid id.");
				},
			}
		}

		Ok(hits)
	}

	pub async fn upsert_fragment(
		&self,
		fragment_id: Uuid,
		namespace: &str,
		vector: &[f32],
		created_at: OffsetDateTime,
	) -> Result<()> {
		let created_at = created_at
			.format(&Rfc3339)
			.map_err(|err| Error::InvalidArgument(format!("Invalid created_at: {err}.")))?;
		let mut payload_map = HashMap::new();

		payload_map.insert(NAMESPACE_FIELD.to_string(), Value::from(namespace.to_string()));
		payload_map.insert("fragment_id".to_string(), Value::from(fragment_id.to_string()));
		payload_map.insert(CREATED_AT_FIELD.to_string(), Value::from(created_at));

		let mut vector_map = HashMap::new();

		vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector.to_vec()));

		let point = PointStruct::new(fragment_id.to_string(), vector_map, Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}
}

pub fn namespace_filter(namespace: &str, since: Option<OffsetDateTime>) -> Filter {
	let mut must = vec![Condition::matches(NAMESPACE_FIELD, namespace.to_string())];

	if let Some(since) = since {
		let gte = Timestamp { seconds: since.unix_timestamp(), nanos: since.nanosecond() as i32 };

		must.push(Condition::datetime_range(
			CREATED_AT_FIELD,
			DatetimeRange { lt: None, gt: None, gte: Some(gte), lte: None },
		));
	}

	Filter::must(must)
}

fn point_uuid(point: &ScoredPoint) -> Option<Uuid> {
	match point.id.as_ref()?.point_id_options.as_ref()? {
		PointIdOptions::Uuid(id) => Uuid::parse_str(id).ok(),
		PointIdOptions::Num(_) => None,
	}
}
