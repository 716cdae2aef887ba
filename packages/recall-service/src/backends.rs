//! Network-backed capabilities: HTTP model providers, Postgres and Qdrant.

use std::{collections::HashMap, sync::Arc};

use color_eyre::eyre;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Capabilities, CrossEncoder, CrossEncoderLoader, FragmentStore, GenerationRequest,
	KeywordIndex, Result, TextGenerator, VectorIndex,
};
use recall_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use recall_domain::{Fragment, FragmentFilter};
use recall_providers::{completion, embedding, rerank};
use recall_storage::{db::Db, qdrant::QdrantStore, queries};

pub struct QdrantVectorIndex {
	pub embedding: EmbeddingProviderConfig,
	pub qdrant: QdrantStore,
}
impl VectorIndex for QdrantVectorIndex {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move {
			let mut vectors = embedding::embed(&self.embedding, &[text.to_string()]).await?;

			vectors.pop().ok_or_else(|| eyre::eyre!("Embedding provider returned no vector."))
		})
	}

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(&self.embedding, texts).await?) })
	}

	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		namespace: &'a str,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>> {
		Box::pin(async move { Ok(self.qdrant.search(vector, top_k, namespace, since).await?) })
	}
}

pub struct PgFragmentStore {
	pub db: Arc<Db>,
}
impl FragmentStore for PgFragmentStore {
	fn load<'a>(
		&'a self,
		channel_id: Uuid,
		ids: &'a [Uuid],
		filter: &'a FragmentFilter,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Fragment>>> {
		Box::pin(async move { Ok(queries::load_fragments(&self.db, channel_id, ids, filter).await?) })
	}
}

pub struct PgKeywordIndex {
	pub db: Arc<Db>,
}
impl KeywordIndex for PgKeywordIndex {
	fn search<'a>(
		&'a self,
		query: &'a str,
		channel_id: Uuid,
		top_k: u32,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>> {
		Box::pin(async move {
			Ok(queries::keyword_search(&self.db, channel_id, query, top_k, since).await?)
		})
	}
}

pub struct HttpTextGenerator {
	pub cfg: LlmProviderConfig,
}
impl TextGenerator for HttpTextGenerator {
	fn generate<'a>(
		&'a self,
		request: &'a GenerationRequest,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			Ok(completion::complete(&self.cfg, &request.model, request.max_tokens, &request.prompt)
				.await?)
		})
	}
}

pub struct HttpCrossEncoderLoader {
	pub cfg: ProviderConfig,
}
impl CrossEncoderLoader for HttpCrossEncoderLoader {
	fn load<'a>(
		&'a self,
		model_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Arc<dyn CrossEncoder>>> {
		Box::pin(async move {
			if model_id.trim().is_empty() {
				return Err(eyre::eyre!("Cross-encoder model id must be non-empty."));
			}

			let model: Arc<dyn CrossEncoder> =
				Arc::new(HttpCrossEncoder { cfg: self.cfg.clone(), model: model_id.to_string() });

			Ok(model)
		})
	}
}

/// Cross-encoder served by a rerank endpoint, which scores many documents against one query.
pub struct HttpCrossEncoder {
	cfg: ProviderConfig,
	model: String,
}
impl CrossEncoder for HttpCrossEncoder {
	fn predict<'a>(
		&'a self,
		pairs: &'a [(String, String)],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move {
			let mut scores = vec![0.0_f32; pairs.len()];

			for (query, indices) in group_by_query(pairs) {
				let docs: Vec<String> = indices.iter().map(|&idx| pairs[idx].1.clone()).collect();
				let group_scores = rerank::rerank(&self.cfg, &self.model, query, &docs).await?;

				for (idx, score) in indices.into_iter().zip(group_scores) {
					scores[idx] = score;
				}
			}

			Ok(scores)
		})
	}
}

// Groups pair positions by query, in order of first appearance.
fn group_by_query(pairs: &[(String, String)]) -> Vec<(&str, Vec<usize>)> {
	let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
	let mut index: HashMap<&str, usize> = HashMap::new();

	for (idx, (query, _)) in pairs.iter().enumerate() {
		match index.get(query.as_str()) {
			Some(&group) => groups[group].1.push(idx),
			None => {
				index.insert(query.as_str(), groups.len());
				groups.push((query.as_str(), vec![idx]));
			},
		}
	}

	groups
}

/// Connects to Postgres and Qdrant, bootstraps their schema, and wires every capability.
pub async fn connect(cfg: &Config) -> Result<Capabilities> {
	let db = Db::connect(&cfg.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	let db = Arc::new(db);
	let vectors = Arc::new(QdrantVectorIndex { embedding: cfg.providers.embedding.clone(), qdrant });
	let store = Arc::new(PgFragmentStore { db: db.clone() });

	Ok(Capabilities::new(vectors, store)
		.with_keywords(Arc::new(PgKeywordIndex { db }))
		.with_generator(Arc::new(HttpTextGenerator { cfg: cfg.providers.text_generation.clone() }))
		.with_cross_encoders(Arc::new(HttpCrossEncoderLoader {
			cfg: cfg.providers.rerank.clone(),
		})))
}
