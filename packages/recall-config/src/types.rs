use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub ranking: RankingConfig,
	#[serde(default)]
	pub expansion: QueryExpansionConfig,
	#[serde(default)]
	pub facade: Facade,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub text_generation: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Endpoint settings shared by the rerank provider. The model id is chosen per call by
/// `ranking.reranker_model`.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Chat-completion endpoint used for query expansion. The model id and token budget come from
/// the `expansion` section.
#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RankingConfig {
	pub semantic_weight: f32,
	/// Only consulted when a keyword index is attached to the engine.
	pub keyword_weight: f32,
	pub semantic_top_k: u32,
	/// Only consulted when a keyword index is attached to the engine.
	pub keyword_top_k: u32,
	pub final_top_k: u32,
	pub enable_reranking: bool,
	pub reranker_model: String,
	pub enable_mmr: bool,
	pub mmr_lambda: f32,
	pub min_similarity: f32,
}
impl Default for RankingConfig {
	fn default() -> Self {
		Self {
			semantic_weight: 0.7,
			keyword_weight: 0.3,
			semantic_top_k: 20,
			keyword_top_k: 20,
			final_top_k: 5,
			enable_reranking: true,
			reranker_model: "BAAI/bge-reranker-base".to_string(),
			enable_mmr: true,
			mmr_lambda: 0.7,
			min_similarity: 0.0,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryExpansionConfig {
	pub enabled: bool,
	pub num_expansions: u32,
	pub model: String,
	pub max_tokens: u32,
}
impl Default for QueryExpansionConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			num_expansions: 2,
			model: "claude-3-5-haiku-20241022".to_string(),
			max_tokens: 100,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Facade {
	pub top_k: u32,
	pub hook_min_performance: f32,
	pub high_performer_min_performance: f32,
}
impl Default for Facade {
	fn default() -> Self {
		Self { top_k: 5, hook_min_performance: 0.5, high_performer_min_performance: 0.7 }
	}
}
