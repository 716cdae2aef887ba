pub mod backends;
pub mod diversity;
pub mod expansion;
pub mod facade;
pub mod fusion;
pub mod loader;
pub mod memory;
pub mod rerank;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use recall_config::{Config, Facade, QueryExpansionConfig, RankingConfig};
use recall_domain::{Fragment, FragmentFilter, RankedResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Embedding model plus nearest-neighbour index over fragment vectors.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;

	/// Returns `(fragment_id, similarity)` pairs inside `namespace`, best first.
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		namespace: &'a str,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>>;
}

/// Lexical search over fragment text. Scores are non-negative; fusion rescales them per batch.
pub trait KeywordIndex
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a str,
		channel_id: Uuid,
		top_k: u32,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
	pub model: String,
	pub max_tokens: u32,
	pub prompt: String,
}

pub trait TextGenerator
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		request: &'a GenerationRequest,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait FragmentStore
where
	Self: Send + Sync,
{
	/// Loads the fragments of `channel_id` among `ids` that satisfy `filter`, in any order.
	fn load<'a>(
		&'a self,
		channel_id: Uuid,
		ids: &'a [Uuid],
		filter: &'a FragmentFilter,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Fragment>>>;
}

pub trait CrossEncoder
where
	Self: Send + Sync,
{
	/// Scores `(query, text)` pairs; one score per pair, in pair order.
	fn predict<'a>(
		&'a self,
		pairs: &'a [(String, String)],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait CrossEncoderLoader
where
	Self: Send + Sync,
{
	fn load<'a>(&'a self, model_id: &'a str)
	-> BoxFuture<'a, color_eyre::Result<Arc<dyn CrossEncoder>>>;
}

/// External collaborators the engine ranks with. Only the vector index and the store are
/// mandatory; every other stage degrades to a no-op when its capability is absent.
#[derive(Clone)]
pub struct Capabilities {
	pub vectors: Arc<dyn VectorIndex>,
	pub store: Arc<dyn FragmentStore>,
	pub keywords: Option<Arc<dyn KeywordIndex>>,
	pub generator: Option<Arc<dyn TextGenerator>>,
	pub cross_encoders: Option<Arc<dyn CrossEncoderLoader>>,
}
impl Capabilities {
	pub fn new(vectors: Arc<dyn VectorIndex>, store: Arc<dyn FragmentStore>) -> Self {
		Self { vectors, store, keywords: None, generator: None, cross_encoders: None }
	}

	pub fn with_keywords(mut self, keywords: Arc<dyn KeywordIndex>) -> Self {
		self.keywords = Some(keywords);

		self
	}

	pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
		self.generator = Some(generator);

		self
	}

	pub fn with_cross_encoders(mut self, loader: Arc<dyn CrossEncoderLoader>) -> Self {
		self.cross_encoders = Some(loader);

		self
	}
}

#[derive(Clone, Debug)]
pub struct RetrieveRequest {
	pub query: String,
	pub channel_id: Uuid,
	/// Overrides `ranking.final_top_k`.
	pub top_k: Option<u32>,
	pub since: Option<OffsetDateTime>,
	pub filter: FragmentFilter,
	/// Per-call opt-out; `ranking.enable_reranking` still gates the stage.
	pub rerank: bool,
	/// Per-call opt-out; `ranking.enable_mmr` still gates the stage.
	pub diversify: bool,
	/// Overrides `ranking.mmr_lambda`.
	pub mmr_lambda: Option<f32>,
}
impl RetrieveRequest {
	pub fn new(query: impl Into<String>, channel_id: Uuid) -> Self {
		Self {
			query: query.into(),
			channel_id,
			top_k: None,
			since: None,
			filter: FragmentFilter::default(),
			rerank: true,
			diversify: true,
			mmr_lambda: None,
		}
	}
}

pub struct RetrievalEngine {
	pub ranking: RankingConfig,
	pub expansion: QueryExpansionConfig,
	pub facade: Facade,
	pub capabilities: Capabilities,
	reranker: rerank::Reranker,
}
impl RetrievalEngine {
	pub fn new(
		ranking: RankingConfig,
		expansion: QueryExpansionConfig,
		facade: Facade,
		capabilities: Capabilities,
	) -> Result<Self> {
		recall_config::validate_ranking(&ranking)?;
		recall_config::validate_expansion(&expansion)?;
		recall_config::validate_facade(&facade)?;

		let reranker = rerank::Reranker::new(
			capabilities.cross_encoders.clone(),
			ranking.reranker_model.clone(),
		);

		Ok(Self { ranking, expansion, facade, capabilities, reranker })
	}

	pub fn from_config(cfg: &Config, capabilities: Capabilities) -> Result<Self> {
		Self::new(cfg.ranking.clone(), cfg.expansion.clone(), cfg.facade.clone(), capabilities)
	}

	pub fn reranker(&self) -> &rerank::Reranker {
		&self.reranker
	}

	/// Runs expansion, fusion, loading, reranking and diversification for one query.
	///
	/// Stage failures degrade the result instead of surfacing; only malformed requests error.
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<Vec<RankedResult>> {
		validate_request(&req)?;

		let query = req.query.trim();

		if query.is_empty() {
			return Ok(Vec::new());
		}

		let top_k = req.top_k.unwrap_or(self.ranking.final_top_k) as usize;
		let queries = expansion::expand_query(
			self.capabilities.generator.as_deref(),
			&self.expansion,
			query,
		)
		.await;
		let fused = fusion::fuse(
			&self.capabilities,
			&self.ranking,
			&queries,
			req.channel_id,
			req.since,
			top_k,
		)
		.await;
		let candidate_count = fused.candidates.len();
		let loaded = loader::load_candidates(
			self.capabilities.store.as_ref(),
			req.channel_id,
			fused.candidates,
			&req.filter,
		)
		.await;
		let loaded_count = loaded.len();
		let reranked = if req.rerank && self.ranking.enable_reranking {
			self.reranker.rerank(query, loaded, Some(top_k)).await
		} else {
			loaded
		};
		let results = if req.diversify && self.ranking.enable_mmr {
			diversity::apply_mmr(
				fused.query_embedding.as_deref(),
				reranked,
				req.mmr_lambda.unwrap_or(self.ranking.mmr_lambda),
				Some(top_k),
			)
		} else {
			reranked
		};

		info!(
			channel_id = %req.channel_id,
			filtered = !req.filter.is_empty(),
			expanded_queries = queries.len(),
			candidates = candidate_count,
			loaded = loaded_count,
			returned = results.len(),
			"Retrieval finished."
		);

		Ok(results)
	}
}

fn validate_request(req: &RetrieveRequest) -> Result<()> {
	if req.top_k == Some(0) {
		return Err(invalid_request("top_k must be greater than zero."));
	}
	if let Some(min) = req.filter.min_performance
		&& !(min.is_finite() && (0.0..=1.0).contains(&min))
	{
		return Err(invalid_request("min_performance must be a finite number in 0.0-1.0."));
	}
	if req.filter.content_types.as_ref().is_some_and(|types| types.is_empty()) {
		return Err(invalid_request("content_types must not be empty when provided."));
	}
	if let Some(lambda) = req.mmr_lambda
		&& !(lambda.is_finite() && (0.0..=1.0).contains(&lambda))
	{
		return Err(invalid_request("mmr_lambda must be a finite number in 0.0-1.0."));
	}

	Ok(())
}

fn invalid_request(message: &str) -> Error {
	Error::InvalidRequest { message: message.to_string() }
}
