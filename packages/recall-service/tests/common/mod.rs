#![allow(dead_code)]

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use color_eyre::eyre;
use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

use recall_config::{Facade, QueryExpansionConfig, RankingConfig};
use recall_domain::{Fragment, FragmentFilter, FragmentPosition, RankedResult, RetrievalCandidate};
use recall_service::{
	BoxFuture, Capabilities, CrossEncoder, CrossEncoderLoader, FragmentStore, GenerationRequest,
	RetrievalEngine, TextGenerator, VectorIndex, memory::MemoryFragmentStore,
};

pub fn channel() -> Uuid {
	Uuid::from_u128(0xC0FFEE)
}

pub fn id(n: u128) -> Uuid {
	Uuid::from_u128(n)
}

pub fn fragment(n: u128, text: &str) -> Fragment {
	Fragment {
		fragment_id: id(n),
		channel_id: channel(),
		text: text.to_string(),
		content_type: "essay".to_string(),
		position: FragmentPosition::Body,
		is_opinion: false,
		is_example: false,
		is_analogy: false,
		performance_score: None,
		created_at: datetime!(2026-03-01 12:00 UTC),
		embedding: None,
	}
}

pub fn ranked(n: u128, score: f32, embedding: Option<Vec<f32>>) -> RankedResult {
	let mut fragment = fragment(n, &format!("fragment {n}"));

	fragment.embedding = embedding;

	RankedResult::from_candidate(RetrievalCandidate { fragment_id: id(n), fused_score: score }, fragment)
}

pub fn ids(results: &[RankedResult]) -> Vec<Uuid> {
	results.iter().map(RankedResult::fragment_id).collect()
}

pub fn quiet_ranking() -> RankingConfig {
	RankingConfig { enable_reranking: false, enable_mmr: false, ..RankingConfig::default() }
}

pub fn no_expansion() -> QueryExpansionConfig {
	QueryExpansionConfig { enabled: false, ..QueryExpansionConfig::default() }
}

pub fn engine(
	ranking: RankingConfig,
	expansion: QueryExpansionConfig,
	capabilities: Capabilities,
) -> RetrievalEngine {
	RetrievalEngine::new(ranking, expansion, Facade::default(), capabilities)
		.expect("Engine config should be valid.")
}

/// Vector index whose embeddings and hits are scripted per query text.
#[derive(Default)]
pub struct ScriptedIndex {
	embeddings: HashMap<String, Vec<f32>>,
	hits: HashMap<String, Vec<(Uuid, f32)>>,
	failing: Vec<String>,
	pub embed_calls: AtomicUsize,
	pub query_calls: AtomicUsize,
	pub namespaces: Mutex<Vec<String>>,
}
impl ScriptedIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `text` with a unique one-hot embedding and the hits its search returns.
	pub fn with_query(mut self, text: &str, hits: Vec<(Uuid, f32)>) -> Self {
		let mut vector = vec![0.0; 16];
		let slot = self.embeddings.len() % 16;

		vector[slot] = 1.0;

		self.embeddings.insert(text.to_string(), vector);
		self.hits.insert(text.to_string(), hits);

		self
	}

	pub fn with_failing_query(mut self, text: &str) -> Self {
		self.failing.push(text.to_string());

		self
	}

	pub fn calls(&self) -> usize {
		self.embed_calls.load(Ordering::SeqCst) + self.query_calls.load(Ordering::SeqCst)
	}

	fn embed_one(&self, text: &str) -> color_eyre::Result<Vec<f32>> {
		if self.failing.iter().any(|failing| failing == text) {
			return Err(eyre::eyre!("Embedding failed for {text:?}."));
		}

		self.embeddings
			.get(text)
			.cloned()
			.ok_or_else(|| eyre::eyre!("No scripted embedding for {text:?}."))
	}
}
impl VectorIndex for ScriptedIndex {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		self.embed_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { self.embed_one(text) })
	}

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		self.embed_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { texts.iter().map(|text| self.embed_one(text)).collect() })
	}

	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		namespace: &'a str,
		_since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>> {
		self.query_calls.fetch_add(1, Ordering::SeqCst);
		self.namespaces.lock().unwrap_or_else(|err| err.into_inner()).push(namespace.to_string());

		Box::pin(async move {
			let text = self
				.embeddings
				.iter()
				.find(|(_, embedding)| embedding.as_slice() == vector)
				.map(|(text, _)| text.clone())
				.ok_or_else(|| eyre::eyre!("Unknown query vector."))?;
			let mut hits = self.hits.get(&text).cloned().unwrap_or_default();

			hits.truncate(top_k as usize);

			Ok(hits)
		})
	}
}

pub struct FailingStore;
impl FragmentStore for FailingStore {
	fn load<'a>(
		&'a self,
		_channel_id: Uuid,
		_ids: &'a [Uuid],
		_filter: &'a FragmentFilter,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Fragment>>> {
		Box::pin(async move { Err(eyre::eyre!("Connection refused.")) })
	}
}

/// Store that records the filter of every load before delegating to memory.
pub struct RecordingStore {
	pub inner: MemoryFragmentStore,
	pub filters: Mutex<Vec<FragmentFilter>>,
}
impl RecordingStore {
	pub fn new(inner: MemoryFragmentStore) -> Self {
		Self { inner, filters: Mutex::new(Vec::new()) }
	}

	pub fn last_filter(&self) -> Option<FragmentFilter> {
		self.filters.lock().unwrap_or_else(|err| err.into_inner()).last().cloned()
	}
}
impl FragmentStore for RecordingStore {
	fn load<'a>(
		&'a self,
		channel_id: Uuid,
		ids: &'a [Uuid],
		filter: &'a FragmentFilter,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Fragment>>> {
		self.filters.lock().unwrap_or_else(|err| err.into_inner()).push(filter.clone());

		self.inner.load(channel_id, ids, filter)
	}
}

pub struct ScriptedGenerator {
	reply: Result<String, String>,
	pub calls: AtomicUsize,
	pub requests: Mutex<Vec<GenerationRequest>>,
}
impl ScriptedGenerator {
	pub fn replying(reply: &str) -> Self {
		Self { reply: Ok(reply.to_string()), calls: AtomicUsize::new(0), requests: Mutex::new(Vec::new()) }
	}

	pub fn failing(message: &str) -> Self {
		Self {
			reply: Err(message.to_string()),
			calls: AtomicUsize::new(0),
			requests: Mutex::new(Vec::new()),
		}
	}

	pub fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TextGenerator for ScriptedGenerator {
	fn generate<'a>(
		&'a self,
		request: &'a GenerationRequest,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.requests.lock().unwrap_or_else(|err| err.into_inner()).push(request.clone());

		Box::pin(async move { self.reply.clone().map_err(|message| eyre::eyre!(message)) })
	}
}

/// Scores each pair by a fixed per-text table; unknown texts score zero.
pub struct TableEncoder {
	pub scores: HashMap<String, f32>,
}
impl CrossEncoder for TableEncoder {
	fn predict<'a>(
		&'a self,
		pairs: &'a [(String, String)],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move {
			Ok(pairs.iter().map(|(_, text)| self.scores.get(text).copied().unwrap_or(0.0)).collect())
		})
	}
}

pub struct FailingEncoder;
impl CrossEncoder for FailingEncoder {
	fn predict<'a>(
		&'a self,
		_pairs: &'a [(String, String)],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move { Err(eyre::eyre!("CUDA out of memory.")) })
	}
}

/// Returns a fixed score vector regardless of input length.
pub struct RawEncoder {
	pub scores: Vec<f32>,
}
impl CrossEncoder for RawEncoder {
	fn predict<'a>(
		&'a self,
		_pairs: &'a [(String, String)],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move { Ok(self.scores.clone()) })
	}
}

/// Loader that counts loads and fails the first `failures` of them.
pub struct CountingLoader {
	encoder: Arc<dyn CrossEncoder>,
	failures: AtomicUsize,
	pub loads: AtomicUsize,
	pub model_ids: Mutex<Vec<String>>,
}
impl CountingLoader {
	pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
		Self::failing_first(encoder, 0)
	}

	pub fn failing_first(encoder: Arc<dyn CrossEncoder>, failures: usize) -> Self {
		Self {
			encoder,
			failures: AtomicUsize::new(failures),
			loads: AtomicUsize::new(0),
			model_ids: Mutex::new(Vec::new()),
		}
	}

	pub fn count(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}
impl CrossEncoderLoader for CountingLoader {
	fn load<'a>(
		&'a self,
		model_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Arc<dyn CrossEncoder>>> {
		self.loads.fetch_add(1, Ordering::SeqCst);
		self.model_ids.lock().unwrap_or_else(|err| err.into_inner()).push(model_id.to_string());

		Box::pin(async move {
			let remaining = self.failures.load(Ordering::SeqCst);

			if remaining > 0 {
				self.failures.store(remaining - 1, Ordering::SeqCst);

				return Err(eyre::eyre!("Model download failed."));
			}

			Ok(self.encoder.clone())
		})
	}
}
