use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Capabilities, KeywordIndex, VectorIndex};
use recall_config::RankingConfig;
use recall_domain::{RetrievalCandidate, channel_namespace};

pub struct FusionOutcome {
	/// Best first, at most `top_k`, no duplicate ids.
	pub candidates: Vec<RetrievalCandidate>,
	/// Embedding of the original query, when it could be computed.
	pub query_embedding: Option<Vec<f32>>,
}

struct QueryHits {
	vector: Vec<f32>,
	semantic: Vec<(Uuid, f32)>,
	keyword: Vec<(Uuid, f32)>,
}

struct QueryTask {
	vectors: Arc<dyn VectorIndex>,
	keywords: Option<Arc<dyn KeywordIndex>>,
	query: String,
	vector: Option<Vec<f32>>,
	namespace: String,
	channel_id: Uuid,
	since: Option<OffsetDateTime>,
	semantic_top_k: u32,
	keyword_top_k: u32,
}
impl QueryTask {
	async fn run(self) -> color_eyre::Result<QueryHits> {
		let vector = match self.vector {
			Some(vector) => vector,
			None => self.vectors.embed(&self.query).await?,
		};
		let semantic =
			self.vectors.query(&vector, self.semantic_top_k, &self.namespace, self.since).await?;
		let keyword = match self.keywords.as_ref() {
			Some(keywords) => match keywords
				.search(&self.query, self.channel_id, self.keyword_top_k, self.since)
				.await
			{
				Ok(hits) => hits,
				Err(err) => {
					warn!(error = %err, query = %self.query, "Keyword search failed; using semantic hits only.");

					Vec::new()
				},
			},
			None => Vec::new(),
		};

		Ok(QueryHits { vector, semantic, keyword })
	}
}

/// Searches every expanded query concurrently and sums their weighted scores per fragment.
///
/// Accumulation happens in expanded-query order after all searches finish, so the outcome does
/// not depend on task scheduling. A query whose embedding or index lookup fails contributes
/// nothing.
pub async fn fuse(
	capabilities: &Capabilities,
	ranking: &RankingConfig,
	queries: &[String],
	channel_id: Uuid,
	since: Option<OffsetDateTime>,
	top_k: usize,
) -> FusionOutcome {
	if queries.is_empty() || top_k == 0 {
		return FusionOutcome { candidates: Vec::new(), query_embedding: None };
	}

	let keywords = if ranking.keyword_weight > 0.0 { capabilities.keywords.clone() } else { None };

	if keywords.is_none() {
		debug!("Keyword channel inactive; fusing semantic hits only.");
	}

	let namespace = channel_namespace(channel_id);
	let mut vectors = prefetch_embeddings(capabilities.vectors.as_ref(), queries).await;
	let mut tasks = JoinSet::new();

	for (idx, query) in queries.iter().enumerate() {
		let task = QueryTask {
			vectors: capabilities.vectors.clone(),
			keywords: keywords.clone(),
			query: query.clone(),
			vector: vectors.get_mut(idx).and_then(Option::take),
			namespace: namespace.clone(),
			channel_id,
			since,
			semantic_top_k: ranking.semantic_top_k,
			keyword_top_k: ranking.keyword_top_k,
		};

		tasks.spawn(async move { (idx, task.run().await) });
	}

	let mut per_query: Vec<Option<QueryHits>> = queries.iter().map(|_| None).collect();

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok((idx, Ok(hits))) => per_query[idx] = Some(hits),
			Ok((idx, Err(err))) => {
				warn!(error = %err, query = %queries[idx], "Search failed for expanded query; skipping it.");
			},
			Err(err) => {
				warn!(error = %err, "Search task aborted; skipping its query.");
			},
		}
	}

	let query_embedding =
		per_query.first().and_then(|hits| hits.as_ref()).map(|hits| hits.vector.clone());
	let mut accumulator = ScoreAccumulator::default();

	for hits in per_query.iter().flatten() {
		for (fragment_id, similarity) in &hits.semantic {
			if !similarity.is_finite() || *similarity < ranking.min_similarity {
				continue;
			}

			accumulator.add(*fragment_id, similarity * ranking.semantic_weight);
		}
		for (fragment_id, score) in normalize_by_max(&hits.keyword) {
			accumulator.add(fragment_id, score * ranking.keyword_weight);
		}
	}

	FusionOutcome { candidates: accumulator.into_top(top_k), query_embedding }
}

// A failed or short batch leaves every slot empty and each task embeds its own query.
async fn prefetch_embeddings(vectors: &dyn VectorIndex, queries: &[String]) -> Vec<Option<Vec<f32>>> {
	match vectors.embed_batch(queries).await {
		Ok(batch) if batch.len() == queries.len() => batch.into_iter().map(Some).collect(),
		Ok(batch) => {
			warn!(
				expected = queries.len(),
				got = batch.len(),
				"Batch embedding returned the wrong count; embedding queries one by one."
			);

			queries.iter().map(|_| None).collect()
		},
		Err(err) => {
			warn!(error = %err, "Batch embedding failed; embedding queries one by one.");

			queries.iter().map(|_| None).collect()
		},
	}
}

/// Running per-fragment totals that remember first-seen order for tie-breaking.
#[derive(Default)]
pub struct ScoreAccumulator {
	order: Vec<(Uuid, f32)>,
	index: HashMap<Uuid, usize>,
}
impl ScoreAccumulator {
	pub fn add(&mut self, fragment_id: Uuid, score: f32) {
		match self.index.get(&fragment_id) {
			Some(&pos) => self.order[pos].1 += score,
			None => {
				self.index.insert(fragment_id, self.order.len());
				self.order.push((fragment_id, score));
			},
		}
	}

	pub fn into_top(self, top_k: usize) -> Vec<RetrievalCandidate> {
		let mut ranked = self.order;

		// Stable sort keeps first-seen order among equal totals.
		ranked.sort_by(|a, b| cmp_f32_desc(a.1, b.1));
		ranked.truncate(top_k);

		ranked
			.into_iter()
			.map(|(fragment_id, fused_score)| RetrievalCandidate { fragment_id, fused_score })
			.collect()
	}
}

pub fn normalize_by_max(hits: &[(Uuid, f32)]) -> Vec<(Uuid, f32)> {
	let max = hits
		.iter()
		.map(|(_, score)| *score)
		.filter(|score| score.is_finite())
		.fold(0.0_f32, f32::max);

	if max <= 0.0 {
		return Vec::new();
	}

	hits.iter()
		.filter(|(_, score)| score.is_finite() && *score > 0.0)
		.map(|(id, score)| (*id, (score / max).clamp(0.0, 1.0)))
		.collect()
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
