use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{CrossEncoder, CrossEncoderLoader, fusion};
use recall_domain::{RankedResult, ScoreKind};

/// Cross-encoder stage. The model is loaded on first use and shared by every later call; a failed
/// load leaves the slot empty so the next call tries again.
pub struct Reranker {
	loader: Option<Arc<dyn CrossEncoderLoader>>,
	model_id: String,
	model: OnceCell<Arc<dyn CrossEncoder>>,
}
impl Reranker {
	pub fn new(loader: Option<Arc<dyn CrossEncoderLoader>>, model_id: String) -> Self {
		Self { loader, model_id, model: OnceCell::new() }
	}

	pub fn is_loaded(&self) -> bool {
		self.model.initialized()
	}

	/// Rescores `results` against `query` and sorts by the new score. On any failure the input is
	/// returned exactly as given.
	pub async fn rerank(
		&self,
		query: &str,
		results: Vec<RankedResult>,
		top_k: Option<usize>,
	) -> Vec<RankedResult> {
		if results.is_empty() {
			return results;
		}

		let model = match self.model().await {
			Ok(model) => model,
			Err(err) => {
				warn!(error = %err, model = %self.model_id, "Cross-encoder unavailable; keeping fused order.");

				return results;
			},
		};
		let pairs: Vec<(String, String)> =
			results.iter().map(|result| (query.to_string(), result.text().to_string())).collect();
		let scores = match model.predict(&pairs).await {
			Ok(scores) => scores,
			Err(err) => {
				warn!(error = %err, "Reranking failed; keeping fused order.");

				return results;
			},
		};

		if scores.len() != results.len() {
			warn!(
				expected = results.len(),
				got = scores.len(),
				"Cross-encoder returned the wrong number of scores; keeping fused order."
			);

			return results;
		}
		if scores.iter().any(|score| !score.is_finite()) {
			warn!("Cross-encoder returned a non-finite score; keeping fused order.");

			return results;
		}

		let mut reranked: Vec<RankedResult> = results
			.into_iter()
			.zip(scores)
			.map(|(mut result, score)| {
				result.score = score;
				result.score_kind = ScoreKind::Rerank;

				result
			})
			.collect();

		reranked.sort_by(|a, b| fusion::cmp_f32_desc(a.score, b.score));

		if let Some(top_k) = top_k {
			reranked.truncate(top_k);
		}

		debug!(count = reranked.len(), top_score = reranked.first().map(|r| r.score), "Reranked results.");

		reranked
	}

	async fn model(&self) -> color_eyre::Result<&Arc<dyn CrossEncoder>> {
		let Some(loader) = self.loader.as_ref() else {
			return Err(color_eyre::eyre::eyre!("No cross-encoder loader is configured."));
		};

		self.model
			.get_or_try_init(|| async {
				debug!(model = %self.model_id, "Loading cross-encoder.");

				loader.load(&self.model_id).await
			})
			.await
	}
}
