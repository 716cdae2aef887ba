use serde_json::Value;

use crate::{Error, Result};
use recall_config::ProviderConfig;

/// Scores every document against `query` with the cross-encoder named by `model`. Scores are
/// returned in document order.
pub async fn rerank(
	cfg: &ProviderConfig,
	model: &str,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({ "model": model, "query": query, "documents": docs });
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::response("Rerank response is missing results array."))?;
	let mut scores: Vec<Option<f32>> = vec![None; doc_count];

	for item in results {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| Error::response("Rerank result missing index."))? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::response("Rerank result missing score."))? as f32;

		if let Some(slot) = scores.get_mut(index) {
			*slot = Some(score);
		}
	}

	scores
		.into_iter()
		.enumerate()
		.map(|(index, score)| {
			score.ok_or_else(|| Error::response(format!("Rerank response has no score for {index}.")))
		})
		.collect()
}
