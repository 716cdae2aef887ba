use tracing::{debug, warn};

use recall_domain::{RankedResult, ScoreKind};

#[derive(Clone, Copy)]
struct DiversityPick {
	remaining_pos: usize,
	mmr_score: f32,
	input_rank: usize,
}
impl DiversityPick {
	fn better_than(self, other: &Self) -> bool {
		self.mmr_score > other.mmr_score
			|| (self.mmr_score == other.mmr_score && self.input_rank < other.input_rank)
	}
}

/// Maximal Marginal Relevance reordering.
///
/// Each step picks the candidate maximising `lambda * relevance - (1 - lambda) * redundancy`,
/// where relevance is cosine similarity to the query and redundancy is the highest cosine
/// similarity to anything already picked (0 for the first pick). That value is kept in
/// `mmr_score`; it need not fall from one pick to the next, so the active `score` becomes the
/// rank-normalized selection order instead. If anything needed is missing or malformed, the
/// input comes back unchanged.
pub fn apply_mmr(
	query_embedding: Option<&[f32]>,
	results: Vec<RankedResult>,
	lambda: f32,
	top_k: Option<usize>,
) -> Vec<RankedResult> {
	if results.is_empty() {
		return results;
	}

	match select(query_embedding, &results, lambda, top_k) {
		Ok(picks) => {
			debug!(input = results.len(), selected = picks.len(), lambda, "Applied MMR.");

			let total = picks.len();
			let mut slots: Vec<Option<RankedResult>> = results.into_iter().map(Some).collect();

			picks
				.into_iter()
				.enumerate()
				.filter_map(|(rank, (idx, mmr_score))| {
					slots[idx].take().map(|mut result| {
						result.score = rank_normalize(rank, total);
						result.score_kind = ScoreKind::Mmr;
						result.mmr_score = Some(mmr_score);

						result
					})
				})
				.collect()
		},
		Err(reason) => {
			warn!(reason, "Skipping MMR; returning results unchanged.");

			results
		},
	}
}

fn select(
	query_embedding: Option<&[f32]>,
	results: &[RankedResult],
	lambda: f32,
	top_k: Option<usize>,
) -> Result<Vec<(usize, f32)>, &'static str> {
	if !(lambda.is_finite() && (0.0..=1.0).contains(&lambda)) {
		return Err("lambda is outside 0.0-1.0");
	}

	let query = query_embedding.ok_or("query embedding is unavailable")?;
	let embeddings = results
		.iter()
		.map(RankedResult::embedding)
		.collect::<Option<Vec<&[f32]>>>()
		.ok_or("a candidate has no embedding")?;
	let relevance = embeddings
		.iter()
		.map(|embedding| cosine_similarity(query, embedding))
		.collect::<Option<Vec<f32>>>()
		.ok_or("a candidate embedding is incompatible with the query")?;
	let target = top_k.unwrap_or(results.len()).min(results.len());
	let mut remaining: Vec<usize> = (0..results.len()).collect();
	// Highest similarity of each candidate to anything picked so far; `None` before the first pick.
	let mut redundancy: Vec<Option<f32>> = vec![None; results.len()];
	let mut picks = Vec::with_capacity(target);

	while picks.len() < target {
		let mut best: Option<DiversityPick> = None;

		for (remaining_pos, &idx) in remaining.iter().enumerate() {
			let redundant = redundancy[idx].unwrap_or(0.0);
			let pick = DiversityPick {
				remaining_pos,
				mmr_score: lambda * relevance[idx] - (1.0 - lambda) * redundant,
				input_rank: idx,
			};

			if best.as_ref().map(|current| pick.better_than(current)).unwrap_or(true) {
				best = Some(pick);
			}
		}

		let Some(best) = best else {
			break;
		};
		let chosen = remaining.remove(best.remaining_pos);

		picks.push((chosen, best.mmr_score));

		if picks.len() == target {
			break;
		}

		for &idx in &remaining {
			let similarity = cosine_similarity(embeddings[idx], embeddings[chosen])
				.ok_or("candidate embeddings have mismatched dimensions")?;

			redundancy[idx] =
				Some(redundancy[idx].map_or(similarity, |current| current.max(similarity)));
		}
	}

	Ok(picks)
}

// 1.0 for the first pick down to 0.0 for the last.
fn rank_normalize(rank: usize, total: usize) -> f32 {
	if total <= 1 {
		return 1.0;
	}

	(1.0 - rank as f32 / (total - 1) as f32).clamp(0.0, 1.0)
}

/// `None` when the vectors are empty or differ in length; a zero vector is similar to nothing.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return Some(0.0);
	}

	let similarity = (dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0);

	similarity.is_finite().then_some(similarity)
}
