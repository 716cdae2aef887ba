use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::FragmentStore;
use recall_domain::{FragmentFilter, RankedResult, RetrievalCandidate};

/// Attaches fragments to candidates, dropping any the store cannot resolve under `filter`.
/// Candidate order is preserved.
pub async fn load_candidates(
	store: &dyn FragmentStore,
	channel_id: Uuid,
	candidates: Vec<RetrievalCandidate>,
	filter: &FragmentFilter,
) -> Vec<RankedResult> {
	if candidates.is_empty() {
		return Vec::new();
	}

	let ids: Vec<Uuid> = candidates.iter().map(|candidate| candidate.fragment_id).collect();
	let fragments = match store.load(channel_id, &ids, filter).await {
		Ok(fragments) => fragments,
		Err(err) => {
			warn!(
				error = %err,
				channel_id = %channel_id,
				candidates = ids.len(),
				"Fragment load failed; dropping candidates."
			);

			return Vec::new();
		},
	};
	let mut by_id: HashMap<Uuid, _> = fragments
		.into_iter()
		.filter(|fragment| fragment.channel_id == channel_id && filter.matches(fragment))
		.map(|fragment| (fragment.fragment_id, fragment))
		.collect();

	candidates
		.into_iter()
		.filter_map(|candidate| {
			by_id
				.remove(&candidate.fragment_id)
				.map(|fragment| RankedResult::from_candidate(candidate, fragment))
		})
		.collect()
}
