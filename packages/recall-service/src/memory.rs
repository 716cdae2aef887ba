//! Process-local capabilities for tests, demos and small corpora.

use std::{
	collections::{HashMap, HashSet},
	sync::RwLock,
};

use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::{BoxFuture, FragmentStore, KeywordIndex, VectorIndex, diversity, fusion};
use recall_domain::{Fragment, FragmentFilter, channel_namespace};

struct MemoryPoint {
	fragment_id: Uuid,
	namespace: String,
	vector: Vec<f32>,
	created_at: OffsetDateTime,
}

/// Exact cosine scan over stored vectors.
///
/// Text is embedded with a pinned vector when one was registered through `pin_embedding`,
/// otherwise with a hashed bag-of-words projection of `dimensions` buckets.
pub struct MemoryVectorIndex {
	dimensions: usize,
	pinned: RwLock<HashMap<String, Vec<f32>>>,
	points: RwLock<Vec<MemoryPoint>>,
}
impl MemoryVectorIndex {
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions: dimensions.max(1),
			pinned: RwLock::new(HashMap::new()),
			points: RwLock::new(Vec::new()),
		}
	}

	pub fn pin_embedding(&self, text: &str, vector: Vec<f32>) {
		self.pinned.write().unwrap_or_else(|err| err.into_inner()).insert(text.to_string(), vector);
	}

	pub fn upsert(
		&self,
		fragment_id: Uuid,
		namespace: &str,
		vector: Vec<f32>,
		created_at: OffsetDateTime,
	) {
		let mut points = self.points.write().unwrap_or_else(|err| err.into_inner());

		points.retain(|point| point.fragment_id != fragment_id);
		points.push(MemoryPoint {
			fragment_id,
			namespace: namespace.to_string(),
			vector,
			created_at,
		});
	}

	/// Indexes a fragment under its channel namespace, using its stored embedding if present.
	pub fn upsert_fragment(&self, fragment: &Fragment) {
		let vector = fragment.embedding.clone().unwrap_or_else(|| self.embed_text(&fragment.text));

		self.upsert(
			fragment.fragment_id,
			&channel_namespace(fragment.channel_id),
			vector,
			fragment.created_at,
		);
	}

	pub fn embed_text(&self, text: &str) -> Vec<f32> {
		if let Some(vector) = self.pinned.read().unwrap_or_else(|err| err.into_inner()).get(text) {
			return vector.clone();
		}

		hashed_embedding(text, self.dimensions)
	}

	fn search(
		&self,
		vector: &[f32],
		top_k: u32,
		namespace: &str,
		since: Option<OffsetDateTime>,
	) -> Vec<(Uuid, f32)> {
		let points = self.points.read().unwrap_or_else(|err| err.into_inner());
		let mut hits: Vec<(Uuid, f32)> = points
			.iter()
			.filter(|point| point.namespace == namespace)
			.filter(|point| since.is_none_or(|since| point.created_at >= since))
			.filter_map(|point| {
				diversity::cosine_similarity(vector, &point.vector)
					.map(|similarity| (point.fragment_id, similarity))
			})
			.collect();

		hits.sort_by(|a, b| fusion::cmp_f32_desc(a.1, b.1));
		hits.truncate(top_k as usize);

		hits
	}
}
impl VectorIndex for MemoryVectorIndex {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move { Ok(self.embed_text(text)) })
	}

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(texts.iter().map(|text| self.embed_text(text)).collect()) })
	}

	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		namespace: &'a str,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>> {
		Box::pin(async move { Ok(self.search(vector, top_k, namespace, since)) })
	}
}

#[derive(Default)]
pub struct MemoryFragmentStore {
	fragments: RwLock<HashMap<Uuid, Fragment>>,
}
impl MemoryFragmentStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, fragment: Fragment) {
		self.fragments
			.write()
			.unwrap_or_else(|err| err.into_inner())
			.insert(fragment.fragment_id, fragment);
	}
}
impl FragmentStore for MemoryFragmentStore {
	fn load<'a>(
		&'a self,
		channel_id: Uuid,
		ids: &'a [Uuid],
		filter: &'a FragmentFilter,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Fragment>>> {
		Box::pin(async move {
			let fragments = self.fragments.read().unwrap_or_else(|err| err.into_inner());
			let mut seen = HashSet::new();

			Ok(ids
				.iter()
				.filter(|id| seen.insert(**id))
				.filter_map(|id| fragments.get(id))
				.filter(|fragment| fragment.channel_id == channel_id && filter.matches(fragment))
				.cloned()
				.collect())
		})
	}
}

struct KeywordDoc {
	fragment_id: Uuid,
	channel_id: Uuid,
	terms: HashSet<String>,
	created_at: OffsetDateTime,
}

/// Scores documents by how many distinct query terms they contain.
#[derive(Default)]
pub struct MemoryKeywordIndex {
	docs: RwLock<Vec<KeywordDoc>>,
}
impl MemoryKeywordIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, fragment: &Fragment) {
		let mut docs = self.docs.write().unwrap_or_else(|err| err.into_inner());

		docs.retain(|doc| doc.fragment_id != fragment.fragment_id);
		docs.push(KeywordDoc {
			fragment_id: fragment.fragment_id,
			channel_id: fragment.channel_id,
			terms: terms(&fragment.text).into_iter().collect(),
			created_at: fragment.created_at,
		});
	}

	fn score(
		&self,
		query: &str,
		channel_id: Uuid,
		top_k: u32,
		since: Option<OffsetDateTime>,
	) -> Vec<(Uuid, f32)> {
		let query_terms: HashSet<String> = terms(query).into_iter().collect();

		if query_terms.is_empty() {
			return Vec::new();
		}

		let docs = self.docs.read().unwrap_or_else(|err| err.into_inner());
		let mut hits: Vec<(Uuid, f32)> = docs
			.iter()
			.filter(|doc| doc.channel_id == channel_id)
			.filter(|doc| since.is_none_or(|since| doc.created_at >= since))
			.filter_map(|doc| {
				let overlap = query_terms.iter().filter(|term| doc.terms.contains(*term)).count();

				(overlap > 0).then_some((doc.fragment_id, overlap as f32))
			})
			.collect();

		hits.sort_by(|a, b| fusion::cmp_f32_desc(a.1, b.1));
		hits.truncate(top_k as usize);

		hits
	}
}
impl KeywordIndex for MemoryKeywordIndex {
	fn search<'a>(
		&'a self,
		query: &'a str,
		channel_id: Uuid,
		top_k: u32,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<(Uuid, f32)>>> {
		Box::pin(async move { Ok(self.score(query, channel_id, top_k, since)) })
	}
}

pub fn terms(text: &str) -> Vec<String> {
	let normalized: String = text.nfkc().collect();

	normalized.unicode_words().map(str::to_lowercase).collect()
}

/// Feature-hashes each term into one of `dimensions` buckets with a hash-derived sign, then
/// L2-normalizes. Text without terms maps to the zero vector.
pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimensions];

	if dimensions == 0 {
		return vector;
	}

	for term in terms(text) {
		let hash = blake3::hash(term.as_bytes());
		let bytes = hash.as_bytes();
		let mut bucket = [0_u8; 8];

		bucket.copy_from_slice(&bytes[..8]);

		let slot = (u64::from_le_bytes(bucket) % dimensions as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[slot] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}
