use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fragment::{Fragment, FragmentPosition};

/// A fused hit before its fragment has been loaded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
	pub fragment_id: Uuid,
	pub fused_score: f32,
}

/// Which stage last wrote `RankedResult::score`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
	Fused,
	Rerank,
	Mmr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
	pub fragment: Fragment,
	pub fused_score: f32,
	/// The active score; results leave every stage sorted by it, descending.
	pub score: f32,
	pub score_kind: ScoreKind,
	/// Marginal relevance at the moment MMR picked this result.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mmr_score: Option<f32>,
}
impl RankedResult {
	pub fn from_candidate(candidate: RetrievalCandidate, fragment: Fragment) -> Self {
		Self {
			fragment,
			fused_score: candidate.fused_score,
			score: candidate.fused_score,
			score_kind: ScoreKind::Fused,
			mmr_score: None,
		}
	}

	pub fn fragment_id(&self) -> Uuid {
		self.fragment.fragment_id
	}

	pub fn text(&self) -> &str {
		self.fragment.text.as_str()
	}

	pub fn position(&self) -> FragmentPosition {
		self.fragment.position
	}

	pub fn is_opinion(&self) -> bool {
		self.fragment.is_opinion
	}

	pub fn is_example(&self) -> bool {
		self.fragment.is_example
	}

	pub fn performance_score(&self) -> Option<f32> {
		self.fragment.performance_score
	}

	pub fn embedding(&self) -> Option<&[f32]> {
		self.fragment.embedding.as_deref()
	}
}
