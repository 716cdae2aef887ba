use time::OffsetDateTime;
use uuid::Uuid;

use crate::Error;
use recall_domain::{Fragment, FragmentPosition};

#[derive(Debug, sqlx::FromRow)]
pub struct FragmentRow {
	pub fragment_id: Uuid,
	pub channel_id: Uuid,
	pub text: String,
	pub content_type: String,
	pub position: String,
	pub is_opinion: bool,
	pub is_example: bool,
	pub is_analogy: bool,
	pub performance_score: Option<f32>,
	pub embedding: Option<Vec<f32>>,
	pub created_at: OffsetDateTime,
}
impl TryFrom<FragmentRow> for Fragment {
	type Error = Error;

	fn try_from(row: FragmentRow) -> Result<Self, Self::Error> {
		let position: FragmentPosition = row.position.parse().map_err(|err| {
			Error::InvalidRow(format!("Fragment {} has {err}", row.fragment_id))
		})?;

		Ok(Self {
			fragment_id: row.fragment_id,
			channel_id: row.channel_id,
			text: row.text,
			content_type: row.content_type,
			position,
			is_opinion: row.is_opinion,
			is_example: row.is_example,
			is_analogy: row.is_analogy,
			performance_score: row.performance_score,
			created_at: row.created_at,
			embedding: row.embedding.filter(|vec| !vec.is_empty()),
		})
	}
}
