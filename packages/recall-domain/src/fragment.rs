use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Where a fragment sat inside the script it was cut from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentPosition {
	Hook,
	Body,
	Conclusion,
}
impl FragmentPosition {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Hook => "hook",
			Self::Body => "body",
			Self::Conclusion => "conclusion",
		}
	}
}
impl fmt::Display for FragmentPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for FragmentPosition {
	type Err = UnknownPosition;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"hook" => Ok(Self::Hook),
			"body" => Ok(Self::Body),
			"conclusion" => Ok(Self::Conclusion),
			_ => Err(UnknownPosition(value.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPosition(pub String);
impl fmt::Display for UnknownPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown fragment position {:?}.", self.0)
	}
}
impl std::error::Error for UnknownPosition {}

/// A stored unit of previously generated script text plus the metadata ranking filters on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
	pub fragment_id: Uuid,
	pub channel_id: Uuid,
	pub text: String,
	pub content_type: String,
	pub position: FragmentPosition,
	pub is_opinion: bool,
	pub is_example: bool,
	pub is_analogy: bool,
	pub performance_score: Option<f32>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(default, skip_serializing)]
	pub embedding: Option<Vec<f32>>,
}

/// Attribute filters applied while loading candidates. Every supplied field must hold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentFilter {
	pub content_types: Option<Vec<String>>,
	pub position: Option<FragmentPosition>,
	pub min_performance: Option<f32>,
	pub is_opinion: Option<bool>,
	pub is_example: Option<bool>,
}
impl FragmentFilter {
	pub fn opinions() -> Self {
		Self { is_opinion: Some(true), ..Self::default() }
	}

	pub fn examples() -> Self {
		Self { is_example: Some(true), ..Self::default() }
	}

	pub fn hooks(min_performance: f32) -> Self {
		Self {
			position: Some(FragmentPosition::Hook),
			min_performance: Some(min_performance),
			..Self::default()
		}
	}

	pub fn high_performers(min_performance: f32) -> Self {
		Self { min_performance: Some(min_performance), ..Self::default() }
	}

	pub fn is_empty(&self) -> bool {
		self.content_types.is_none()
			&& self.position.is_none()
			&& self.min_performance.is_none()
			&& self.is_opinion.is_none()
			&& self.is_example.is_none()
	}

	/// A fragment without a performance score never satisfies a minimum-performance bound.
	pub fn matches(&self, fragment: &Fragment) -> bool {
		if let Some(types) = self.content_types.as_ref()
			&& !types.iter().any(|value| value == &fragment.content_type)
		{
			return false;
		}
		if let Some(position) = self.position
			&& position != fragment.position
		{
			return false;
		}
		if let Some(min) = self.min_performance
			&& fragment.performance_score.map(|score| score < min).unwrap_or(true)
		{
			return false;
		}
		if let Some(flag) = self.is_opinion
			&& flag != fragment.is_opinion
		{
			return false;
		}
		if let Some(flag) = self.is_example
			&& flag != fragment.is_example
		{
			return false;
		}

		true
	}
}

pub fn channel_namespace(channel_id: Uuid) -> String {
	format!("channel_{channel_id}")
}
