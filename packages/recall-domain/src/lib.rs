pub mod fragment;
pub mod ranking;
pub mod time_serde;

pub use fragment::{
	Fragment, FragmentFilter, FragmentPosition, UnknownPosition, channel_namespace,
};
pub use ranking::{RankedResult, RetrievalCandidate, ScoreKind};
