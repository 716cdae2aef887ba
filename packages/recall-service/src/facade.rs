//! Entry points pre-bound to the filters content generation asks for most often.

use tracing::info;
use uuid::Uuid;

use crate::{Result, RetrievalEngine, RetrieveRequest};
use recall_domain::{FragmentFilter, RankedResult};

impl RetrievalEngine {
	pub async fn retrieve_opinions(
		&self,
		topic: &str,
		channel_id: Uuid,
		top_k: Option<u32>,
	) -> Result<Vec<RankedResult>> {
		info!(topic, "Retrieving opinions.");

		self.retrieve(self.facade_request(topic, channel_id, top_k, FragmentFilter::opinions()))
			.await
	}

	pub async fn retrieve_examples(
		&self,
		topic: &str,
		channel_id: Uuid,
		top_k: Option<u32>,
	) -> Result<Vec<RankedResult>> {
		info!(topic, "Retrieving examples.");

		self.retrieve(self.facade_request(topic, channel_id, top_k, FragmentFilter::examples()))
			.await
	}

	/// Opening fragments whose performance score is at least `min_performance`
	/// (default `facade.hook_min_performance`).
	pub async fn retrieve_hooks(
		&self,
		topic: &str,
		channel_id: Uuid,
		top_k: Option<u32>,
		min_performance: Option<f32>,
	) -> Result<Vec<RankedResult>> {
		let min_performance = min_performance.unwrap_or(self.facade.hook_min_performance);

		info!(topic, min_performance, "Retrieving hooks.");

		self.retrieve(self.facade_request(
			topic,
			channel_id,
			top_k,
			FragmentFilter::hooks(min_performance),
		))
		.await
	}

	pub async fn retrieve_high_performers(
		&self,
		topic: &str,
		channel_id: Uuid,
		top_k: Option<u32>,
		min_performance: Option<f32>,
	) -> Result<Vec<RankedResult>> {
		let min_performance =
			min_performance.unwrap_or(self.facade.high_performer_min_performance);

		info!(topic, min_performance, "Retrieving high performers.");

		self.retrieve(self.facade_request(
			topic,
			channel_id,
			top_k,
			FragmentFilter::high_performers(min_performance),
		))
		.await
	}

	fn facade_request(
		&self,
		topic: &str,
		channel_id: Uuid,
		top_k: Option<u32>,
		filter: FragmentFilter,
	) -> RetrieveRequest {
		RetrieveRequest {
			top_k: Some(top_k.unwrap_or(self.facade.top_k)),
			filter,
			..RetrieveRequest::new(topic, channel_id)
		}
	}
}
