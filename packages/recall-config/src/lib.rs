mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Facade, LlmProviderConfig, Postgres, ProviderConfig,
	Providers, Qdrant, QueryExpansionConfig, RankingConfig, Service, Storage,
};

use std::{fs, ops::RangeInclusive, path::Path};

pub const MAX_SEMANTIC_TOP_K: u32 = 100;
pub const MAX_KEYWORD_TOP_K: u32 = 100;
pub const MAX_FINAL_TOP_K: u32 = 20;
pub const MAX_EXPANSIONS: u32 = 5;
pub const EXPANSION_MAX_TOKENS: RangeInclusive<u32> = 50..=500;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(invalid("service.log_level must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(invalid("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(invalid("storage.qdrant.collection must be non-empty."));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(invalid("providers.embedding.dimensions must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(invalid(
			"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
		));
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("text_generation", &cfg.providers.text_generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	validate_ranking(&cfg.ranking)?;
	validate_expansion(&cfg.expansion)?;
	validate_facade(&cfg.facade)?;

	Ok(())
}

pub fn validate_ranking(ranking: &RankingConfig) -> Result<()> {
	unit_interval("ranking.semantic_weight", ranking.semantic_weight)?;
	unit_interval("ranking.keyword_weight", ranking.keyword_weight)?;
	unit_interval("ranking.mmr_lambda", ranking.mmr_lambda)?;
	unit_interval("ranking.min_similarity", ranking.min_similarity)?;
	bounded_count("ranking.semantic_top_k", ranking.semantic_top_k, 1..=MAX_SEMANTIC_TOP_K)?;
	bounded_count("ranking.keyword_top_k", ranking.keyword_top_k, 1..=MAX_KEYWORD_TOP_K)?;
	bounded_count("ranking.final_top_k", ranking.final_top_k, 1..=MAX_FINAL_TOP_K)?;

	if ranking.reranker_model.trim().is_empty() {
		return Err(invalid("ranking.reranker_model must be non-empty."));
	}

	Ok(())
}

pub fn validate_expansion(expansion: &QueryExpansionConfig) -> Result<()> {
	bounded_count("expansion.num_expansions", expansion.num_expansions, 1..=MAX_EXPANSIONS)?;
	bounded_count("expansion.max_tokens", expansion.max_tokens, EXPANSION_MAX_TOKENS)?;

	if expansion.model.trim().is_empty() {
		return Err(invalid("expansion.model must be non-empty."));
	}

	Ok(())
}

pub fn validate_facade(facade: &Facade) -> Result<()> {
	if facade.top_k == 0 {
		return Err(invalid("facade.top_k must be greater than zero."));
	}

	unit_interval("facade.hook_min_performance", facade.hook_min_performance)?;
	unit_interval("facade.high_performer_min_performance", facade.high_performer_min_performance)?;

	Ok(())
}

fn unit_interval(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation {
			message: format!("{label} must be in the range 0.0-1.0."),
		});
	}

	Ok(())
}

fn bounded_count(label: &str, value: u32, range: RangeInclusive<u32>) -> Result<()> {
	if !range.contains(&value) {
		return Err(Error::Validation {
			message: format!(
				"{label} must be in the range {}-{}.",
				range.start(),
				range.end()
			),
		});
	}

	Ok(())
}

fn invalid(message: &str) -> Error {
	Error::Validation { message: message.to_string() }
}

fn normalize(cfg: &mut Config) {
	cfg.ranking.reranker_model = cfg.ranking.reranker_model.trim().to_string();
	cfg.expansion.model = cfg.expansion.model.trim().to_string();

	let base = cfg.providers.embedding.api_base.trim_end_matches('/').to_string();

	cfg.providers.embedding.api_base = base;

	let base = cfg.providers.rerank.api_base.trim_end_matches('/').to_string();

	cfg.providers.rerank.api_base = base;

	let base = cfg.providers.text_generation.api_base.trim_end_matches('/').to_string();

	cfg.providers.text_generation.api_base = base;
}
