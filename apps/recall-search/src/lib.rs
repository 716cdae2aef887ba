use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use recall_domain::{FragmentFilter, FragmentPosition, RankedResult};
use recall_service::{RetrievalEngine, RetrieveRequest, backends};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
	#[default]
	Retrieve,
	Opinions,
	Examples,
	Hooks,
	HighPerformers,
}

#[derive(Debug, Parser)]
#[command(
	version = recall_cli::VERSION,
	rename_all = "kebab",
	styles = recall_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, value_name = "UUID")]
	pub channel: Uuid,
	/// Query or topic to retrieve fragments for.
	pub query: String,
	#[arg(long, value_enum, default_value_t = Mode::Retrieve)]
	pub mode: Mode,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	/// Only consider fragments created at or after this RFC 3339 timestamp.
	#[arg(long, value_name = "TIMESTAMP", value_parser = parse_since)]
	pub since: Option<OffsetDateTime>,
	#[arg(long = "content-type", value_name = "TYPE")]
	pub content_types: Vec<String>,
	#[arg(long)]
	pub position: Option<FragmentPosition>,
	#[arg(long, value_name = "SCORE")]
	pub min_performance: Option<f32>,
	#[arg(long)]
	pub mmr_lambda: Option<f32>,
	#[arg(long)]
	pub no_rerank: bool,
	#[arg(long)]
	pub no_diversify: bool,
}
impl Args {
	fn request(&self) -> RetrieveRequest {
		let filter = FragmentFilter {
			content_types: (!self.content_types.is_empty()).then(|| self.content_types.clone()),
			position: self.position,
			min_performance: self.min_performance,
			..FragmentFilter::default()
		};

		RetrieveRequest {
			top_k: self.top_k,
			since: self.since,
			filter,
			rerank: !self.no_rerank,
			diversify: !self.no_diversify,
			mmr_lambda: self.mmr_lambda,
			..RetrieveRequest::new(self.query.clone(), self.channel)
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = recall_config::load(&args.config)?;

	init_tracing(&config)?;

	let capabilities = backends::connect(&config).await?;
	let engine = RetrievalEngine::from_config(&config, capabilities)?;
	let results = search(&engine, &args).await?;

	tracing::info!(mode = ?args.mode, returned = results.len(), "Search complete.");
	println!("{}", serde_json::to_string_pretty(&results)?);

	Ok(())
}

async fn search(engine: &RetrievalEngine, args: &Args) -> color_eyre::Result<Vec<RankedResult>> {
	let topic = args.query.as_str();
	let results = match args.mode {
		Mode::Retrieve => engine.retrieve(args.request()).await?,
		Mode::Opinions => engine.retrieve_opinions(topic, args.channel, args.top_k).await?,
		Mode::Examples => engine.retrieve_examples(topic, args.channel, args.top_k).await?,
		Mode::Hooks =>
			engine.retrieve_hooks(topic, args.channel, args.top_k, args.min_performance).await?,
		Mode::HighPerformers =>
			engine
				.retrieve_high_performers(topic, args.channel, args.top_k, args.min_performance)
				.await?,
	};

	Ok(results)
}

fn parse_since(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
	OffsetDateTime::parse(value, &Rfc3339)
}

fn init_tracing(config: &recall_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
