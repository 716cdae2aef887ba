use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = recall_search::Args::parse();
	recall_search::run(args).await
}
