use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = tcr_api::Args::parse();

	tcr_api::run(args).await
}
