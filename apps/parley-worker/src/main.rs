use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = parley_worker::Args::parse();

	parley_worker::run(args).await
}
