pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_service::{ParleyService, Providers};
use parley_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = parley_cli::VERSION,
	rename_all = "kebab",
	styles = parley_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = parley_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let providers = Providers::from_config(&config)?;
	let service = Arc::new(ParleyService::new(config, db, providers));

	worker::run_worker(service).await
}
