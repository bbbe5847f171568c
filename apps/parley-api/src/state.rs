use std::sync::Arc;

use parley_service::{ParleyService, Providers};
use parley_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ParleyService>,
}
impl AppState {
	pub async fn new(config: parley_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let providers = Providers::from_config(&config)?;

		Ok(Self::from_service(ParleyService::new(config, db, providers)))
	}

	pub fn from_service(service: ParleyService) -> Self {
		Self { service: Arc::new(service) }
	}
}
