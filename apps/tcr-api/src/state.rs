use std::sync::Arc;

use tcr_config::BOOSTABLE_FIELDS;
use tcr_service::TcrService;
use tcr_storage::qdrant::QdrantStore;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<TcrService>,
}
impl AppState {
	pub async fn new(config: tcr_config::Config) -> color_eyre::Result<Self> {
		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection(&BOOSTABLE_FIELDS).await?;

		let service = TcrService::new(config, qdrant)?;

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: TcrService) -> Self {
		Self { service: Arc::new(service) }
	}
}
