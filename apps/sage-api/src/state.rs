use std::sync::Arc;

use sage_service::SageService;
use sage_storage::{db::Db, pg::PgRegistry, qdrant::QdrantIndex};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<SageService>,
}
impl AppState {
	pub async fn new(config: sage_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let registry = Arc::new(PgRegistry::new(db.pool.clone()));
		let index = Arc::new(QdrantIndex::new(&config.storage.qdrant)?);
		let service = SageService::new(config, registry, index);

		Ok(Self { service: Arc::new(service) })
	}

	pub fn with_service(service: Arc<SageService>) -> Self {
		Self { service }
	}
}
