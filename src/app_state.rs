use crate::{
    config::Config,
    services::{DeductionService, GrantService, RecoveryService},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub grant_service: Arc<GrantService>,
    pub deduction_service: Arc<DeductionService>,
    pub recovery_service: Arc<RecoveryService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        if config.database.run_migrations {
            use migration::{Migrator, MigratorTrait};
            Migrator::up(&db, None).await?;
            tracing::info!("Applied pending migrations");
        }

        Ok(Self::with_connection(db, config))
    }

    /// Build services over an existing connection
    pub fn with_connection(db: DatabaseConnection, config: Config) -> Self {
        let grant_service = Arc::new(GrantService::new(db.clone()));
        let deduction_service = Arc::new(DeductionService::new(db.clone()));
        let recovery_service = Arc::new(RecoveryService::new(db.clone(), &config.ledger));

        Self {
            db,
            grant_service,
            deduction_service,
            recovery_service,
            config: Arc::new(config),
        }
    }
}
