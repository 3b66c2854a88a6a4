use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use expenseflow_core::audit::AuditSink;
use expenseflow_core::config::{AppConfig, ConfigError, LoadOptions};
use expenseflow_db::repositories::{
    SqlBudgetLedgerRepository, SqlExpenseRepository, SqlSiteRepository,
};
use expenseflow_db::{connect, migrations, DbPool};

use crate::approvals::ApprovalService;
use crate::dispatch::NotificationTransport;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

impl Application {
    /// Wires the SQL-backed approval service over the bootstrapped pool.
    pub fn approval_service<T>(
        &self,
        transport: Arc<T>,
        audit: Arc<dyn AuditSink>,
    ) -> ApprovalService<SqlExpenseRepository, SqlSiteRepository, SqlBudgetLedgerRepository, T>
    where
        T: NotificationTransport,
    {
        ApprovalService::new(
            Arc::new(SqlExpenseRepository::new(self.db_pool.clone())),
            Arc::new(SqlSiteRepository::new(self.db_pool.clone())),
            Arc::new(SqlBudgetLedgerRepository::new(self.db_pool.clone())),
            transport,
            audit,
        )
    }
}
