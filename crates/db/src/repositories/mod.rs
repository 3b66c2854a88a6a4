use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use expenseflow_core::budget::SpendSnapshot;
use expenseflow_core::domain::expense::{EventId, ExpenseId, ExpenseRecord, ExpenseStatus};
use expenseflow_core::domain::site::{PeriodKey, Site, SiteId};

pub mod budget;
pub mod expense;
pub mod memory;
pub mod site;

pub use budget::SqlBudgetLedgerRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{InMemoryBudgetLedgerRepository, InMemoryExpenseRepository, InMemorySiteRepository};
pub use site::SqlSiteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<ExpenseRecord>, RepositoryError>;

    async fn insert(&self, expense: ExpenseRecord) -> Result<(), RepositoryError>;

    /// Atomic conditional update: commits `updated` (including its newest
    /// history entry) only while the stored status still equals
    /// `expected_status`. Exactly one concurrent writer wins; the rest see
    /// `false`.
    async fn compare_and_swap_status(
        &self,
        expected_status: ExpenseStatus,
        updated: &ExpenseRecord,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError>;
    async fn save(&self, site: Site) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BudgetLedgerRepository: Send + Sync {
    /// Records spend keyed on the approval event id. Returns `false` when
    /// the event was already applied, so crash/retry re-processing never
    /// double-adds.
    async fn apply_spend(
        &self,
        event_id: &EventId,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
        amount: Decimal,
    ) -> Result<bool, RepositoryError>;

    async fn snapshot(
        &self,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
    ) -> Result<SpendSnapshot, RepositoryError>;
}
