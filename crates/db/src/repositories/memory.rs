use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use expenseflow_core::budget::SpendSnapshot;
use expenseflow_core::domain::expense::{EventId, ExpenseId, ExpenseRecord, ExpenseStatus};
use expenseflow_core::domain::site::{PeriodKey, Site, SiteId};

use super::{
    BudgetLedgerRepository, ExpenseRepository, RepositoryError, SiteRepository,
};

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, ExpenseRecord>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<ExpenseRecord>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn insert(&self, expense: ExpenseRecord) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn compare_and_swap_status(
        &self,
        expected_status: ExpenseStatus,
        updated: &ExpenseRecord,
    ) -> Result<bool, RepositoryError> {
        // The write lock is held across check and replace, matching the
        // exactly-one-winner guarantee of the SQL implementation.
        let mut expenses = self.expenses.write().await;
        match expenses.get(&updated.id.0) {
            Some(current) if current.status == expected_status => {
                expenses.insert(updated.id.0.clone(), updated.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemorySiteRepository {
    sites: RwLock<HashMap<String, Site>>,
}

#[async_trait::async_trait]
impl SiteRepository for InMemorySiteRepository {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError> {
        let sites = self.sites.read().await;
        Ok(sites.get(&id.0).cloned())
    }

    async fn save(&self, site: Site) -> Result<(), RepositoryError> {
        let site = Site { budget: site.budget.clone().normalize_categories(), ..site };
        let mut sites = self.sites.write().await;
        sites.insert(site.id.0.clone(), site);
        Ok(())
    }
}

#[derive(Default)]
struct LedgerState {
    applied_events: HashSet<String>,
    entries: Vec<(String, String, String, Decimal)>,
}

#[derive(Default)]
pub struct InMemoryBudgetLedgerRepository {
    state: RwLock<LedgerState>,
}

#[async_trait::async_trait]
impl BudgetLedgerRepository for InMemoryBudgetLedgerRepository {
    async fn apply_spend(
        &self,
        event_id: &EventId,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
        amount: Decimal,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.applied_events.insert(event_id.0.clone()) {
            return Ok(false);
        }
        state.entries.push((
            site_id.0.clone(),
            category.to_owned(),
            period.to_string(),
            amount,
        ));
        Ok(true)
    }

    async fn snapshot(
        &self,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
    ) -> Result<SpendSnapshot, RepositoryError> {
        let month = period.to_string();
        let year_prefix = format!("{}-", period.year_key());

        let state = self.state.read().await;
        let mut snapshot = SpendSnapshot::default();
        for (entry_site, entry_category, entry_period, amount) in &state.entries {
            if entry_site != &site_id.0 {
                continue;
            }
            if entry_period.starts_with(&year_prefix) {
                snapshot.site_year_total += *amount;
            }
            if entry_period == &month {
                snapshot.site_month_total += *amount;
                if entry_category == category {
                    snapshot.category_month_total += *amount;
                }
            }
        }
        Ok(snapshot)
    }
}
