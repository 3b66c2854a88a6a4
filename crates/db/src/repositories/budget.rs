use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use expenseflow_core::budget::SpendSnapshot;
use expenseflow_core::domain::expense::EventId;
use expenseflow_core::domain::site::{PeriodKey, SiteId};

use super::{BudgetLedgerRepository, RepositoryError};
use crate::DbPool;

/// Persistence-backed spend ledger. Idempotence is the `event_id` primary
/// key: `INSERT OR IGNORE` makes re-processing after a crash/retry a no-op.
pub struct SqlBudgetLedgerRepository {
    pool: DbPool,
}

impl SqlBudgetLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn sum_amounts(
        &self,
        query: &str,
        binds: &[&str],
    ) -> Result<Decimal, RepositoryError> {
        let mut q = sqlx::query(query);
        for bind in binds {
            q = q.bind(*bind);
        }
        let rows = q.fetch_all(&self.pool).await?;

        // Amounts are TEXT-encoded decimals; summing happens here rather
        // than in SQL to avoid floating-point drift.
        let mut total = Decimal::ZERO;
        for row in rows {
            let raw: String =
                row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            total += Decimal::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `amount`: {error}"))
            })?;
        }
        Ok(total)
    }
}

#[async_trait::async_trait]
impl BudgetLedgerRepository for SqlBudgetLedgerRepository {
    async fn apply_spend(
        &self,
        event_id: &EventId,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
        amount: Decimal,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO budget_spend
                 (event_id, site_id, category, period, year_period, amount, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event_id.0)
        .bind(&site_id.0)
        .bind(category)
        .bind(period.to_string())
        .bind(period.year_key())
        .bind(amount.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn snapshot(
        &self,
        site_id: &SiteId,
        category: &str,
        period: PeriodKey,
    ) -> Result<SpendSnapshot, RepositoryError> {
        let month = period.to_string();
        let year = period.year_key();

        let site_month_total = self
            .sum_amounts(
                "SELECT amount FROM budget_spend WHERE site_id = ? AND period = ?",
                &[&site_id.0, &month],
            )
            .await?;
        let site_year_total = self
            .sum_amounts(
                "SELECT amount FROM budget_spend WHERE site_id = ? AND year_period = ?",
                &[&site_id.0, &year],
            )
            .await?;
        let category_month_total = self
            .sum_amounts(
                "SELECT amount FROM budget_spend WHERE site_id = ? AND category = ? AND period = ?",
                &[&site_id.0, category, &month],
            )
            .await?;

        Ok(SpendSnapshot { site_month_total, site_year_total, category_month_total })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use expenseflow_core::domain::expense::EventId;
    use expenseflow_core::domain::site::{PeriodKey, SiteId};

    use super::SqlBudgetLedgerRepository;
    use crate::repositories::BudgetLedgerRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlBudgetLedgerRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlBudgetLedgerRepository::new(pool)
    }

    fn site() -> SiteId {
        SiteId("site-hq".to_string())
    }

    #[tokio::test]
    async fn spend_accumulates_across_categories_and_periods() {
        let repo = setup().await;
        let august = PeriodKey::new(2025, 8);

        repo.apply_spend(&EventId::generate(), &site(), "travel", august, Decimal::new(3000, 0))
            .await
            .expect("apply 1");
        repo.apply_spend(&EventId::generate(), &site(), "office", august, Decimal::new(1500, 0))
            .await
            .expect("apply 2");
        repo.apply_spend(
            &EventId::generate(),
            &site(),
            "travel",
            PeriodKey::new(2025, 3),
            Decimal::new(2000, 0),
        )
        .await
        .expect("apply 3");

        let snapshot = repo.snapshot(&site(), "travel", august).await.expect("snapshot");
        assert_eq!(snapshot.site_month_total, Decimal::new(4500, 0));
        assert_eq!(snapshot.site_year_total, Decimal::new(6500, 0));
        assert_eq!(snapshot.category_month_total, Decimal::new(3000, 0));
    }

    #[tokio::test]
    async fn reapplying_the_same_event_is_a_no_op() {
        let repo = setup().await;
        let period = PeriodKey::new(2025, 8);
        let event = EventId::generate();

        let first = repo
            .apply_spend(&event, &site(), "travel", period, Decimal::new(5000, 0))
            .await
            .expect("first apply");
        let second = repo
            .apply_spend(&event, &site(), "travel", period, Decimal::new(5000, 0))
            .await
            .expect("retry apply");

        assert!(first);
        assert!(!second);

        let snapshot = repo.snapshot(&site(), "travel", period).await.expect("snapshot");
        assert_eq!(snapshot.site_month_total, Decimal::new(5000, 0));
    }
}
