use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use expenseflow_core::domain::site::{BudgetConfig, Site, SiteId};

use super::{RepositoryError, SiteRepository};
use crate::DbPool;

pub struct SqlSiteRepository {
    pool: DbPool,
}

impl SqlSiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_limit(field: &str, value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `{field}`: {error}"))
            })
        })
        .transpose()
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<Site, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let id: String = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let monthly_limit: Option<String> = row.try_get("monthly_limit").map_err(decode)?;
    let yearly_limit: Option<String> = row.try_get("yearly_limit").map_err(decode)?;
    let category_limits_json: String = row.try_get("category_limits").map_err(decode)?;
    let alert_threshold_percent: i64 =
        row.try_get("alert_threshold_percent").map_err(decode)?;

    let category_limits_raw: BTreeMap<String, String> =
        serde_json::from_str(&category_limits_json).map_err(|error| {
            RepositoryError::Decode(format!("invalid category_limits json: {error}"))
        })?;
    let mut category_limits = BTreeMap::new();
    for (category, raw) in category_limits_raw {
        let limit = Decimal::from_str(&raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid limit for category `{category}`: {error}"))
        })?;
        category_limits.insert(category, limit);
    }

    Ok(Site {
        id: SiteId(id),
        name,
        budget: BudgetConfig {
            monthly_limit: parse_limit("monthly_limit", monthly_limit)?,
            yearly_limit: parse_limit("yearly_limit", yearly_limit)?,
            category_limits,
            alert_threshold_percent: u32::try_from(alert_threshold_percent).map_err(|_| {
                RepositoryError::Decode(format!(
                    "alert_threshold_percent {alert_threshold_percent} out of range"
                ))
            })?,
        },
    })
}

#[async_trait::async_trait]
impl SiteRepository for SqlSiteRepository {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, monthly_limit, yearly_limit, category_limits, alert_threshold_percent
             FROM site WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_site(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, site: Site) -> Result<(), RepositoryError> {
        let site = Site { budget: site.budget.clone().normalize_categories(), ..site };
        let category_limits: BTreeMap<String, String> = site
            .budget
            .category_limits
            .iter()
            .map(|(category, limit)| (category.clone(), limit.to_string()))
            .collect();
        let category_limits_json = serde_json::to_string(&category_limits)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO site (id, name, monthly_limit, yearly_limit, category_limits,
                               alert_threshold_percent)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 monthly_limit = excluded.monthly_limit,
                 yearly_limit = excluded.yearly_limit,
                 category_limits = excluded.category_limits,
                 alert_threshold_percent = excluded.alert_threshold_percent",
        )
        .bind(&site.id.0)
        .bind(&site.name)
        .bind(site.budget.monthly_limit.map(|limit| limit.to_string()))
        .bind(site.budget.yearly_limit.map(|limit| limit.to_string()))
        .bind(category_limits_json)
        .bind(i64::from(site.budget.alert_threshold_percent))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
