use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub budget: BudgetConfig,
}

/// Per-site spend limits. Absent limits are untracked; category limits
/// apply to the monthly period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub monthly_limit: Option<Decimal>,
    pub yearly_limit: Option<Decimal>,
    pub category_limits: BTreeMap<String, Decimal>,
    pub alert_threshold_percent: u32,
}

impl BudgetConfig {
    /// Expense categories are normalized (trimmed, ASCII-lowercased) at
    /// submission; limit keys must match that form or they never apply.
    /// Repositories call this on ingestion.
    pub fn normalize_categories(mut self) -> Self {
        self.category_limits = self
            .category_limits
            .into_iter()
            .map(|(category, limit)| (category.trim().to_ascii_lowercase(), limit))
            .collect();
        self
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_limit: None,
            yearly_limit: None,
            category_limits: BTreeMap::new(),
            alert_threshold_percent: 80,
        }
    }
}

/// Monthly budget period, e.g. `2025-08`. The yearly key is derived from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: DateTime<Utc>) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn year_key(self) -> String {
        format!("{:04}", self.year)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
