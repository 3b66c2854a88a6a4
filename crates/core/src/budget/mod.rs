use std::collections::{HashMap, HashSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::expense::EventId;
use crate::domain::site::{BudgetConfig, PeriodKey, SiteId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachScope {
    SiteMonthly,
    SiteYearly,
    CategoryMonthly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetBreach {
    pub site_id: SiteId,
    pub category: Option<String>,
    pub scope: BreachScope,
    pub period: String,
    pub utilization_percent: u32,
    pub threshold_percent: u32,
}

/// Running totals for one site and period, however they were accumulated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpendSnapshot {
    pub site_month_total: Decimal,
    pub site_year_total: Decimal,
    pub category_month_total: Decimal,
}

/// Utilization as an integer percentage, rounded half-up. Non-positive
/// limits are untracked and report zero utilization.
pub fn utilization_percent(total: Decimal, limit: Decimal) -> u32 {
    if limit <= Decimal::ZERO {
        return 0;
    }
    (total * Decimal::ONE_HUNDRED / limit)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(u32::MAX)
}

/// Shared breach computation used by the in-memory accumulator and the
/// persistence-backed spend ledger.
pub fn evaluate(
    site_id: &SiteId,
    category: &str,
    config: &BudgetConfig,
    period: PeriodKey,
    snapshot: &SpendSnapshot,
) -> Vec<BudgetBreach> {
    let threshold = config.alert_threshold_percent;
    let mut breaches = Vec::new();

    if let Some(limit) = config.monthly_limit {
        let utilization = utilization_percent(snapshot.site_month_total, limit);
        if limit > Decimal::ZERO && utilization >= threshold {
            breaches.push(BudgetBreach {
                site_id: site_id.clone(),
                category: None,
                scope: BreachScope::SiteMonthly,
                period: period.to_string(),
                utilization_percent: utilization,
                threshold_percent: threshold,
            });
        }
    }

    if let Some(limit) = config.yearly_limit {
        let utilization = utilization_percent(snapshot.site_year_total, limit);
        if limit > Decimal::ZERO && utilization >= threshold {
            breaches.push(BudgetBreach {
                site_id: site_id.clone(),
                category: None,
                scope: BreachScope::SiteYearly,
                period: period.year_key(),
                utilization_percent: utilization,
                threshold_percent: threshold,
            });
        }
    }

    if let Some(limit) = config.category_limits.get(category) {
        let utilization = utilization_percent(snapshot.category_month_total, *limit);
        if *limit > Decimal::ZERO && utilization >= threshold {
            breaches.push(BudgetBreach {
                site_id: site_id.clone(),
                category: Some(category.to_owned()),
                scope: BreachScope::CategoryMonthly,
                period: period.to_string(),
                utilization_percent: utilization,
                threshold_percent: threshold,
            });
        }
    }

    breaches
}

/// In-memory accumulator of approved spend per site and category. Spend is
/// applied exactly once per approval event: re-processing the same event
/// (a crash/retry) is a no-op.
#[derive(Clone, Debug, Default)]
pub struct BudgetAccumulator {
    configs: HashMap<String, BudgetConfig>,
    site_month: HashMap<(String, String), Decimal>,
    site_year: HashMap<(String, String), Decimal>,
    category_month: HashMap<(String, String, String), Decimal>,
    applied_events: HashSet<String>,
}

impl BudgetAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, site_id: SiteId, config: BudgetConfig) {
        self.configs.insert(site_id.0, config);
    }

    pub fn record_approved_spend(
        &mut self,
        site_id: &SiteId,
        category: &str,
        amount: Decimal,
        period: PeriodKey,
        event_id: &EventId,
    ) -> Vec<BudgetBreach> {
        if !self.applied_events.insert(event_id.0.clone()) {
            return Vec::new();
        }

        let month_key = period.to_string();
        let year_key = period.year_key();

        *self.site_month.entry((site_id.0.clone(), month_key.clone())).or_default() += amount;
        *self.site_year.entry((site_id.0.clone(), year_key.clone())).or_default() += amount;
        *self
            .category_month
            .entry((site_id.0.clone(), category.to_owned(), month_key.clone()))
            .or_default() += amount;

        let Some(config) = self.configs.get(&site_id.0) else {
            return Vec::new();
        };

        let snapshot = SpendSnapshot {
            site_month_total: self.site_month[&(site_id.0.clone(), month_key.clone())],
            site_year_total: self.site_year[&(site_id.0.clone(), year_key)],
            category_month_total: self.category_month
                [&(site_id.0.clone(), category.to_owned(), month_key)],
        };

        evaluate(site_id, category, config, period, &snapshot)
    }

    pub fn site_month_total(&self, site_id: &SiteId, period: PeriodKey) -> Decimal {
        self.site_month.get(&(site_id.0.clone(), period.to_string())).copied().unwrap_or_default()
    }
}
