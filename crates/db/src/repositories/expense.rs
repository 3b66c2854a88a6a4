use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use expenseflow_core::domain::expense::{
    ApprovalAction, ApprovalEvent, EventId, ExpenseId, ExpenseRecord, ExpenseStatus,
};
use expenseflow_core::domain::site::SiteId;

use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<ExpenseStatus, RepositoryError> {
    match value {
        "submitted" => Ok(ExpenseStatus::Submitted),
        "approved_l1" => Ok(ExpenseStatus::ApprovedL1),
        "approved_l2" => Ok(ExpenseStatus::ApprovedL2),
        "approved_l3" => Ok(ExpenseStatus::ApprovedL3),
        "paid" => Ok(ExpenseStatus::Paid),
        "rejected" => Ok(ExpenseStatus::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown expense status `{other}`"))),
    }
}

fn parse_action(value: &str) -> Result<ApprovalAction, RepositoryError> {
    match value {
        "approved" => Ok(ApprovalAction::Approved),
        "rejected" => Ok(ApprovalAction::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown approval action `{other}`"))),
    }
}

fn action_as_str(action: ApprovalAction) -> &'static str {
    match action {
        ApprovalAction::Approved => "approved",
        ApprovalAction::Rejected => "rejected",
    }
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal in `{field}`: {error}")))
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalEvent, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let id: String = row.try_get("id").map_err(decode)?;
    let level: i64 = row.try_get("level").map_err(decode)?;
    let approver_id: String = row.try_get("approver_id").map_err(decode)?;
    let action: String = row.try_get("action").map_err(decode)?;
    let comment: String = row.try_get("comment").map_err(decode)?;
    let amount_modified: bool = row.try_get("amount_modified").map_err(decode)?;
    let original_amount: Option<String> = row.try_get("original_amount").map_err(decode)?;
    let modified_amount: Option<String> = row.try_get("modified_amount").map_err(decode)?;
    let modification_reason: Option<String> =
        row.try_get("modification_reason").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    Ok(ApprovalEvent {
        id: EventId(id),
        level: u8::try_from(level)
            .map_err(|_| RepositoryError::Decode(format!("approval level {level} out of range")))?,
        approver_id,
        action: parse_action(&action)?,
        comment,
        amount_modified,
        original_amount: original_amount
            .map(|value| parse_decimal("original_amount", &value))
            .transpose()?,
        modified_amount: modified_amount
            .map(|value| parse_decimal("modified_amount", &value))
            .transpose()?,
        modification_reason,
        timestamp: parse_timestamp(&created_at),
    })
}

fn row_to_expense(
    row: &sqlx::sqlite::SqliteRow,
    history: Vec<ApprovalEvent>,
) -> Result<ExpenseRecord, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let id: String = row.try_get("id").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let original_amount: String = row.try_get("original_amount").map_err(decode)?;
    let current_amount: String = row.try_get("current_amount").map_err(decode)?;
    let site_id: String = row.try_get("site_id").map_err(decode)?;
    let site_name: String = row.try_get("site_name").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let submitter_id: String = row.try_get("submitter_id").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(ExpenseRecord {
        id: ExpenseId(id),
        status: parse_status(&status)?,
        original_amount: parse_decimal("original_amount", &original_amount)?,
        current_amount: parse_decimal("current_amount", &current_amount)?,
        site_id: SiteId(site_id),
        site_name,
        category,
        submitter_id,
        approval_history: history,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<ExpenseRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, original_amount, current_amount, site_id, site_name,
                    category, submitter_id, created_at, updated_at
             FROM expense WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let event_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, level, approver_id, action, comment, amount_modified,
                    original_amount, modified_amount, modification_reason, created_at
             FROM approval_event WHERE expense_id = ? ORDER BY seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let history =
            event_rows.iter().map(row_to_event).collect::<Result<Vec<_>, RepositoryError>>()?;
        Ok(Some(row_to_expense(&row, history)?))
    }

    async fn insert(&self, expense: ExpenseRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense (id, status, original_amount, current_amount, site_id,
                                  site_name, category, submitter_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(expense.status.as_str())
        .bind(expense.original_amount.to_string())
        .bind(expense.current_amount.to_string())
        .bind(&expense.site_id.0)
        .bind(&expense.site_name)
        .bind(&expense.category)
        .bind(&expense.submitter_id)
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn compare_and_swap_status(
        &self,
        expected_status: ExpenseStatus,
        updated: &ExpenseRecord,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE expense
             SET status = ?, current_amount = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(updated.status.as_str())
        .bind(updated.current_amount.to_string())
        .bind(updated.updated_at.to_rfc3339())
        .bind(&updated.id.0)
        .bind(expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // The newest history entry travels with the status change so the
        // transition and its audit trail commit atomically.
        if let Some(event) = updated.approval_history.last() {
            let seq = i64::try_from(updated.approval_history.len()).unwrap_or(i64::MAX);
            sqlx::query(
                "INSERT INTO approval_event (id, expense_id, seq, level, approver_id, action,
                                             comment, amount_modified, original_amount,
                                             modified_amount, modification_reason, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.id.0)
            .bind(&updated.id.0)
            .bind(seq)
            .bind(i64::from(event.level))
            .bind(&event.approver_id)
            .bind(action_as_str(event.action))
            .bind(&event.comment)
            .bind(event.amount_modified)
            .bind(event.original_amount.map(|amount| amount.to_string()))
            .bind(event.modified_amount.map(|amount| amount.to_string()))
            .bind(&event.modification_reason)
            .bind(event.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}
