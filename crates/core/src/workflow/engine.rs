use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::expense::{ApprovalAction, ApprovalEvent, EventId, ExpenseRecord, ExpenseStatus};
use crate::errors::WorkflowError;
use crate::workflow::states::{ActionRequest, TransitionResult};

/// Pure decision logic for a single approval action. Validates the actor's
/// authority against the record's pending stage, computes the resulting
/// status and appends one history entry. The input record is never mutated;
/// exactly-one-winner semantics under concurrency come from the caller's
/// compare-and-swap commit of the returned record.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalEngine;

impl ApprovalEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn submit_approval_action(
        &self,
        record: &ExpenseRecord,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> Result<(ExpenseRecord, TransitionResult), WorkflowError> {
        let Some(stage) = record.status.pending_stage() else {
            return Err(WorkflowError::InvalidState { status: record.status });
        };

        if request.level != stage.level() {
            return Err(WorkflowError::Validation(format!(
                "level {} does not match the pending stage (expected level {})",
                request.level,
                stage.level()
            )));
        }

        if request.actor_role != stage.required_role() {
            return Err(WorkflowError::Unauthorized {
                role: request.actor_role,
                status: record.status,
            });
        }

        let modification = validate_modification(record.current_amount, request)?;

        let to = match request.action {
            ApprovalAction::Approved => stage.approve_result(),
            ApprovalAction::Rejected => ExpenseStatus::Rejected,
        };

        let event = ApprovalEvent {
            id: EventId::generate(),
            level: stage.level(),
            approver_id: request.approver_id.clone(),
            action: request.action,
            comment: request.comment.clone(),
            amount_modified: modification.is_some(),
            original_amount: modification.map(|_| record.current_amount),
            modified_amount: modification,
            modification_reason: modification
                .and(request.modification_reason.clone())
                .map(|reason| reason.trim().to_owned()),
            timestamp: now,
        };

        let mut updated = record.clone();
        updated.status = to;
        if let Some(amount) = modification {
            updated.current_amount = amount;
        }
        updated.approval_history.push(event.clone());
        updated.updated_at = now;

        let transition = TransitionResult {
            expense_id: updated.id.clone(),
            from: record.status,
            to,
            event_id: event.id,
            action: request.action,
            level: stage.level(),
            terminal_approval: to == ExpenseStatus::Paid,
            rejected: to == ExpenseStatus::Rejected,
            effective_amount: updated.current_amount,
            amount_modified: modification.is_some(),
            next_stage: to.pending_stage(),
            occurred_at: now,
            submitter_id: updated.submitter_id.clone(),
            site_id: updated.site_id.clone(),
            site_name: updated.site_name.clone(),
            category: updated.category.clone(),
        };

        Ok((updated, transition))
    }
}

/// A supplied amount equal to the current amount is not a modification.
fn validate_modification(
    current_amount: Decimal,
    request: &ActionRequest,
) -> Result<Option<Decimal>, WorkflowError> {
    let Some(amount) = request.modified_amount else {
        return Ok(None);
    };

    if amount == current_amount {
        return Ok(None);
    }

    if amount <= Decimal::ZERO {
        return Err(WorkflowError::Validation(format!(
            "modified amount must be positive, got {amount}"
        )));
    }

    let has_reason = request
        .modification_reason
        .as_deref()
        .map(|reason| !reason.trim().is_empty())
        .unwrap_or(false);
    if !has_reason {
        return Err(WorkflowError::Validation("modification reason required".to_owned()));
    }

    Ok(Some(amount))
}
