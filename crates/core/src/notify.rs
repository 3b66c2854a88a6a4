use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::budget::BudgetBreach;
use crate::workflow::states::{ApprovalStage, TransitionResult};

// Event type names referenced by existing clients; preserved verbatim.
pub const EVENT_EXPENSE_UPDATED: &str = "expense-updated";
pub const EVENT_NEW_EXPENSE_SUBMITTED: &str = "new_expense_submitted";
pub const EVENT_EXPENSE_APPROVED_L1: &str = "expense_approved_l1";
pub const EVENT_EXPENSE_APPROVED_L2: &str = "expense_approved_l2";
pub const EVENT_EXPENSE_APPROVED_L3: &str = "expense_approved_l3";
pub const EVENT_EXPENSE_REJECTED: &str = "expense_rejected";
pub const EVENT_EXPENSE_PAYMENT_PROCESSED: &str = "expense_payment_processed";
pub const EVENT_BUDGET_EXCEEDED_ALERT: &str = "budget_exceeded_alert";

pub const ROOM_FINANCE_AUDIT: &str = "finance-audit";
pub const ROOM_BUDGET_ALERTS: &str = "budget-alerts";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    User { user_id: String },
    RoleRoom { room: String },
    Room { name: String },
}

impl Audience {
    pub fn role_room(stage: ApprovalStage) -> Self {
        Self::RoleRoom { room: format!("role-{}", stage.required_role().as_str()) }
    }

    /// Channel name the external transport publishes to.
    pub fn channel(&self) -> String {
        match self {
            Self::User { user_id } => format!("user-{user_id}"),
            Self::RoleRoom { room } => room.clone(),
            Self::Room { name } => name.clone(),
        }
    }
}

/// An instruction to notify some audience of an event. Produced by the core,
/// executed by the external real-time transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDirective {
    pub audience: Audience,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Compute the directives for one committed transition. Purely a function
/// of the transition and any budget breaches observed while processing it.
pub fn fan_out(
    transition: &TransitionResult,
    breaches: &[BudgetBreach],
) -> Vec<NotificationDirective> {
    let mut directives = vec![submitter_update(transition)];

    if transition.rejected {
        directives.push(NotificationDirective {
            audience: Audience::User { user_id: transition.submitter_id.clone() },
            event_type: EVENT_EXPENSE_REJECTED.to_owned(),
            payload: expense_payload(transition),
        });
        return directives;
    }

    if transition.terminal_approval {
        directives.push(NotificationDirective {
            audience: Audience::Room { name: ROOM_FINANCE_AUDIT.to_owned() },
            event_type: EVENT_EXPENSE_PAYMENT_PROCESSED.to_owned(),
            payload: expense_payload(transition),
        });
    } else if let Some(next_stage) = transition.next_stage {
        directives.push(NotificationDirective {
            audience: Audience::role_room(next_stage),
            event_type: stage_approved_event(transition.level).to_owned(),
            payload: expense_payload(transition),
        });
    }

    for breach in breaches {
        directives.push(NotificationDirective {
            audience: Audience::Room { name: ROOM_BUDGET_ALERTS.to_owned() },
            event_type: EVENT_BUDGET_EXCEEDED_ALERT.to_owned(),
            payload: json!({
                "site_id": breach.site_id.0,
                "category": breach.category,
                "scope": breach.scope,
                "period": breach.period,
                "utilization_percent": breach.utilization_percent,
                "threshold_percent": breach.threshold_percent,
            }),
        });
    }

    directives
}

fn submitter_update(transition: &TransitionResult) -> NotificationDirective {
    NotificationDirective {
        audience: Audience::User { user_id: transition.submitter_id.clone() },
        event_type: EVENT_EXPENSE_UPDATED.to_owned(),
        payload: expense_payload(transition),
    }
}

fn expense_payload(transition: &TransitionResult) -> serde_json::Value {
    json!({
        "expense_id": transition.expense_id.0,
        "status": transition.to,
        "previous_status": transition.from,
        "amount": transition.effective_amount.to_string(),
        "amount_modified": transition.amount_modified,
        "site_name": transition.site_name,
        "category": transition.category,
        "level": transition.level,
    })
}

fn stage_approved_event(level: u8) -> &'static str {
    match level {
        1 => EVENT_EXPENSE_APPROVED_L1,
        2 => EVENT_EXPENSE_APPROVED_L2,
        _ => EVENT_EXPENSE_APPROVED_L3,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::budget::{BreachScope, BudgetBreach};
    use crate::domain::expense::{ApprovalAction, EventId, ExpenseId, ExpenseStatus};
    use crate::domain::site::SiteId;
    use crate::notify::{
        fan_out, Audience, EVENT_BUDGET_EXCEEDED_ALERT, EVENT_EXPENSE_APPROVED_L1,
        EVENT_EXPENSE_PAYMENT_PROCESSED, EVENT_EXPENSE_REJECTED, EVENT_EXPENSE_UPDATED,
        ROOM_BUDGET_ALERTS, ROOM_FINANCE_AUDIT,
    };
    use crate::workflow::states::{ApprovalStage, TransitionResult};

    fn transition(from: ExpenseStatus, to: ExpenseStatus, level: u8) -> TransitionResult {
        TransitionResult {
            expense_id: ExpenseId("EXP-7".to_owned()),
            from,
            to,
            event_id: EventId::generate(),
            action: if to == ExpenseStatus::Rejected {
                ApprovalAction::Rejected
            } else {
                ApprovalAction::Approved
            },
            level,
            terminal_approval: to == ExpenseStatus::Paid,
            rejected: to == ExpenseStatus::Rejected,
            effective_amount: Decimal::new(5000, 0),
            amount_modified: false,
            next_stage: to.pending_stage(),
            occurred_at: Utc::now(),
            submitter_id: "u-submitter".to_owned(),
            site_id: SiteId("site-hq".to_owned()),
            site_name: "Headquarters".to_owned(),
            category: "travel".to_owned(),
        }
    }

    #[test]
    fn every_transition_notifies_the_submitter() {
        let directives =
            fan_out(&transition(ExpenseStatus::Submitted, ExpenseStatus::ApprovedL1, 1), &[]);

        let submitter = &directives[0];
        assert_eq!(submitter.event_type, EVENT_EXPENSE_UPDATED);
        assert_eq!(submitter.audience, Audience::User { user_id: "u-submitter".to_owned() });
        assert_eq!(submitter.payload["site_name"], "Headquarters");
        assert_eq!(submitter.payload["amount"], "5000");
    }

    #[test]
    fn l1_approval_targets_the_l2_role_room() {
        let directives =
            fan_out(&transition(ExpenseStatus::Submitted, ExpenseStatus::ApprovedL1, 1), &[]);

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[1].event_type, EVENT_EXPENSE_APPROVED_L1);
        assert_eq!(directives[1].audience.channel(), "role-l2_approver");
    }

    #[test]
    fn rejection_notifies_the_submitter_only_and_terminates_the_chain() {
        let directives =
            fan_out(&transition(ExpenseStatus::ApprovedL1, ExpenseStatus::Rejected, 2), &[]);

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].event_type, EVENT_EXPENSE_UPDATED);
        assert_eq!(directives[1].event_type, EVENT_EXPENSE_REJECTED);
        assert!(directives
            .iter()
            .all(|directive| matches!(directive.audience, Audience::User { .. })));
    }

    #[test]
    fn payment_notifies_submitter_and_finance_audit_room() {
        let directives =
            fan_out(&transition(ExpenseStatus::ApprovedL3, ExpenseStatus::Paid, 4), &[]);

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[1].event_type, EVENT_EXPENSE_PAYMENT_PROCESSED);
        assert_eq!(directives[1].audience.channel(), ROOM_FINANCE_AUDIT);
    }

    #[test]
    fn budget_breaches_add_alert_directives() {
        let breach = BudgetBreach {
            site_id: SiteId("site-hq".to_owned()),
            category: Some("travel".to_owned()),
            scope: BreachScope::CategoryMonthly,
            period: "2025-08".to_owned(),
            utilization_percent: 92,
            threshold_percent: 80,
        };
        let directives =
            fan_out(&transition(ExpenseStatus::ApprovedL3, ExpenseStatus::Paid, 4), &[breach]);

        assert_eq!(directives.len(), 3);
        let alert = &directives[2];
        assert_eq!(alert.event_type, EVENT_BUDGET_EXCEEDED_ALERT);
        assert_eq!(alert.audience.channel(), ROOM_BUDGET_ALERTS);
        assert_eq!(alert.payload["utilization_percent"], 92);
        assert_eq!(alert.payload["threshold_percent"], 80);
    }

    #[test]
    fn role_room_names_match_existing_client_channels() {
        assert_eq!(Audience::role_room(ApprovalStage::L2).channel(), "role-l2_approver");
        assert_eq!(Audience::role_room(ApprovalStage::Finance).channel(), "role-finance");
    }
}
