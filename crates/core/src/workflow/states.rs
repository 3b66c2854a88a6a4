use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::expense::{ApprovalAction, EventId, ExpenseId, ExpenseStatus};
use crate::domain::site::SiteId;
use crate::errors::WorkflowError;

/// One step in the fixed approval sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    L1,
    L2,
    L3,
    Finance,
}

impl ApprovalStage {
    pub fn level(self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
            Self::L3 => 3,
            Self::Finance => 4,
        }
    }

    /// The one role authorized to act at this stage.
    pub fn required_role(self) -> ApproverRole {
        match self {
            Self::L1 => ApproverRole::L1Approver,
            Self::L2 => ApproverRole::L2Approver,
            Self::L3 => ApproverRole::L3Approver,
            Self::Finance => ApproverRole::Finance,
        }
    }

    pub fn approve_result(self) -> ExpenseStatus {
        match self {
            Self::L1 => ExpenseStatus::ApprovedL1,
            Self::L2 => ExpenseStatus::ApprovedL2,
            Self::L3 => ExpenseStatus::ApprovedL3,
            Self::Finance => ExpenseStatus::Paid,
        }
    }
}

/// Closed role set. Loose role strings from the surrounding system are
/// normalized once, here at the boundary, never inside the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    L1Approver,
    L2Approver,
    L3Approver,
    Finance,
}

impl ApproverRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L1Approver => "l1_approver",
            Self::L2Approver => "l2_approver",
            Self::L3Approver => "l3_approver",
            Self::Finance => "finance",
        }
    }

    pub fn stage(self) -> ApprovalStage {
        match self {
            Self::L1Approver => ApprovalStage::L1,
            Self::L2Approver => ApprovalStage::L2,
            Self::L3Approver => ApprovalStage::L3,
            Self::Finance => ApprovalStage::Finance,
        }
    }
}

impl std::str::FromStr for ApproverRole {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l1_approver" => Ok(Self::L1Approver),
            "l2_approver" => Ok(Self::L2Approver),
            "l3_approver" | "super_admin" => Ok(Self::L3Approver),
            "finance" => Ok(Self::Finance),
            other => Err(WorkflowError::Validation(format!("unknown approver role `{other}`"))),
        }
    }
}

/// An approval action as it arrives at the engine, already authenticated
/// by the surrounding system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub approver_id: String,
    pub actor_role: ApproverRole,
    pub action: ApprovalAction,
    pub level: u8,
    pub comment: String,
    pub modified_amount: Option<Decimal>,
    pub modification_reason: Option<String>,
}

/// Outcome of a single committed transition. Carries the record snapshot
/// fields the notification fan-out needs so it stays a pure function of
/// the transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub expense_id: ExpenseId,
    pub from: ExpenseStatus,
    pub to: ExpenseStatus,
    pub event_id: EventId,
    pub action: ApprovalAction,
    pub level: u8,
    pub terminal_approval: bool,
    pub rejected: bool,
    pub effective_amount: Decimal,
    pub amount_modified: bool,
    pub next_stage: Option<ApprovalStage>,
    pub occurred_at: DateTime<Utc>,
    pub submitter_id: String,
    pub site_id: SiteId,
    pub site_name: String,
    pub category: String,
}
