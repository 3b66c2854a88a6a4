use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::site::SiteId;
use crate::workflow::states::ApprovalStage;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Submitted,
    ApprovedL1,
    ApprovedL2,
    ApprovedL3,
    Paid,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Rejected)
    }

    /// Position in the forward stage sequence; `Rejected` has no position.
    pub fn stage_index(self) -> Option<u8> {
        match self {
            Self::Submitted => Some(0),
            Self::ApprovedL1 => Some(1),
            Self::ApprovedL2 => Some(2),
            Self::ApprovedL3 => Some(3),
            Self::Paid => Some(4),
            Self::Rejected => None,
        }
    }

    /// The stage whose approver must act next, if the record is still pending.
    pub fn pending_stage(self) -> Option<ApprovalStage> {
        match self {
            Self::Submitted => Some(ApprovalStage::L1),
            Self::ApprovedL1 => Some(ApprovalStage::L2),
            Self::ApprovedL2 => Some(ApprovalStage::L3),
            Self::ApprovedL3 => Some(ApprovalStage::Finance),
            Self::Paid | Self::Rejected => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::ApprovedL1 => "approved_l1",
            Self::ApprovedL2 => "approved_l2",
            Self::ApprovedL3 => "approved_l3",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
}

/// One entry in the append-only approval history. Never edited after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub id: EventId,
    pub level: u8,
    pub approver_id: String,
    pub action: ApprovalAction,
    pub comment: String,
    pub amount_modified: bool,
    pub original_amount: Option<Decimal>,
    pub modified_amount: Option<Decimal>,
    pub modification_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: ExpenseId,
    pub status: ExpenseStatus,
    pub original_amount: Decimal,
    pub current_amount: Decimal,
    pub site_id: SiteId,
    pub site_name: String,
    pub category: String,
    pub submitter_id: String,
    pub approval_history: Vec<ApprovalEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseRecord {
    pub fn new(
        id: ExpenseId,
        amount: Decimal,
        site_id: SiteId,
        site_name: impl Into<String>,
        category: impl Into<String>,
        submitter_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: ExpenseStatus::Submitted,
            original_amount: amount,
            current_amount: amount,
            site_id,
            site_name: site_name.into(),
            category: category.into(),
            submitter_id: submitter_id.into(),
            approval_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpenseStatus, EventId};
    use crate::workflow::states::ApprovalStage;

    #[test]
    fn stage_indexes_follow_the_fixed_sequence() {
        let order = [
            ExpenseStatus::Submitted,
            ExpenseStatus::ApprovedL1,
            ExpenseStatus::ApprovedL2,
            ExpenseStatus::ApprovedL3,
            ExpenseStatus::Paid,
        ];
        for window in order.windows(2) {
            assert!(window[0].stage_index() < window[1].stage_index());
        }
        assert_eq!(ExpenseStatus::Rejected.stage_index(), None);
    }

    #[test]
    fn pending_stage_is_none_only_for_terminal_states() {
        assert_eq!(ExpenseStatus::Submitted.pending_stage(), Some(ApprovalStage::L1));
        assert_eq!(ExpenseStatus::ApprovedL3.pending_stage(), Some(ApprovalStage::Finance));
        assert_eq!(ExpenseStatus::Paid.pending_stage(), None);
        assert_eq!(ExpenseStatus::Rejected.pending_stage(), None);
    }

    #[test]
    fn generated_event_ids_are_unique() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
