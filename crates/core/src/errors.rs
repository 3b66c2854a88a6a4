use thiserror::Error;

use crate::domain::expense::ExpenseStatus;
use crate::workflow::states::ApproverRole;

/// Failure kinds of the workflow core. The core never swallows an error;
/// it fails fast with one of these and leaves the record untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("role `{role:?}` is not authorized to act while the expense is {status:?}")]
    Unauthorized { role: ApproverRole, status: ExpenseStatus },
    #[error("expense is {status:?}; the requested action no longer applies")]
    InvalidState { status: ExpenseStatus },
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not authorized to act on this expense.",
            Self::Conflict { .. } => {
                "This expense was already processed. Refresh to see its current state."
            }
            Self::NotFound { .. } => "The requested expense or site does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(WorkflowError::Validation(message)) => {
                Self::BadRequest { message, correlation_id: unassigned }
            }
            ApplicationError::Workflow(error @ WorkflowError::Unauthorized { .. }) => {
                Self::Forbidden { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Workflow(error @ WorkflowError::InvalidState { .. }) => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Workflow(WorkflowError::NotFound(message)) => {
                Self::NotFound { message, correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::expense::ExpenseStatus;
    use crate::errors::{ApplicationError, InterfaceError, WorkflowError};
    use crate::workflow::states::ApproverRole;

    #[test]
    fn validation_error_maps_to_bad_request() {
        let interface =
            ApplicationError::from(WorkflowError::Validation("modification reason required".into()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn unauthorized_maps_to_forbidden_with_user_safe_message() {
        let interface = ApplicationError::from(WorkflowError::Unauthorized {
            role: ApproverRole::L2Approver,
            status: ExpenseStatus::Submitted,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.user_message(), "You are not authorized to act on this expense.");
    }

    #[test]
    fn invalid_state_maps_to_conflict_telling_the_caller_to_refresh() {
        let interface =
            ApplicationError::from(WorkflowError::InvalidState { status: ExpenseStatus::Paid })
                .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "This expense was already processed. Refresh to see its current state."
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database lock timeout".into()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }
}
