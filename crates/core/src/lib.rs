pub mod audit;
pub mod budget;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use budget::{BreachScope, BudgetAccumulator, BudgetBreach, SpendSnapshot};
pub use domain::expense::{
    ApprovalAction, ApprovalEvent, EventId, ExpenseId, ExpenseRecord, ExpenseStatus,
};
pub use domain::site::{BudgetConfig, PeriodKey, Site, SiteId};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use notify::{fan_out, Audience, NotificationDirective};
pub use workflow::{ActionRequest, ApprovalEngine, ApprovalStage, ApproverRole, TransitionResult};
