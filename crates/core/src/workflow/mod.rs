pub mod engine;
pub mod states;

pub use engine::ApprovalEngine;
pub use states::{ActionRequest, ApprovalStage, ApproverRole, TransitionResult};
