pub mod approvals;
pub mod bootstrap;
pub mod dispatch;
pub mod response;
pub mod telemetry;

pub use approvals::{ActionOutcome, ApprovalService, NewExpense};
pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use dispatch::{InMemoryTransport, NoopTransport, NotificationTransport, TransportError};
pub use response::ApiResponse;
pub use telemetry::init_tracing;
