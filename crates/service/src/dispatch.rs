use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use expenseflow_core::notify::NotificationDirective;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("delivery to `{channel}` failed: {reason}")]
    Delivery { channel: String, reason: String },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to the real-time gateway. Implementations publish a directive
/// to its audience's channel; delivery failures never reach the workflow.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, directive: &NotificationDirective) -> Result<(), TransportError>;
}

/// Swallows every directive. Stands in when `realtime.enabled` is off.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl NotificationTransport for NoopTransport {
    async fn deliver(&self, _directive: &NotificationDirective) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Records delivered directives for inspection in tests and embedders.
#[derive(Default)]
pub struct InMemoryTransport {
    delivered: Mutex<Vec<NotificationDirective>>,
}

impl InMemoryTransport {
    pub fn delivered(&self) -> Vec<NotificationDirective> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationTransport for InMemoryTransport {
    async fn deliver(&self, directive: &NotificationDirective) -> Result<(), TransportError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(directive.clone()),
            Err(poisoned) => poisoned.into_inner().push(directive.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use expenseflow_core::notify::{Audience, NotificationDirective};

    use super::{InMemoryTransport, NoopTransport, NotificationTransport};

    fn directive() -> NotificationDirective {
        NotificationDirective {
            audience: Audience::User { user_id: "u-submitter".to_owned() },
            event_type: "expense-updated".to_owned(),
            payload: json!({ "expense_id": "EXP-1" }),
        }
    }

    #[tokio::test]
    async fn in_memory_transport_records_deliveries_in_order() {
        let transport = InMemoryTransport::default();

        transport.deliver(&directive()).await.expect("deliver");
        transport.deliver(&directive()).await.expect("deliver");

        assert_eq!(transport.delivered().len(), 2);
        assert_eq!(transport.delivered()[0].event_type, "expense-updated");
    }

    #[tokio::test]
    async fn noop_transport_accepts_everything() {
        let transport = NoopTransport;
        assert!(transport.deliver(&directive()).await.is_ok());
    }
}
