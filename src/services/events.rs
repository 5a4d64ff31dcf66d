//! Order event publishing over NATS.

use std::fmt;

use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

/// Publishes order events when a NATS connection is configured. Publishing
/// is best effort: failures are logged and never reach the caller.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn disabled() -> Self { Self { nats: None } }
    pub fn nats(client: async_nats::Client) -> Self { Self { nats: Some(client) } }

    pub async fn publish(&self, event: OrderEvent) {
        debug!(order_id = %event.order_id(), subject = event.subject(), "order event");
        let Some(client) = &self.nats else { return };

        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, subject = event.subject(), "could not encode order event"); return; }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            warn!(error = %e, subject = event.subject(), order_id = %event.order_id(), "failed to publish order event");
        }
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher").field("nats", &self.nats.is_some()).finish()
    }
}
