use std::time::Duration;

use log::*;
use tokio::sync::broadcast;

use crate::{db_types::OrderId, events::OrderEvent};

const BUS_CAPACITY: usize = 256;

/// A process-wide broadcast of order events. Long-polling requests subscribe to it and wake up when the order they
/// watch changes.
#[derive(Debug, Clone)]
pub struct OrderEventBus {
    sender: broadcast::Sender<OrderEvent>,
}

impl Default for OrderEventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

impl OrderEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event to whoever is listening right now. Nobody listening is not an error.
    pub fn publish(&self, event: OrderEvent) {
        let listeners = self.sender.send(event).unwrap_or(0);
        trace!("📬️ Order event delivered to {listeners} listener(s)");
    }

    /// Waits until an event for the given order arrives on `receiver`, or until `timeout` elapses. Returns the event,
    /// or `None` on timeout. If the receiver lagged behind, the caller should re-read the order from the store.
    pub async fn wait_for(
        receiver: &mut broadcast::Receiver<OrderEvent>,
        instance_id: &str,
        order_id: &OrderId,
        timeout: Duration,
    ) -> Option<OrderEvent> {
        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(ev) if ev.is_for(instance_id, order_id) => return Some(ev),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("📬️ Long poll for {order_id} missed {n} events");
                        return None;
                    },
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}
