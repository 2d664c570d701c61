use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, OrderEvent, OrderEventBus, OrderEventKind};

/// The producers the engine APIs publish to. The bus is always present; hook producers exist only for the hooks that
/// were registered.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub bus: OrderEventBus,
    pub order_paid_producer: Vec<EventProducer<OrderEvent>>,
    pub order_refunded_producer: Vec<EventProducer<OrderEvent>>,
}

impl EventProducers {
    pub fn with_bus(bus: OrderEventBus) -> Self {
        Self { bus, ..Default::default() }
    }

    /// Announces a committed change to the bus and to the hooks interested in it.
    pub async fn publish(&self, event: OrderEvent) {
        trace!("📬️ Publishing {:?} for order [{}/{}]", event.kind, event.instance_id, event.order_id);
        let hooks = match event.kind {
            OrderEventKind::Paid => self.order_paid_producer.as_slice(),
            OrderEventKind::Refunded { .. } => self.order_refunded_producer.as_slice(),
            _ => &[],
        };
        for emitter in hooks {
            emitter.publish_event(event.clone()).await;
        }
        self.bus.publish(event);
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderEvent>>,
    pub on_order_refunded: Option<EventHandler<OrderEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_refunded = hooks.on_order_refunded.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_refunded }
    }

    pub fn producers(&self, bus: OrderEventBus) -> EventProducers {
        let mut result = EventProducers::with_bus(bus);
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_refunded {
            result.order_refunded_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        for handler in [self.on_order_paid, self.on_order_refunded].into_iter().flatten() {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderEvent>>,
    pub on_order_refunded: Option<Handler<OrderEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f));
        self
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use merchant_common::Amount;

    use super::*;

    #[tokio::test]
    async fn hooks_only_see_their_events() {
        let paid = Arc::new(AtomicUsize::new(0));
        let refunded = Arc::new(AtomicUsize::new(0));
        let mut hooks = EventHooks::default();
        let p = Arc::clone(&paid);
        hooks.on_order_paid(move |_| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                p.fetch_add(1, Ordering::SeqCst);
            })
        });
        let r = Arc::clone(&refunded);
        hooks.on_order_refunded(move |_| {
            let r = Arc::clone(&r);
            Box::pin(async move {
                r.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = EventHandlers::new(5, hooks);
        let bus = OrderEventBus::default();
        let mut rx = bus.subscribe();
        let producers = handlers.producers(bus);
        let paid_handler = handlers.on_order_paid.unwrap();
        let refund_handler = handlers.on_order_refunded.unwrap();
        let total: Amount = "EUR:1".parse().unwrap();
        producers.publish(OrderEvent::new("default", "1".into(), OrderEventKind::Claimed)).await;
        producers.publish(OrderEvent::new("default", "1".into(), OrderEventKind::Paid)).await;
        producers.publish(OrderEvent::new("default", "1".into(), OrderEventKind::Refunded { total })).await;
        drop(producers);
        paid_handler.start_handler().await;
        refund_handler.start_handler().await;
        assert_eq!(paid.load(Ordering::SeqCst), 1);
        assert_eq!(refunded.load(Ordering::SeqCst), 1);
        assert_eq!(rx.recv().await.unwrap().kind, OrderEventKind::Claimed);
    }
}
