//! Order events.
//!
//! Engine APIs publish an [`OrderEvent`] after every committed state change. Events go to the process-wide
//! [`OrderEventBus`], which drives long polling, and to any hooks registered through [`EventHooks`].
mod bus;
mod channel;
mod event_types;
mod hooks;

pub use bus::OrderEventBus;
pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{OrderEvent, OrderEventKind};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
