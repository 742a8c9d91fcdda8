mod bus;
mod types;

pub use bus::{EventBus, EventReceiver, EventSender};
pub use types::{EventSequence, QueueEvent, QueueEventPayload};
