//! Event delivery: the synchronous bus, payload types, and the cross-thread
//! handoff from the input thread

pub mod bridge;
pub mod bus;
pub mod types;

pub use bridge::{event_channel, EventPump, EventSender, PumpStatus, WindowEvent};
pub use bus::{EventBus, SubscriptionId};
pub use types::*;
