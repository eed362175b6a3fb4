// Agent-to-agent messaging: envelope protocol and the in-process bus

pub mod bus;
pub mod protocol;

pub use bus::{BusError, BusStats, DeliveryMode, MessageBus};
pub use protocol::{validate_message, BusMessage, MessagePriority, MessageStatus, MessageType};
