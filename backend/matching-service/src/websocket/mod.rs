pub mod hub;
pub mod message_types;

pub use hub::{ClientConnection, ConnectionId, Delivery, Hub};
pub use message_types::{WsInboundEvent, WsOutboundEvent};
