//! Real-time push channel between the backend job processor and the client.

mod channel;
pub mod messages;

#[cfg(feature = "mock")]
pub use channel::MockPushSink;
pub use channel::{PushChannel, PushError, PushHandle, PushSink};
pub use messages::{msg_types, ClientMessage, PushEvent, ServerEvent, ServerMessage};
