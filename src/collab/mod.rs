//! Real-time collaboration: pushes assembled graph state to connected
//! listeners after every committed change.

mod broadcaster;
mod message;

pub use broadcaster::{BroadcastStats, Broadcaster, Listener, ListenerId, ListenerReceiver};
pub use message::BroadcastMessage;
