//! In-process notifications.
//!
//! - [`bus`]: the publish/subscribe contract
//! - [`in_memory_bus`]: a channel-backed implementation
//! - [`notice`]: the messages that travel over it

pub mod bus;
pub mod in_memory_bus;
pub mod notice;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notice::{SyncNotice, SyncStep, WidgetNotice};
