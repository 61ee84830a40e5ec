//! Event bus & component coordination fabric.

pub mod bus;
pub mod types;

pub use bus::{EventBus, Subscription};
pub use types::{Event, ExtraContext, RenderedTemplate, ResourceIndexUpdate};
