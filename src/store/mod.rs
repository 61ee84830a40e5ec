//! Resource store registry: the queryable, watchable primitive
//! everything upstream (store wrapper, discovery engine) is built on.

pub mod index;
pub mod memory;
pub mod overlay;
pub mod registry;
pub mod traits;

pub use memory::MemoryResourceStore;
pub use overlay::OverlayResourceStore;
pub use registry::StoreRegistry;
pub use traits::{OverlayOp, ResourceStore};
