//! HTTP resource store: fetch, two-version cache, conditional refresh, and
//! validation-gated promotion.

pub mod adapter;
pub mod auth;
pub mod cache;
pub mod store;

pub use adapter::HttpStoreAdapter;
pub use auth::AuthMode;
pub use cache::{CacheEntry, FetchOptions, ValidationState};
pub use store::{HttpResourceStore, SharedHttpResourceStore};
