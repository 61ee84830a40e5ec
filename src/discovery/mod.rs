//! HAProxy pod discovery: structural filtering, version gating, and retry.

pub mod adapter;
pub mod dataplane;
pub mod engine;
pub mod version;

pub use adapter::DiscoveryAdapter;
pub use dataplane::{
    DataplaneVersionProber, FixedLocalVersionSource, LocalVersionSource, ProbedLocalVersionSource,
    ReqwestVersionProber,
};
pub use engine::{discover_candidates, Candidate, Credentials, Endpoint};
pub use version::{Capabilities, Version};
