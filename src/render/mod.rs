//! Two-phase rendering pipeline: capability-aware paths,
//! the dynamic file registry, the resource/HTTP wrappers templates call,
//! the Tera-backed template engine, and the orchestrating engine itself.

pub mod context;
pub mod engine;
pub mod file_registry;
pub mod http_wrapper;
pub mod paths;
pub mod store_wrapper;
pub mod template_engine;

pub use context::{build_static_context, sort_snippets, RenderContext, RenderMode, SnippetRef};
pub use engine::{AuxTemplateSpec, RenderingEngine};
pub use file_registry::{AuxiliaryFiles, FileEntry, FileRegistry, FileType};
pub use http_wrapper::{HttpWrapper, RefreshRegistrar};
pub use paths::{resolve_paths, PathConfig, ResolvedPaths};
pub use store_wrapper::{coerce_key, convert_floats_to_ints, StoreWrapper};
pub use template_engine::{apply_post_processors, PostProcessStep, TeraTemplateEngine, TemplateEngine};
