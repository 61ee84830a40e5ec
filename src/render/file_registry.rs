//! Dynamic auxiliary file registration during a render pass.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::paths::ResolvedPaths;
use crate::errors::RenderError;

/// The four auxiliary-file categories a render can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Map,
    Cert,
    File,
    CrtList,
}

/// One registered file: its logical name and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub content: String,
}

/// The accumulated output of a render's dynamic file registrations, split by
/// category. Order within each list is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryFiles {
    pub maps: Vec<FileEntry>,
    pub general_files: Vec<FileEntry>,
    pub certificates: Vec<FileEntry>,
    pub crt_lists: Vec<FileEntry>,
}

impl AuxiliaryFiles {
    pub fn total_count(&self) -> usize {
        self.maps.len() + self.general_files.len() + self.certificates.len() + self.crt_lists.len()
    }
}

#[derive(Clone)]
struct Registration {
    content: String,
    path: PathBuf,
}

struct State {
    by_key: HashMap<(FileType, String), Registration>,
    order: Vec<(FileType, String)>,
}

/// Created fresh per render cycle. Templates call `register` to deposit
/// dynamically-generated content; `get_files` exports the result once the
/// template pass is done.
pub struct FileRegistry {
    paths: ResolvedPaths,
    state: Mutex<State>,
}

impl FileRegistry {
    pub fn new(paths: ResolvedPaths) -> Self {
        Self {
            paths,
            state: Mutex::new(State {
                by_key: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Idempotent for identical `(type, filename, content)`; conflicts (same
    /// type+filename, different content) abort the render.
    pub fn register(
        &self,
        file_type: FileType,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, RenderError> {
        let key = (file_type, filename.to_string());
        let mut state = self.state.lock().expect("file registry lock poisoned");

        if let Some(existing) = state.by_key.get(&key) {
            if existing.content == content {
                return Ok(existing.path.clone());
            }
            return Err(RenderError::FileRegistryConflict {
                file_type,
                filename: filename.to_string(),
            });
        }

        let path = self.paths.get_path(filename, file_type);
        state.by_key.insert(
            key.clone(),
            Registration {
                content: content.to_string(),
                path: path.clone(),
            },
        );
        state.order.push(key);
        Ok(path)
    }

    /// Exports every registration made so far, grouped by category in
    /// insertion order.
    pub fn get_files(&self) -> AuxiliaryFiles {
        let state = self.state.lock().expect("file registry lock poisoned");
        let mut files = AuxiliaryFiles::default();
        for key in &state.order {
            let registration = &state.by_key[key];
            let entry = FileEntry {
                filename: key.1.clone(),
                content: registration.content.clone(),
            };
            match key.0 {
                FileType::Map => files.maps.push(entry),
                FileType::File => files.general_files.push(entry),
                FileType::Cert => files.certificates.push(entry),
                FileType::CrtList => files.crt_lists.push(entry),
            }
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::version::Version;
    use crate::discovery::Capabilities;
    use crate::render::paths::{resolve_paths, PathConfig};

    fn registry() -> FileRegistry {
        let base = PathConfig {
            maps_dir: "/maps".into(),
            ssl_dir: "/ssl".into(),
            general_dir: "/files".into(),
            config_file: "/haproxy.cfg".into(),
        };
        let caps = Capabilities::for_version(&Version::new(3, 2, "3.2.0"));
        FileRegistry::new(resolve_paths(&base, &caps))
    }

    #[test]
    fn registering_identical_content_twice_is_idempotent() {
        let registry = registry();
        let first = registry.register(FileType::Map, "a.map", "content").unwrap();
        let second = registry.register(FileType::Map, "a.map", "content").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn registering_different_content_for_same_key_conflicts() {
        let registry = registry();
        registry.register(FileType::Map, "a.map", "content").unwrap();
        let err = registry.register(FileType::Map, "a.map", "other").unwrap_err();
        assert!(matches!(err, RenderError::FileRegistryConflict { .. }));
    }

    #[test]
    fn get_files_groups_by_category_in_insertion_order() {
        let registry = registry();
        registry.register(FileType::Map, "a.map", "1").unwrap();
        registry.register(FileType::File, "b.txt", "2").unwrap();
        registry.register(FileType::Map, "c.map", "3").unwrap();

        let files = registry.get_files();
        assert_eq!(files.maps.len(), 2);
        assert_eq!(files.maps[0].filename, "a.map");
        assert_eq!(files.maps[1].filename, "c.map");
        assert_eq!(files.general_files.len(), 1);
        assert_eq!(files.total_count(), 3);
    }
}
