//! Capability-aware path resolution: `PathConfig`/`ResolvedPaths`.

use std::path::PathBuf;

use crate::discovery::Capabilities;

use super::file_registry::FileType;

/// Operator-configured base directories, before capability resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    pub maps_dir: PathBuf,
    pub ssl_dir: PathBuf,
    pub general_dir: PathBuf,
    pub config_file: PathBuf,
}

/// A `PathConfig` plus the derived `crtListDir`, bound to a specific
/// capability set. Two `ResolvedPaths` — one for production, one for a
/// validation temp directory — are built each render cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub maps_dir: PathBuf,
    pub ssl_dir: PathBuf,
    pub general_dir: PathBuf,
    pub config_file: PathBuf,
    pub crt_list_dir: PathBuf,
}

/// Routes `base` through the capability-aware `crtListDir` rule: CRT-lists
/// land in `sslDir` if the target HAProxy supports CRT-list storage,
/// otherwise they fall back to `generalDir`.
pub fn resolve_paths(base: &PathConfig, capabilities: &Capabilities) -> ResolvedPaths {
    let crt_list_dir = if capabilities.supports_crt_list {
        base.ssl_dir.clone()
    } else {
        base.general_dir.clone()
    };

    ResolvedPaths {
        maps_dir: base.maps_dir.clone(),
        ssl_dir: base.ssl_dir.clone(),
        general_dir: base.general_dir.clone(),
        config_file: base.config_file.clone(),
        crt_list_dir,
    }
}

impl ResolvedPaths {
    /// The absolute path a given `(filename, type)` pair resolves to. Used by
    /// both the template-facing `pathResolver.GetPath` surface and the file
    /// registry's own path computation, so the two always agree.
    pub fn get_path(&self, filename: &str, file_type: FileType) -> PathBuf {
        let dir = match file_type {
            FileType::Map => &self.maps_dir,
            FileType::Cert => &self.ssl_dir,
            FileType::File => &self.general_dir,
            FileType::CrtList => &self.crt_list_dir,
        };
        dir.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::version::Version;

    fn base() -> PathConfig {
        PathConfig {
            maps_dir: "/etc/haproxy/maps".into(),
            ssl_dir: "/etc/haproxy/ssl".into(),
            general_dir: "/etc/haproxy/files".into(),
            config_file: "/etc/haproxy/haproxy.cfg".into(),
        }
    }

    #[test]
    fn crt_list_falls_back_to_general_dir_without_support() {
        let caps = Capabilities::for_version(&Version::new(3, 0, "3.0.0"));
        let resolved = resolve_paths(&base(), &caps);
        assert_eq!(resolved.crt_list_dir, PathBuf::from("/etc/haproxy/files"));
        assert_eq!(
            resolved.get_path("list.txt", FileType::CrtList),
            PathBuf::from("/etc/haproxy/files/list.txt")
        );
    }

    #[test]
    fn crt_list_uses_ssl_dir_when_supported() {
        let caps = Capabilities::for_version(&Version::new(3, 2, "3.2.0"));
        let resolved = resolve_paths(&base(), &caps);
        assert_eq!(resolved.crt_list_dir, PathBuf::from("/etc/haproxy/ssl"));
        assert_eq!(
            resolved.get_path("list.txt", FileType::CrtList),
            PathBuf::from("/etc/haproxy/ssl/list.txt")
        );
    }
}
