//! Layered configuration: built-in defaults, an optional TOML file, and
//! `APP_`-prefixed environment overrides, merged with `figment`.

mod duration_serde;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::events::ExtraContext;
use crate::render::engine::AuxTemplateSpec;
use crate::render::{sort_snippets, PathConfig, SnippetRef};

const DEFAULT_SNIPPET_PRIORITY: u32 = 500;

fn default_dataplane_port() -> u16 {
    5555
}

fn default_dataplane_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_buffer_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataplaneConfig {
    #[serde(default = "default_dataplane_port")]
    pub port: u16,
    #[serde(default = "default_dataplane_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            port: default_dataplane_port(),
            timeout: default_dataplane_timeout(),
        }
    }
}

/// Operator-configured base directories, before capability resolution.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfigSource {
    pub maps_dir: PathBuf,
    pub ssl_dir: PathBuf,
    pub general_dir: PathBuf,
    pub config_file: PathBuf,
}

impl From<PathConfigSource> for PathConfig {
    fn from(source: PathConfigSource) -> Self {
        PathConfig {
            maps_dir: source.maps_dir,
            ssl_dir: source.ssl_dir,
            general_dir: source.general_dir,
            config_file: source.config_file,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemplateConfig {
    pub directory: PathBuf,
    pub main_template: String,
    #[serde(default)]
    pub maps: Vec<AuxTemplateSpec>,
    #[serde(default)]
    pub general_files: Vec<AuxTemplateSpec>,
    #[serde(default)]
    pub certificates: Vec<AuxTemplateSpec>,
}

/// A config-declared snippet override. Snippets not named here but present
/// under `templates.directory/snippets` are picked up automatically at the
/// default priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetConfig {
    pub name: String,
    #[serde(default)]
    pub priority: Option<u32>,
}

impl SnippetConfig {
    pub fn resolved_priority(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_SNIPPET_PRIORITY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// The controller's full, validated configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControllerConfig {
    pub dataplane: DataplaneConfig,
    pub paths: PathConfigSource,
    pub templates: TemplateConfig,
    #[serde(default)]
    pub snippets: Vec<SnippetConfig>,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub extra_context: serde_json::Map<String, serde_json::Value>,
}

impl ControllerConfig {
    /// Loads defaults, then `config_file` if it exists, then `APP_`-prefixed
    /// environment variables (double underscore as the nesting separator),
    /// and validates the result.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ControllerConfig::default()));
        if let Some(path) = config_file {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: ControllerConfig = figment.extract().map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.templates.main_template.is_empty() {
            return Err(ConfigError::invalid("templates.main_template", "must not be empty"));
        }
        if !self.templates.directory.is_dir() {
            return Err(ConfigError::invalid(
                "templates.directory",
                format!("'{}' does not exist or is not a directory", self.templates.directory.display()),
            ));
        }
        Ok(())
    }

    /// Merges config-declared snippet overrides with every file found under
    /// `templates.directory/snippets`, defaulting newly-discovered snippets
    /// to priority 500, then sorts the result for template context use.
    pub fn resolved_snippets(&self) -> Vec<SnippetRef> {
        let mut by_name: BTreeMap<String, u32> = self
            .snippets
            .iter()
            .map(|s| (s.name.clone(), s.resolved_priority()))
            .collect();

        let snippets_dir = self.templates.directory.join("snippets");
        if let Ok(entries) = std::fs::read_dir(&snippets_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    by_name.entry(name.to_string()).or_insert(DEFAULT_SNIPPET_PRIORITY);
                }
            }
        }

        let refs = by_name
            .into_iter()
            .map(|(name, priority)| SnippetRef { name, priority })
            .collect();
        sort_snippets(refs)
    }

    pub fn extra_context(&self) -> ExtraContext {
        self.extra_context.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("haproxy.cfg.tera"), "global\n").unwrap();
        std::fs::create_dir(dir.path().join("snippets")).unwrap();
        std::fs::write(dir.path().join("snippets").join("acl-block.tera"), "# acl\n").unwrap();
        dir
    }

    #[test]
    fn missing_main_template_is_invalid() {
        let dir = write_template_dir();
        let config = ControllerConfig {
            templates: TemplateConfig {
                directory: dir.path().to_path_buf(),
                main_template: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn nonexistent_template_directory_is_invalid() {
        let config = ControllerConfig {
            templates: TemplateConfig {
                directory: PathBuf::from("/does/not/exist"),
                main_template: "haproxy.cfg.tera".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn resolved_snippets_discovers_directory_files_at_default_priority() {
        let dir = write_template_dir();
        let config = ControllerConfig {
            templates: TemplateConfig {
                directory: dir.path().to_path_buf(),
                main_template: "haproxy.cfg.tera".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let snippets = config.resolved_snippets();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].name, "acl-block.tera");
        assert_eq!(snippets[0].priority, DEFAULT_SNIPPET_PRIORITY);
    }

    #[test]
    fn explicit_snippet_priority_overrides_the_default() {
        let dir = write_template_dir();
        let config = ControllerConfig {
            templates: TemplateConfig {
                directory: dir.path().to_path_buf(),
                main_template: "haproxy.cfg.tera".into(),
                ..Default::default()
            },
            snippets: vec![SnippetConfig {
                name: "acl-block.tera".into(),
                priority: Some(10),
            }],
            ..Default::default()
        };

        let snippets = config.resolved_snippets();
        assert_eq!(snippets[0].priority, 10);
    }
}
