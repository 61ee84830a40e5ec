//! Dataplane credentials source.
//!
//! Loads `{username, password, version}` from a mounted secret file or from
//! environment variables, and publishes `CredentialsUpdated`. Real secret
//! rotation is out of scope; this only provides the load-and-publish
//! contract.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::errors::ConfigError;
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub version: String,
}

#[derive(Deserialize)]
struct SecretFile {
    username: String,
    password: String,
    version: String,
}

pub struct CredentialsSource {
    secret_file: Option<PathBuf>,
}

impl CredentialsSource {
    pub fn new(secret_file: Option<PathBuf>) -> Self {
        Self { secret_file }
    }

    /// Reads the secret file if configured, else falls back to
    /// `DATAPLANE_USERNAME`/`DATAPLANE_PASSWORD`/`DATAPLANE_VERSION`.
    pub fn load(&self) -> Result<Credentials, ConfigError> {
        if let Some(path) = &self.secret_file {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::Load(format!("failed to read credentials file '{}': {e}", path.display()))
            })?;
            let parsed: SecretFile = toml::from_str(&contents)
                .map_err(|e| ConfigError::Load(format!("invalid credentials file '{}': {e}", path.display())))?;
            return Ok(Credentials {
                username: parsed.username,
                password: parsed.password,
                version: parsed.version,
            });
        }

        let username =
            std::env::var("DATAPLANE_USERNAME").map_err(|_| ConfigError::invalid("DATAPLANE_USERNAME", "not set"))?;
        let password =
            std::env::var("DATAPLANE_PASSWORD").map_err(|_| ConfigError::invalid("DATAPLANE_PASSWORD", "not set"))?;
        let version =
            std::env::var("DATAPLANE_VERSION").map_err(|_| ConfigError::invalid("DATAPLANE_VERSION", "not set"))?;
        Ok(Credentials { username, password, version })
    }

    pub async fn publish(&self, bus: &EventBus, credentials: &Credentials) {
        info!(version = %credentials.version, "credentials: publishing Dataplane credentials");
        bus.publish(Event::CredentialsUpdated {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            version: credentials.version.clone(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_credentials_from_a_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataplane.toml");
        std::fs::write(&path, "username = \"u\"\npassword = \"p\"\nversion = \"3.2.0\"\n").unwrap();

        let source = CredentialsSource::new(Some(path));
        let credentials = source.load().unwrap();
        assert_eq!(credentials.username, "u");
        assert_eq!(credentials.version, "3.2.0");
    }

    #[test]
    fn missing_secret_file_is_a_load_error() {
        let source = CredentialsSource::new(Some(PathBuf::from("/does/not/exist.toml")));
        assert!(matches!(source.load(), Err(ConfigError::Load(_))));
    }
}
