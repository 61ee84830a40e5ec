//! Authentication modes for HTTP resource store fetches.

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exactly one authentication mode may be attached to a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMode {
    Basic { username: String, password: String },
    Bearer { token: String },
    Header { headers: BTreeMap<String, String> },
}

impl AuthMode {
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            AuthMode::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            AuthMode::Bearer { token } => builder.bearer_auth(token),
            AuthMode::Header { headers } => {
                let mut builder = builder;
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                builder
            }
        }
    }
}
