//! Plaintext secrets mapping.
//!
//! The desktop shell keeps credentials in an encrypted store and can export
//! them as a JSON mapping:
//!
//! ```json
//! { "jimeng": { "sessionid": "...", "account_name": "..." }, "proxy": "http://..." }
//! ```
//!
//! Only that plaintext form is read here.

use std::path::Path;

use dreamcanvas_jimeng::JimengConfig;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ConfigError;

/// Session used when no credentials are configured. Every call made with
/// it is rejected upstream, which surfaces as failed tasks.
pub const PLACEHOLDER_SESSION: &str = "placeholder";
pub const PLACEHOLDER_ACCOUNT: &str = "offline";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JimengCredentials {
    #[serde(default)]
    pub sessionid: String,
    #[serde(default)]
    pub account_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub jimeng: Option<JimengCredentials>,
    /// Either a proxy URL or an object with `https`, `http` or `url`.
    #[serde(default)]
    pub proxy: Option<Value>,
}

impl Secrets {
    /// Read the secrets file. A missing file yields empty secrets.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No secrets file");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Secrets {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Secrets {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Proxy URL, if one is configured.
    pub fn proxy_url(&self) -> Option<String> {
        let url = match self.proxy.as_ref()? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => ["https", "http", "url"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str)),
            _ => None,
        }?;
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    /// Client configuration for the Jimeng API.
    ///
    /// Without a usable session id this falls back to an offline
    /// placeholder so the server can still start.
    pub fn jimeng_config(&self, base_url: &str) -> JimengConfig {
        let credentials = self
            .jimeng
            .as_ref()
            .filter(|c| !c.sessionid.trim().is_empty());

        let (session_id, account_name) = match credentials {
            Some(c) => (c.sessionid.trim().to_string(), c.account_name.clone()),
            None => {
                tracing::warn!(
                    "No valid Jimeng credentials found, starting with an offline placeholder"
                );
                (
                    PLACEHOLDER_SESSION.to_string(),
                    Some(PLACEHOLDER_ACCOUNT.to_string()),
                )
            }
        };

        JimengConfig {
            session_id,
            account_name,
            proxy: self.proxy_url(),
            base_url: base_url.to_string(),
        }
    }
}
