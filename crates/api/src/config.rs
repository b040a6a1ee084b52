use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dreamcanvas_jimeng::api::DEFAULT_BASE_URL;
use dreamcanvas_tasks::RegistryConfig;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable is set but cannot be parsed.
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The secrets file exists but cannot be read or parsed.
    #[error("Failed to load secrets from {path}: {reason}")]
    Secrets { path: PathBuf, reason: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development on the desktop.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from the comma-separated `DC_CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Root directory of project storage.
    pub projects_dir: PathBuf,
    /// Plaintext JSON secrets file holding the Jimeng credentials.
    pub secrets_path: PathBuf,
    pub jimeng_base_url: String,
    /// Delay between two status polls, in milliseconds (default: `3000`).
    pub poll_interval_ms: u64,
    /// Time a job may stay in flight, in seconds (default: `240`).
    pub poll_timeout_secs: u64,
    /// Milestone label reported by diagnostics (default: `P0`).
    pub phase: String,
    /// Log directory of the desktop shell, reported by diagnostics.
    pub log_dir: PathBuf,
    /// Destination of project backup archives.
    pub backups_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                   |
    /// |-----------------------------|-------------------------------------------|
    /// | `DC_HOST`                   | `127.0.0.1`                               |
    /// | `DC_PORT`                   | `8000`                                    |
    /// | `DC_CORS_ORIGINS`           | `http://localhost:3000`                   |
    /// | `DC_REQUEST_TIMEOUT_SECS`   | `30`                                      |
    /// | `DC_PROJECTS_DIR`           | `<home>/AppData/Roaming/DreamCanvas/projects` |
    /// | `DC_SECRETS_PLAINTEXT_PATH` | `config/secrets.local.json`               |
    /// | `DC_JIMENG_BASE_URL`        | `https://jimeng.jianying.com`             |
    /// | `DC_POLL_INTERVAL_MS`       | `3000`                                    |
    /// | `DC_POLL_TIMEOUT_SECS`      | `240`                                     |
    /// | `DC_PHASE`                  | `P0`                                      |
    /// | `DC_LOG_DIR`                | `<home>/AppData/Local/DreamCanvas/logs`   |
    /// | `DC_BACKUPS_DIR`            | `<home>/AppData/Roaming/DreamCanvas/backups` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_string("DC_HOST", "127.0.0.1");
        let port = env_parse("DC_PORT", 8000u16)?;

        let cors_origins: Vec<String> = env_string("DC_CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_parse("DC_REQUEST_TIMEOUT_SECS", 30u64)?;

        let projects_dir = env_path(
            "DC_PROJECTS_DIR",
            &["AppData", "Roaming", "DreamCanvas", "projects"],
        );
        let log_dir = env_path("DC_LOG_DIR", &["AppData", "Local", "DreamCanvas", "logs"]);
        let backups_dir = env_path(
            "DC_BACKUPS_DIR",
            &["AppData", "Roaming", "DreamCanvas", "backups"],
        );
        let phase = env_string("DC_PHASE", "P0");
        let secrets_path = PathBuf::from(env_string(
            "DC_SECRETS_PLAINTEXT_PATH",
            "config/secrets.local.json",
        ));
        let jimeng_base_url = env_string("DC_JIMENG_BASE_URL", DEFAULT_BASE_URL);

        let poll_interval_ms = env_parse("DC_POLL_INTERVAL_MS", 3000u64)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "DC_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        let poll_timeout_secs = env_parse("DC_POLL_TIMEOUT_SECS", 240u64)?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            projects_dir,
            secrets_path,
            jimeng_base_url,
            poll_interval_ms,
            poll_timeout_secs,
            phase,
            log_dir,
            backups_dir,
        })
    }

    /// Polling parameters for the task registry.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            })
        }
        Err(_) => Ok(default),
    }
}

/// Path from `key`, or `under_home` joined onto the user's home directory.
fn env_path(key: &str, under_home: &[&str]) -> PathBuf {
    if let Some(path) = std::env::var_os(key) {
        return PathBuf::from(path);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    under_home.iter().fold(home, |path, part| path.join(part))
}
