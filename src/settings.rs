use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::env;
use std::time::Duration;

const ENV_PREFIX: &str = "ROLE_IMPORT";

/// Runtime tuning for the import orchestrator
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Interval in milliseconds between current-user reads while the repository cache warms (default: 5000)
    #[serde(default = "default_cache_poll_interval")]
    pub cache_poll_interval_ms: u64,

    /// Interval in milliseconds between import job status queries (default: 5000)
    #[serde(default = "default_job_poll_interval")]
    pub job_poll_interval_ms: u64,

    /// Delay in milliseconds before syncing secrets when a save has no rename (default: 300)
    #[serde(default = "default_settings_delay")]
    pub settings_delay_ms: u64,

    /// Consecutive failed status queries before a poll gives up (default: 5)
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
}

fn default_cache_poll_interval() -> u64 {
    5000
}

fn default_job_poll_interval() -> u64 {
    5000
}

fn default_settings_delay() -> u64 {
    300
}

fn default_max_poll_errors() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_poll_interval_ms: default_cache_poll_interval(),
            job_poll_interval_ms: default_job_poll_interval(),
            settings_delay_ms: default_settings_delay(),
            max_poll_errors: default_max_poll_errors(),
        }
    }
}

impl Settings {
    pub fn cache_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache_poll_interval_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn settings_delay(&self) -> Duration {
        Duration::from_millis(self.settings_delay_ms)
    }

    /// Load from `$ROLE_IMPORT_CONFIG_DIR/settings.{toml,yaml,yml}` (optional)
    /// and `ROLE_IMPORT__*` environment variables
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = env::var("ROLE_IMPORT_CONFIG_DIR").unwrap_or_else(|_| "config".into());
        Self::load(&config_dir, ENV_PREFIX)
    }

    fn load(config_dir: &str, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // TOML takes precedence if several extensions exist
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/settings.{}", config_dir, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading settings file: {}", path);
                builder = builder.add_source(config::File::with_name(&path));
                break;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;

        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(config, |path| {
            unused_fields.push(path.to_string());
        })?;

        for field in &unused_fields {
            tracing::warn!("Unknown settings field: {}", field);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("cache_poll_interval_ms", self.cache_poll_interval_ms),
            ("job_poll_interval_ms", self.job_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}
