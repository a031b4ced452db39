use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of tabs allowed
    pub max_tabs: usize,
    /// Timeout for tool calls that do not pass their own
    pub default_tool_timeout_ms: u64,
    /// Push-stream configuration
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReconnectPolicy {
    /// Reopen only on the next subscribe or an explicit reconnect
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// SSE endpoint root; `None` runs without a network transport
    pub base_url: Option<String>,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTabsConfig {
    pub max_tabs: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlToolsConfig {
    pub default_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlStreamConfig {
    pub base_url: Option<String>,
    pub reconnect: Option<ReconnectPolicy>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub tabs: Option<TomlTabsConfig>,
    pub tools: Option<TomlToolsConfig>,
    pub stream: Option<TomlStreamConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tabs: 10,
            default_tool_timeout_ms: 30_000,
            stream: StreamConfig {
                base_url: None,
                reconnect: ReconnectPolicy::Manual,
            },
        }
    }
}

impl Config {
    /// Load configuration from the data directory, merging with defaults.
    ///
    /// Writes the bundled example on first run. A broken file is reported
    /// and the defaults are used.
    pub fn load() -> Self {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        match Self::load_from(&config_file) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring invalid config; using defaults");
                Config::default()
            }
        }
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let toml_config =
            toml::from_str::<TomlConfig>(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Config::default();
        config.merge(toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Overlay every value present in `toml_config`
    pub fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(tabs) = toml_config.tabs {
            if let Some(max_tabs) = tabs.max_tabs {
                self.max_tabs = max_tabs;
            }
        }

        if let Some(tools) = toml_config.tools {
            if let Some(timeout) = tools.default_timeout_ms {
                self.default_tool_timeout_ms = timeout;
            }
        }

        if let Some(stream) = toml_config.stream {
            if let Some(base_url) = stream.base_url {
                self.stream.base_url = Some(base_url);
            }
            if let Some(reconnect) = stream.reconnect {
                self.stream.reconnect = reconnect;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tabs == 0 {
            return Err(ConfigError::Invalid("tabs.max_tabs must be at least 1".into()));
        }
        if self.default_tool_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "tools.default_timeout_ms must be greater than 0".into(),
            ));
        }
        if let Some(url) = &self.stream.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "stream.base_url must be an http(s) URL, got {url}"
                )));
            }
        }
        Ok(())
    }

    pub fn default_tool_timeout(&self) -> Duration {
        Duration::from_millis(self.default_tool_timeout_ms)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.stream.base_url = Some(base_url.into());
        self
    }

    pub fn with_max_tabs(mut self, max_tabs: usize) -> Self {
        self.max_tabs = max_tabs;
        self
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, path = %path.display(), "Failed to write default config");
        }
    }
}
