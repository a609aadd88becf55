//! Configuration management.
//!
//! Loads configuration from `${VISOR_HOME}/config.toml` with sensible
//! defaults. Backend endpoint and API key can be overridden through the
//! environment (env > config > default).

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use visor_display::DisplaySettings;
use visor_display::settings::{DEFAULT_LINE_WIDTH, DEFAULT_SCROLL_INTERVAL, DEFAULT_WINDOW_HEIGHT};

/// Environment override for the backend endpoint.
pub const BACKEND_URL_ENV: &str = "VISOR_BACKEND_URL";
/// Environment override for the backend API key.
pub const BACKEND_API_KEY_ENV: &str = "VISOR_BACKEND_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendSettings,
    pub sessions: SessionSettings,
    pub display: DisplayDefaults,
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Agent service root, e.g. `https://agent.example.com`.
    pub base_url: Option<String>,
    /// Bearer token for the agent service.
    pub api_key: Option<String>,
}

impl BackendSettings {
    /// Resolves the backend endpoint with precedence: env > config.
    ///
    /// Returns `None` when neither is set; the engine then surfaces a
    /// visible failure message instead of dispatching runs.
    ///
    /// # Errors
    /// Returns an error if the resolved value is not a valid URL.
    pub fn effective_base_url(&self) -> Result<Option<String>> {
        if let Ok(env_url) = std::env::var(BACKEND_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                validate_url(trimmed)?;
                return Ok(Some(trimmed.trim_end_matches('/').to_string()));
            }
        }

        if let Some(config_url) = &self.base_url {
            let trimmed = config_url.trim();
            if !trimmed.is_empty() {
                validate_url(trimmed)?;
                return Ok(Some(trimmed.trim_end_matches('/').to_string()));
            }
        }

        Ok(None)
    }

    /// Resolves the API key with precedence: env > config.
    pub fn effective_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(BACKEND_API_KEY_ENV) {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string)
    }
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid backend base URL: {url}"))?;
    Ok(())
}

/// Session behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Stateful sessions accumulate history and send it with each run;
    /// stateless sessions send only the new utterance.
    pub stateful: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { stateful: true }
    }
}

/// Display defaults applied when the hardware tier has no per-user value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayDefaults {
    pub line_width: usize,
    pub scroll_interval_ms: u64,
    pub smart_wrap: bool,
    pub window_height: usize,
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            scroll_interval_ms: DEFAULT_SCROLL_INTERVAL.as_millis() as u64,
            smart_wrap: true,
            window_height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

impl DisplayDefaults {
    pub fn to_settings(&self) -> DisplaySettings {
        DisplaySettings::default()
            .with_line_width(self.line_width)
            .with_scroll_interval(Duration::from_millis(self.scroll_interval_ms))
            .with_smart_wrap(self.smart_wrap)
            .with_window_height(self.window_height)
    }
}

impl Config {
    /// Loads configuration from the config file, falling back to defaults
    /// when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = paths::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config.toml")
    }

    /// Resolved default display settings for new sessions.
    pub fn display_settings(&self) -> DisplaySettings {
        self.display.to_settings()
    }
}

/// Config file location helpers.
pub mod paths {
    use std::path::PathBuf;

    /// Root directory for visor state: `$VISOR_HOME`, falling back to
    /// `~/.config/visor`.
    pub fn visor_home() -> PathBuf {
        if let Ok(home) = std::env::var("VISOR_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }
        std::env::var("HOME").map_or_else(
            |_| PathBuf::from(".visor"),
            |home| PathBuf::from(home).join(".config").join("visor"),
        )
    }

    pub fn config_path() -> PathBuf {
        visor_home().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.backend.base_url.is_none());
        assert!(config.sessions.stateful);
        assert_eq!(config.display.line_width, DEFAULT_LINE_WIDTH);
        assert_eq!(config.display.window_height, DEFAULT_WINDOW_HEIGHT);
        assert_eq!(config.display.scroll_interval_ms, 250);
        assert!(config.display.smart_wrap);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [backend]
            base_url = "https://agent.example.com"

            [display]
            line_width = 24
            "#,
        )
        .unwrap();
        assert_eq!(
            config.backend.base_url.as_deref(),
            Some("https://agent.example.com")
        );
        assert_eq!(config.display.line_width, 24);
        // Unspecified fields keep their defaults.
        assert_eq!(config.display.window_height, DEFAULT_WINDOW_HEIGHT);
        assert!(config.sessions.stateful);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("backend = not valid").is_err());
    }

    #[test]
    fn test_display_settings_conversion() {
        let config = Config::from_toml_str(
            r#"
            [display]
            line_width = 20
            scroll_interval_ms = 100
            smart_wrap = false
            window_height = 3
            "#,
        )
        .unwrap();
        let settings = config.display_settings();
        assert_eq!(settings.line_width, 20);
        assert_eq!(settings.scroll_interval, Duration::from_millis(100));
        assert!(!settings.smart_wrap);
        assert_eq!(settings.window_height, 3);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let settings = BackendSettings {
            base_url: Some("not a url".to_string()),
            api_key: None,
        };
        assert!(settings.effective_base_url().is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let settings = BackendSettings {
            base_url: Some("https://agent.example.com/".to_string()),
            api_key: None,
        };
        let url = settings.effective_base_url().unwrap().unwrap();
        assert_eq!(url, "https://agent.example.com");
    }
}
