// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// The file is optional. Every default reproduces the plain demo (800x600
// window, FIFO presentation, black background), so running without a config
// file is the normal case.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "HelloVulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds
    pub validation_layers: bool,
    pub log_level: String,
    /// Empty means stderr
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "trace".to_string(),
            log_file: String::new(),
            show_fps: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    ///
    /// Runs before the logger exists, so problems are returned as a warning
    /// for the caller to log once logging is up.
    pub fn load() -> (Self, Option<String>) {
        match Self::load_from_path(CONFIG_PATH) {
            Ok(config) => (config, None),
            Err(e) => (
                Config::default(),
                Some(format!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e)),
            ),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Get log level filter, `trace` if unparseable
    pub fn get_log_level(&self) -> log::LevelFilter {
        self.debug
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn defaults_match_plain_demo() {
        let config = Config::default();

        assert_eq!(config.window.title, "HelloVulkan");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.debug.log_file.is_empty());
        assert!(!config.debug.show_fps);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            width = 1024

            [graphics]
            present_mode = "Mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "HelloVulkan");
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn unknown_present_mode_is_fifo() {
        let config = Config::from_toml_str("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn log_levels_parse() {
        let config = Config::from_toml_str("[debug]\nlog_level = \"warn\"").unwrap();
        assert_eq!(config.get_log_level(), log::LevelFilter::Warn);

        let config = Config::from_toml_str("[debug]\nlog_level = \"chatty\"").unwrap();
        assert_eq!(config.get_log_level(), log::LevelFilter::Trace);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::from_toml_str("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.window.width, 800);
    }
}
