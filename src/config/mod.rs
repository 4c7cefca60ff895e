//! Configuration file management
//!
//! Loads TOML configuration files and provides render settings.
//! Default config path: ~/.config/ftfont/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Font settings
    pub font: FontConfig,
    /// Output settings
    pub output: OutputConfig,
}

/// Font settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Primary font: family name or file path (searches system fonts if empty)
    pub primary: String,
    /// Fallback fonts in search order: family names or file paths
    pub fallbacks: Vec<String>,
    /// Fallbacks that only fill gaps; using one of them logs a warning
    pub last_resort: Vec<String>,
    /// Font size in points
    pub size: f64,
    /// Output resolution
    pub dpi: f64,
    /// Horizontal oversampling for hinting (1 = none)
    pub hinting_factor: i64,
    /// Extra right shift applied to kerning values
    pub kerning_factor: u32,
    /// Gray coverage (true) or 1-bit rendering (false)
    pub antialiased: bool,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            primary: String::new(),
            fallbacks: Vec::new(),
            last_resort: Vec::new(),
            size: 12.0,
            dpi: 72.0,
            hinting_factor: 8,
            kerning_factor: 0,
            antialiased: true,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// PNG written when no -o is given
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "text.png".to_string(),
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/ftfont/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. FTFONT_CONFIG environment variable
        if let Ok(path) = std::env::var("FTFONT_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/ftfont/config.toml
        if let Some(config_path) = Self::user_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/ftfont/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ftfont").join("config.toml"))
    }

    /// Load configuration with priority:
    /// 1. FTFONT_CONFIG environment variable
    /// 2. ~/.config/ftfont/config.toml (user config)
    /// 3. /etc/ftfont/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Write a config template to the user config path
    /// The primary font is filled in from fontconfig when one is found
    pub fn write_template() -> Result<PathBuf> {
        let config_path =
            Self::user_config_path().ok_or_else(|| anyhow::anyhow!("Config directory not found"))?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let mut config = Config::default();
        if let Some(m) = crate::font::fontconfig::FontFinder::new()
            .ok()
            .and_then(|f| f.find_sans())
        {
            config.font.primary = m.family;
        }

        let body = toml::to_string_pretty(&config)?;
        let content = format!(
            "# ftfont configuration\n# Font entries accept a family name or a file path\n\n{}",
            body
        );
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        info!("Config template written: {}", config_path.display());
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.font.size, 12.0);
        assert_eq!(config.font.dpi, 72.0);
        assert_eq!(config.font.hinting_factor, 8);
        assert!(config.font.antialiased);
        assert_eq!(config.output.path, "text.png");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [font]
            primary = "DejaVu Sans"
            fallbacks = ["Noto Sans CJK JP", "/usr/share/fonts/emoji.ttf"]
            size = 18.5
            "#,
        )
        .unwrap();
        assert_eq!(config.font.primary, "DejaVu Sans");
        assert_eq!(config.font.fallbacks.len(), 2);
        assert_eq!(config.font.size, 18.5);
        assert_eq!(config.font.dpi, 72.0);
        assert_eq!(config.output.path, "text.png");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::from_toml_str("[font\nsize = ").is_err());
        assert!(Config::from_toml_str("[font]\nsize = \"big\"").is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.font.last_resort = vec!["Unifont".to_string()];
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed.font.last_resort, vec!["Unifont".to_string()]);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from_file(Path::new("/nonexistent/ftfont.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
