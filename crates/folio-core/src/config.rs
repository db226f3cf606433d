//! Configuration management

use crate::chrome::ChromeConfig;
use crate::{FolioError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Content extraction thresholds
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Page classification thresholds
    #[serde(default)]
    pub classify: ClassifyConfig,

    /// Reading session behavior
    #[serde(default)]
    pub session: SessionConfig,

    /// Document host settings
    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Minimum characters for a selector-list container to be accepted
    #[serde(default = "default_selector_min_chars")]
    pub selector_min_chars: usize,

    /// Minimum paragraph text a density-scored container must carry
    #[serde(default = "default_density_floor")]
    pub density_floor: usize,

    /// Minimum links in a container before it can hold a chapter list
    #[serde(default = "default_list_min_links")]
    pub list_min_links: usize,

    /// Headings and title containers longer than this are not titles
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            selector_min_chars: default_selector_min_chars(),
            density_floor: default_density_floor(),
            list_min_links: default_list_min_links(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Confidence at or above which a link-heavy page is a catalog
    #[serde(default = "default_catalog_threshold")]
    pub catalog_threshold: f32,

    /// Body length at or above which a page is a chapter
    #[serde(default = "default_chapter_min_body")]
    pub chapter_min_body: usize,

    /// Chapter links required for a catalog page
    #[serde(default = "default_catalog_min_links")]
    pub catalog_min_links: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            catalog_threshold: default_catalog_threshold(),
            chapter_min_body: default_chapter_min_body(),
            catalog_min_links: default_catalog_min_links(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Automatic re-queries before falling back to raw document text
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds; attempt N waits N times this
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl SessionConfig {
    /// Delay before the given retry attempt (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Render pages with headless Chrome
    #[serde(default = "default_true")]
    pub javascript: bool,

    /// Browser mode: "auto", "system", or "none"
    #[serde(default = "default_browser_mode")]
    pub mode: String,

    /// Custom Chrome binary path
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Time to let dynamic content settle before querying, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            javascript: default_true(),
            mode: default_browser_mode(),
            chrome_path: None,
            timeout_secs: default_timeout(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl BrowserConfig {
    /// Chrome settings for this browser section
    pub fn to_chrome_config(&self) -> ChromeConfig {
        ChromeConfig {
            mode: self.mode.clone(),
            chrome_path: self.chrome_path.clone(),
            timeout_secs: self.timeout_secs,
            settle_ms: self.settle_ms,
        }
    }
}

// Default value functions
fn default_selector_min_chars() -> usize {
    200
}
fn default_density_floor() -> usize {
    500
}
fn default_list_min_links() -> usize {
    10
}
fn default_title_max_chars() -> usize {
    50
}
fn default_catalog_threshold() -> f32 {
    0.3
}
fn default_chapter_min_body() -> usize {
    100
}
fn default_catalog_min_links() -> usize {
    3
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_browser_mode() -> String {
    "auto".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    100
}

impl EngineConfig {
    /// Load configuration from file or use defaults
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FolioError::ConfigError(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(self)
                .map_err(|e| FolioError::ConfigError(e.to_string()))?;
            fs::write(path, content)?;
        }
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "folio", "folio")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "javascript" | "js" => self.browser.javascript = parse_value(key, value)?,
            "browser" | "mode" => self.browser.mode = value.to_string(),
            "chrome_path" => self.browser.chrome_path = Some(PathBuf::from(value)),
            "timeout" => self.browser.timeout_secs = parse_value(key, value)?,
            "max_retries" | "retries" => self.session.max_retries = parse_value(key, value)?,
            "retry_delay" => self.session.retry_base_delay_ms = parse_value(key, value)?,
            "catalog_threshold" => self.classify.catalog_threshold = parse_value(key, value)?,
            _ => {
                return Err(FolioError::ConfigError(format!(
                    "Unknown configuration key: {}",
                    key
                )))
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| FolioError::ConfigError(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.extract.selector_min_chars, 200);
        assert_eq!(config.extract.list_min_links, 10);
        assert_eq!(config.classify.chapter_min_body, 100);
        assert_eq!(config.session.max_retries, 3);
        assert!(config.browser.javascript);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            "[session]\nretry_base_delay_ms = 250\n\n[classify]\ncatalog_threshold = 0.6\n",
        )
        .unwrap();
        assert_eq!(config.session.retry_base_delay_ms, 250);
        assert_eq!(config.session.max_retries, 3);
        assert!((config.classify.catalog_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.extract.density_floor, 500);
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let session = SessionConfig {
            max_retries: 3,
            retry_base_delay_ms: 400,
        };
        assert_eq!(session.retry_delay(1), Duration::from_millis(400));
        assert_eq!(session.retry_delay(3), Duration::from_millis(1200));
    }

    #[test]
    fn test_set_values() {
        let mut config = EngineConfig::default();
        config.set("js", "false").unwrap();
        config.set("retries", "5").unwrap();
        assert!(!config.browser.javascript);
        assert_eq!(config.session.max_retries, 5);
        assert!(config.set("retries", "many").is_err());
        assert!(config.set("colour", "blue").is_err());
    }

    #[test]
    fn test_chrome_config_follows_browser_section() {
        let mut config = EngineConfig::default();
        config.set("chrome_path", "/opt/chrome/chrome").unwrap();
        config.set("timeout", "12").unwrap();

        let chrome = config.browser.to_chrome_config();
        assert_eq!(chrome.mode, "auto");
        assert_eq!(chrome.chrome_path, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(chrome.timeout_secs, 12);
    }
}
