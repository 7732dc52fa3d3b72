//! Application Configuration
//!
//! User settings stored in TOML format. Every section has defaults, so a
//! partial file (or none at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::capture::DEFAULT_MAX_UPLOAD_WIDTH;
use crate::crop::FlowKind;
use crate::vision::{OcrBackend, PageSegmentation, RecognitionOptions};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Image acquisition settings
    pub capture: CaptureSettings,
    /// Recognition engine settings
    pub recognition: RecognitionSettings,
    /// Card database settings
    pub lookup: LookupSettings,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Capture flow: adjustable crop or fixed auto-scan band
    pub flow: FlowKind,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            flow: FlowKind::Interactive,
        }
    }
}

/// Capture-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Uploaded images wider than this are scaled down
    pub max_upload_width: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_upload_width: DEFAULT_MAX_UPLOAD_WIDTH,
        }
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Engine to use
    pub backend: OcrBackend,
    /// Recognition language (Tesseract code such as "eng", or a BCP-47 tag for Windows OCR)
    pub language: String,
    /// Page segmentation hint
    pub page_segmentation: PageSegmentation,
    /// Tesseract executable, looked up on PATH when relative
    pub tesseract_path: PathBuf,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            language: "eng".to_string(),
            page_segmentation: PageSegmentation::SingleBlock,
            tesseract_path: PathBuf::from("tesseract"),
        }
    }
}

impl RecognitionSettings {
    /// Per-request engine options
    pub fn options(&self) -> RecognitionOptions {
        RecognitionOptions {
            language: self.language.clone(),
            page_segmentation: self.page_segmentation,
        }
    }
}

/// Card database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    /// API root, without the `/cards` suffix
    pub base_url: String,
    /// Maximum number of results per search
    pub page_size: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Optional API key sent as `X-Api-Key`
    pub api_key: Option<String>,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.pokemontcg.io/v2".to_string(),
            page_size: 6,
            timeout_secs: 20,
            api_key: None,
        }
    }
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("io", "cardscanner", "CardScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Default location of `config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load the given file, or the default location, falling back to defaults
/// when no file exists. A file that exists but does not parse is an error.
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Ok(p) => p,
            Err(_) => {
                info!("Using default configuration");
                return Ok(AppConfig::default());
            }
        },
    };

    if path.exists() {
        let config = load_config(&path)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else {
        info!("No configuration at {:?}, using defaults", path);
        Ok(AppConfig::default())
    }
}
