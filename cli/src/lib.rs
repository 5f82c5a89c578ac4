use image::DynamicImage;
use schemars::JsonSchema;
use seedscan::{AnalysisConfig, AnalysisResult, Backpressure, SeedScanError, ServiceConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    Analysis(#[from] SeedScanError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
    #[error("Unsupported image type '{0}'")]
    UnsupportedImageFormat(String),
    #[error("Image is {size} bytes, the limit is {limit}")]
    InputTooLarge { size: u64, limit: u64 },
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Analysis(e) => e.code(),
            Self::ImageError(_) | Self::UnsupportedImageFormat(_) => "INVALID_IMAGE",
            Self::InputTooLarge { .. } => "FILE_TOO_LARGE",
            Self::UnsupportedFileFormat | Self::TomlDeError(_) => "INVALID_CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Checks applied to an image file before it is decoded
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct InputLimits {
    pub max_file_bytes: u64,
    /// Lower-case file extensions accepted for decoding
    pub allowed_extensions: Vec<String>,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"].map(String::from).to_vec(),
        }
    }
}

impl InputLimits {
    /// Validate extension and size, then decode
    pub fn load_image<P: AsRef<Path>>(&self, path: P) -> Result<DynamicImage, CliError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(CliError::UnsupportedImageFormat(extension));
        }

        let size = fs::metadata(path)?.len();
        if size > self.max_file_bytes {
            return Err(CliError::InputTooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }
        Ok(image::open(path)?)
    }
}

/// Everything the command line tool reads from a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SeedScanConfig {
    pub analysis: AnalysisConfig,
    pub service: ServiceConfig,
    pub input: InputLimits,
}

impl SeedScanConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: SeedScanConfig = toml::from_str(content)?;
        config.analysis.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let config: SeedScanConfig = serde_json::from_str(content)?;
        config.analysis.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// `service.backpressure` as written in a config file, `None` when the
    /// file leaves it unset
    pub fn backpressure_in_file<P: AsRef<Path>>(path: P) -> Result<Option<Backpressure>, CliError> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)?;
        let keys: ExplicitKeys = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => return Err(CliError::UnsupportedFileFormat),
        };
        Ok(keys.service.backpressure)
    }

    /// Save configuration, choosing TOML or JSON from the extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(CliError::UnsupportedFileFormat),
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert configuration to JSON string
    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}

/// Keys whose absence from a config file matters to the caller
#[derive(Deserialize, Default)]
struct ExplicitKeys {
    #[serde(default)]
    service: ExplicitService,
}

#[derive(Deserialize, Default)]
struct ExplicitService {
    backpressure: Option<Backpressure>,
}

/// Command-line values for `batch` that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct BatchOverrides {
    pub workers: Option<usize>,
    pub queue_depth: Option<usize>,
    pub backpressure: Option<Backpressure>,
}

impl BatchOverrides {
    /// Flags win over the file. Backpressure not set by either falls back to
    /// `wait`, so a large batch queues instead of failing.
    pub fn apply(&self, config: &mut SeedScanConfig, file_backpressure: Option<Backpressure>) {
        if let Some(workers) = self.workers {
            config.service.workers = workers;
        }
        if let Some(depth) = self.queue_depth {
            config.service.max_queue_depth = depth;
        }
        config.service.backpressure = self
            .backpressure
            .or(file_backpressure)
            .unwrap_or(Backpressure::Wait);
    }
}

/// Machine-readable failure for one image
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ErrorReport {
    pub success: bool,
    pub image: Option<String>,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub suggestions: Vec<String>,
}

impl ErrorReport {
    pub fn new(image: Option<&Path>, error: &CliError) -> Self {
        let (details, suggestions) = match error {
            CliError::Analysis(e) => {
                let details = match e {
                    SeedScanError::CalibrationFailed { horizontal_lines, vertical_lines, .. } => Some(json!({
                        "horizontal_lines": horizontal_lines,
                        "vertical_lines": vertical_lines,
                    })),
                    SeedScanError::NoSeedsDetected { regions_found, excluded } => Some(json!({
                        "regions_found": regions_found,
                        "excluded": excluded,
                    })),
                    _ => None,
                };
                (details, e.suggestions().iter().map(|s| s.to_string()).collect())
            }
            CliError::InputTooLarge { size, limit } => (
                Some(json!({ "size": size, "limit": limit })),
                vec!["Resize or recompress the photograph".to_string()],
            ),
            CliError::UnsupportedImageFormat(_) => (
                None,
                vec!["Use a JPEG, PNG or WebP image".to_string()],
            ),
            _ => (None, Vec::new()),
        };

        Self {
            success: false,
            image: image.map(|p| p.display().to_string()),
            code: error.code().to_string(),
            message: error.to_string(),
            details,
            suggestions,
        }
    }
}

/// Successful analysis of one image
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AnalysisReport {
    pub success: bool,
    pub image: Option<String>,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

impl AnalysisReport {
    pub fn new(image: Option<&Path>, result: AnalysisResult) -> Self {
        Self {
            success: true,
            image: image.map(|p| p.display().to_string()),
            result,
        }
    }
}

/// Per-image entry of a batch run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ImageOutcome {
    Analyzed(AnalysisReport),
    Failed(ErrorReport),
}

impl ImageOutcome {
    pub fn from_result(image: &Path, result: Result<AnalysisResult, CliError>) -> Self {
        match result {
            Ok(result) => Self::Analyzed(AnalysisReport::new(Some(image), result)),
            Err(e) => Self::Failed(ErrorReport::new(Some(image), &e)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Analyzed(_))
    }
}
