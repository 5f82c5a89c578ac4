use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedScanError {
    #[error("Calibration failed: {message} ({horizontal_lines} horizontal / {vertical_lines} vertical grid lines)")]
    CalibrationFailed {
        message: String,
        horizontal_lines: usize,
        vertical_lines: usize,
    },

    #[error("No seeds detected ({regions_found} regions found, {excluded} excluded as implausible)")]
    NoSeedsDetected { regions_found: usize, excluded: usize },

    #[error("Region {label} could not be measured: {reason}")]
    DegenerateRegion { label: u32, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Analysis queue is full ({capacity} requests in flight)")]
    Overloaded { capacity: usize },

    #[error("Analysis worker failed: {0}")]
    WorkerFailed(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl SeedScanError {
    pub(crate) fn calibration(message: impl Into<String>, horizontal_lines: usize, vertical_lines: usize) -> Self {
        Self::CalibrationFailed {
            message: message.into(),
            horizontal_lines,
            vertical_lines,
        }
    }

    /// Stable machine-readable code for the calling layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CalibrationFailed { .. } => "CALIBRATION_FAILED",
            Self::NoSeedsDetected { .. } => "NO_SEEDS_DETECTED",
            Self::DegenerateRegion { .. } => "DEGENERATE_REGION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Overloaded { .. } => "OVERLOADED",
            Self::WorkerFailed(_) => "WORKER_FAILED",
            Self::ImageLoad(_) => "INVALID_IMAGE",
            Self::Serialization(_) | Self::Io(_) | Self::GeoJson(_) => "INTERNAL_ERROR",
        }
    }

    /// Troubleshooting hints for whole-image failures.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::CalibrationFailed { .. } => &[
                "Ensure the entire grid is visible in the image",
                "Check that lighting is even across the image",
                "Verify the grid paper is flat, not wrinkled",
            ],
            Self::NoSeedsDetected { .. } => &[
                "Ensure seeds are visible and have good contrast with the background",
                "Check that seeds are not too small or too large for the detection range",
                "Spread touching seeds apart if many clusters were excluded",
            ],
            Self::Overloaded { .. } => &["Retry the request once in-flight analyses have finished"],
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, SeedScanError>;
