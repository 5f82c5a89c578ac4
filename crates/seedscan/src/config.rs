//! Analysis configuration.
//!
//! Every section deserializes with defaults, so a config file only needs the
//! values it overrides.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{Result, SeedScanError};

/// Complete configuration for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    pub calibration: CalibrationConfig,
    pub segmentation: SegmentationConfig,
    pub plausibility: PlausibilityConfig,
    pub classification: ClassificationConfig,
    pub statistics: StatisticsConfig,
}

impl AnalysisConfig {
    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.segmentation.validate()?;
        self.plausibility.validate()?;
        self.classification.validate()?;
        self.statistics.validate()
    }

    /// JSON schema of the configuration file format
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }
}

fn invalid(message: impl Into<String>) -> SeedScanError {
    SeedScanError::InvalidConfig(message.into())
}

/// Grid detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Physical size of one grid cell in millimetres
    #[schemars(range(min = 0.1, max = 10.0))]
    pub grid_size_mm: f64,
    /// Gaussian sigma applied before line extraction (0 disables smoothing)
    pub blur_sigma: f32,
    /// Radius of the local mean window used to pick out dark lines
    pub line_window_radius: u32,
    /// A pixel is a line pixel when darker than the local mean by more than this
    pub line_offset: u8,
    /// Hough vote threshold as a fraction of the shorter image side
    #[schemars(range(min = 0.05, max = 1.0))]
    pub vote_fraction: f64,
    /// Non-maximum suppression radius in the Hough accumulator
    pub suppression_radius: u32,
    /// Maximum deviation from horizontal/vertical for a line to count as a grid line
    pub axis_tolerance_deg: u32,
    /// Maximum deviation from the modal angle within one line family
    pub angle_tolerance_deg: u32,
    /// Line offsets closer than this are merged into one line
    pub merge_distance_px: f64,
    pub min_lines_per_direction: usize,
    pub min_total_lines: usize,
    pub max_lines_per_direction: usize,
    /// Allowed deviation of the two families from a right angle
    pub orthogonality_tolerance_deg: u32,
    /// Maximum relative difference between horizontal and vertical spacing
    pub max_spacing_divergence: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            grid_size_mm: 1.0,
            blur_sigma: 0.0,
            line_window_radius: 7,
            line_offset: 4,
            vote_fraction: 0.5,
            suppression_radius: 4,
            axis_tolerance_deg: 15,
            angle_tolerance_deg: 2,
            merge_distance_px: 3.0,
            min_lines_per_direction: 3,
            min_total_lines: 5,
            max_lines_per_direction: 2000,
            orthogonality_tolerance_deg: 10,
            max_spacing_divergence: 0.15,
        }
    }
}

impl CalibrationConfig {
    fn validate(&self) -> Result<()> {
        if !(self.grid_size_mm > 0.0) {
            return Err(invalid("calibration.grid_size_mm must be positive"));
        }
        if !(self.vote_fraction > 0.0 && self.vote_fraction <= 1.0) {
            return Err(invalid("calibration.vote_fraction must be in (0, 1]"));
        }
        if self.blur_sigma < 0.0 {
            return Err(invalid("calibration.blur_sigma must not be negative"));
        }
        if self.axis_tolerance_deg >= 45 {
            return Err(invalid("calibration.axis_tolerance_deg must be below 45"));
        }
        if self.angle_tolerance_deg == 0 {
            return Err(invalid("calibration.angle_tolerance_deg must be positive"));
        }
        if !(self.merge_distance_px > 0.0) {
            return Err(invalid("calibration.merge_distance_px must be positive"));
        }
        if self.min_lines_per_direction < 2 {
            return Err(invalid("calibration.min_lines_per_direction must be at least 2"));
        }
        if self.max_lines_per_direction < self.min_lines_per_direction {
            return Err(invalid(
                "calibration.max_lines_per_direction must not be below min_lines_per_direction",
            ));
        }
        if !(0.0..1.0).contains(&self.max_spacing_divergence) {
            return Err(invalid("calibration.max_spacing_divergence must be in [0, 1)"));
        }
        Ok(())
    }
}

/// How the global (Otsu) and adaptive foreground masks are combined
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdMerge {
    /// A pixel is foreground when either strategy marks it
    #[default]
    Union,
    /// A pixel is foreground only when both strategies mark it
    Intersection,
    /// Otsu threshold only
    GlobalOnly,
    /// Local mean threshold only
    AdaptiveOnly,
}

/// Foreground extraction and touching-seed separation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmentationConfig {
    pub blur_sigma: f32,
    pub adaptive_radius: u32,
    pub adaptive_offset: u8,
    /// Pixels brighter than this are always background
    pub paper_cutoff: u8,
    pub threshold_merge: ThresholdMerge,
    pub open_radius: u8,
    pub close_radius: u8,
    /// Components smaller than this are noise
    pub min_seed_area_mm2: f64,
    /// Components larger than this are not seeds at all
    pub max_component_area_mm2: f64,
    /// Absolute floor for watershed marker prominence
    pub marker_min_prominence_mm: f64,
    /// Marker prominence relative to the marker's own peak distance
    #[schemars(range(min = 0.0, max = 1.0))]
    pub marker_prominence_ratio: f64,
    /// Regions less solid than this (area / convex hull area) are discarded
    #[schemars(range(min = 0.0, max = 1.0))]
    pub min_solidity: f64,
    /// Regions more elongated than this are discarded
    pub max_aspect_ratio: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            adaptive_radius: 10,
            adaptive_offset: 5,
            paper_cutoff: 180,
            threshold_merge: ThresholdMerge::Union,
            open_radius: 2,
            close_radius: 2,
            min_seed_area_mm2: 0.5,
            max_component_area_mm2: 100.0,
            marker_min_prominence_mm: 0.15,
            marker_prominence_ratio: 0.2,
            min_solidity: 0.6,
            max_aspect_ratio: 5.0,
        }
    }
}

impl SegmentationConfig {
    fn validate(&self) -> Result<()> {
        if self.blur_sigma < 0.0 {
            return Err(invalid("segmentation.blur_sigma must not be negative"));
        }
        if self.adaptive_radius == 0 {
            return Err(invalid("segmentation.adaptive_radius must be positive"));
        }
        if !(self.min_seed_area_mm2 >= 0.0) {
            return Err(invalid("segmentation.min_seed_area_mm2 must not be negative"));
        }
        if !(self.max_component_area_mm2 > self.min_seed_area_mm2) {
            return Err(invalid(
                "segmentation.max_component_area_mm2 must exceed min_seed_area_mm2",
            ));
        }
        if !(0.0..=1.0).contains(&self.marker_prominence_ratio) {
            return Err(invalid("segmentation.marker_prominence_ratio must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.min_solidity) {
            return Err(invalid("segmentation.min_solidity must be in [0, 1]"));
        }
        if !(self.max_aspect_ratio >= 1.0) {
            return Err(invalid("segmentation.max_aspect_ratio must be at least 1"));
        }
        Ok(())
    }
}

/// Physical bounds of a single seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PlausibilityConfig {
    pub max_seed_length_mm: f64,
    pub max_seed_area_mm2: f64,
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        Self {
            max_seed_length_mm: 6.0,
            max_seed_area_mm2: 12.0,
        }
    }
}

impl PlausibilityConfig {
    fn validate(&self) -> Result<()> {
        if !(self.max_seed_length_mm > 0.0) || !(self.max_seed_area_mm2 > 0.0) {
            return Err(invalid("plausibility bounds must be positive"));
        }
        Ok(())
    }
}

/// Aspect-ratio breakpoints between shape classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Seeds below this aspect ratio are circular
    pub circular_max: f64,
    /// Seeds up to and including this aspect ratio are oval
    pub oval_max: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            circular_max: 1.2,
            oval_max: 1.8,
        }
    }
}

impl ClassificationConfig {
    fn validate(&self) -> Result<()> {
        if !(self.circular_max >= 1.0 && self.circular_max <= self.oval_max) {
            return Err(invalid(
                "classification breakpoints must satisfy 1 <= circular_max <= oval_max",
            ));
        }
        Ok(())
    }
}

/// Percentiles splitting the population into small and large seeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StatisticsConfig {
    #[schemars(range(min = 0.0, max = 100.0))]
    pub large_percentile: f64,
    #[schemars(range(min = 0.0, max = 100.0))]
    pub small_percentile: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            large_percentile: 75.0,
            small_percentile: 25.0,
        }
    }
}

impl StatisticsConfig {
    fn validate(&self) -> Result<()> {
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(self.large_percentile) || !in_range(self.small_percentile) {
            return Err(invalid("statistics percentiles must be in [0, 100]"));
        }
        if self.small_percentile > self.large_percentile {
            return Err(invalid("statistics.small_percentile must not exceed large_percentile"));
        }
        Ok(())
    }
}
