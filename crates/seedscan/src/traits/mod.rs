use image::GrayImage;
use crate::{
    error::Result,
    types::{CalibrationResult, Region, SeedMeasurement},
};

/// Trait for grid calibration algorithms
pub trait Calibrator: Send + Sync {
    /// Derive the pixel-per-millimetre scale, or fail with `CalibrationFailed`
    fn calibrate(&self, image: &GrayImage) -> Result<CalibrationResult>;
}

/// Trait for foreground segmentation strategies
pub trait Segmenter: Send + Sync {
    /// Split the image into seed regions, ordered by centroid (y, then x)
    fn segment(&self, image: &GrayImage, calibration: &CalibrationResult) -> Result<Vec<Region>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Trait for per-region shape measurement
pub trait ShapeMeasurer: Send + Sync {
    /// Measure one region, or fail with `DegenerateRegion`
    fn measure(&self, region: &Region, calibration: &CalibrationResult) -> Result<SeedMeasurement>;
}
