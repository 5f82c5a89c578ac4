use image::GrayImage;
use tracing::debug;

use crate::{
    algorithms::{
        extraction::{outer_boundary, solidity},
        labelling::{label_regions, order_regions},
        moments::Ellipse,
        thresholding::ForegroundExtractor,
        watershed::{split_region, MarkerCriteria},
    },
    config::{PlausibilityConfig, SegmentationConfig},
    error::Result,
    traits::Segmenter,
    types::{CalibrationResult, Region},
};

/// Threshold, label, split touching seeds with a distance watershed, and
/// discard non-seed shapes.
///
/// Oversize regions the watershed cannot split skip the shape gate so the
/// plausibility filter reports them as excluded.
#[derive(Debug, Clone, Default)]
pub struct WatershedSegmenter {
    pub config: SegmentationConfig,
    /// Single-seed bounds; larger regions bypass the shape gate
    pub bounds: PlausibilityConfig,
}

impl WatershedSegmenter {
    pub fn new(config: SegmentationConfig, bounds: PlausibilityConfig) -> Self {
        Self { config, bounds }
    }

    /// Larger than a single seed may be
    fn is_oversize(&self, region: &Region, calibration: &CalibrationResult) -> bool {
        let area_mm2 = calibration.px2_to_mm2(region.area_px as f64);
        if area_mm2 > self.bounds.max_seed_area_mm2 {
            return true;
        }
        Ellipse::from_pixels(region.pixels())
            .is_some_and(|e| calibration.px_to_mm(e.major_axis) > self.bounds.max_seed_length_mm)
    }

    fn passes_shape_gate(&self, region: &Region) -> bool {
        let Some(ellipse) = Ellipse::from_pixels(region.pixels()) else {
            return false;
        };
        if ellipse.aspect_ratio() > self.config.max_aspect_ratio {
            debug!(label = region.label, aspect = ellipse.aspect_ratio(), "Dropping elongated region");
            return false;
        }
        let solidity = solidity(&outer_boundary(region));
        if solidity < self.config.min_solidity {
            debug!(label = region.label, solidity, "Dropping irregular region");
            return false;
        }
        true
    }
}

impl Segmenter for WatershedSegmenter {
    fn segment(&self, image: &GrayImage, calibration: &CalibrationResult) -> Result<Vec<Region>> {
        let cfg = &self.config;
        let min_area_px = calibration.mm2_to_px2(cfg.min_seed_area_mm2);
        let max_area_px = calibration.mm2_to_px2(cfg.max_component_area_mm2);
        let criteria = MarkerCriteria {
            min_prominence_px: cfg.marker_min_prominence_mm * calibration.pixels_per_mm,
            prominence_ratio: cfg.marker_prominence_ratio,
        };

        let mask = ForegroundExtractor::new(cfg.clone()).extract(image);
        let components = label_regions(&mask);
        let found = components.len();

        let mut regions = Vec::new();
        for component in components {
            let area = component.area_px as f64;
            if area < min_area_px || area > max_area_px {
                continue;
            }
            // Every component is flooded; marker prominence keeps single seeds whole
            let pieces = split_region(&component, &criteria);
            if pieces.len() == 1 && self.is_oversize(&component, calibration) {
                // Unsplittable cluster: left for the plausibility filter to exclude
                debug!(label = component.label, "Passing oversize region through unsplit");
                regions.push(component);
                continue;
            }
            regions.extend(
                pieces
                    .into_iter()
                    .filter(|piece| piece.area_px as f64 >= min_area_px)
                    .filter(|piece| self.passes_shape_gate(piece)),
            );
        }

        order_regions(&mut regions);
        debug!(components = found, regions = regions.len(), "Segmented foreground");
        Ok(regions)
    }

    fn name(&self) -> &'static str {
        "watershed"
    }
}
