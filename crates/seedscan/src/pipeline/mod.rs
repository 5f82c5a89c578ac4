pub mod builder;

use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::{
    classify::{Aggregator, Classifier},
    config::AnalysisConfig,
    error::{Result, SeedScanError},
    filter::PlausibilityFilter,
    traits::{Calibrator, Segmenter, ShapeMeasurer},
    types::AnalysisResult,
};

/// The seed measurement pipeline: calibrate, segment, measure, filter,
/// classify
pub struct Analyzer {
    calibrator: Box<dyn Calibrator>,
    segmenter: Box<dyn Segmenter>,
    measurer: Box<dyn ShapeMeasurer>,
    filter: PlausibilityFilter,
    classifier: Classifier,
    aggregator: Aggregator,
}

impl Analyzer {
    /// Create a new analyzer builder
    pub fn builder() -> builder::AnalyzerBuilder {
        builder::AnalyzerBuilder::new()
    }

    /// Analyzer with the default strategies for `config`
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        builder::AnalyzerBuilder::from_config(config).build()
    }

    pub fn new(
        calibrator: Box<dyn Calibrator>,
        segmenter: Box<dyn Segmenter>,
        measurer: Box<dyn ShapeMeasurer>,
        filter: PlausibilityFilter,
        classifier: Classifier,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            calibrator,
            segmenter,
            measurer,
            filter,
            classifier,
            aggregator,
        }
    }

    /// Run every stage on one image
    pub fn analyze(&self, image: &DynamicImage) -> Result<AnalysisResult> {
        let started = Instant::now();
        let gray = image.to_luma8();
        let (image_width, image_height) = gray.dimensions();

        // Step 1: Scale from the grid
        let calibration = self.calibrator.calibrate(&gray)?;
        debug!(pixels_per_mm = calibration.pixels_per_mm, "Calibration done");

        // Step 2: Seed regions
        let regions = self.segmenter.segment(&gray, &calibration)?;
        debug!(segmenter = self.segmenter.name(), regions = regions.len(), "Segmentation done");

        // Step 3: Ellipse per region; degenerate regions are skipped, not fatal
        let mut measurements = Vec::with_capacity(regions.len());
        let mut skipped_regions = 0;
        for region in &regions {
            match self.measurer.measure(region, &calibration) {
                Ok(m) => measurements.push(m),
                Err(SeedScanError::DegenerateRegion { label, reason }) => {
                    warn!(label, %reason, "Skipping region");
                    skipped_regions += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // Step 4: Plausibility bounds
        let (kept, excluded) = self.filter.apply(measurements);
        if kept.is_empty() {
            return Err(SeedScanError::NoSeedsDetected {
                regions_found: regions.len(),
                excluded: excluded.len(),
            });
        }

        // Step 5: Classes and summary
        let seeds = self.classifier.classify_all(kept);
        let summary = self.aggregator.summarize(&seeds);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            seeds = seeds.len(),
            excluded = excluded.len(),
            skipped_regions,
            pixels_per_mm = calibration.pixels_per_mm,
            processing_time_ms,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            calibration,
            seeds,
            summary,
            excluded,
            skipped_regions,
            image_width,
            image_height,
            processing_time_ms,
        })
    }

    /// Get information about the analyzer configuration
    pub fn info(&self) -> String {
        format!(
            "Analyzer: {} segmentation, length <= {} mm, area <= {} mm2",
            self.segmenter.name(),
            self.filter.config.max_seed_length_mm,
            self.filter.config.max_seed_area_mm2
        )
    }
}

/// Analyze one image with the default strategies
pub fn analyze(image: &DynamicImage, config: &AnalysisConfig) -> Result<AnalysisResult> {
    Analyzer::from_config(config)?.analyze(image)
}
