use crate::{
    algorithms::{EllipseMeasurer, HoughGridCalibrator, WatershedSegmenter},
    classify::{Aggregator, Classifier},
    config::AnalysisConfig,
    error::Result,
    filter::PlausibilityFilter,
    pipeline::Analyzer,
    traits::{Calibrator, Segmenter, ShapeMeasurer},
};

/// Builder for creating analyzers with a fluent API
pub struct AnalyzerBuilder {
    config: AnalysisConfig,
    calibrator: Option<Box<dyn Calibrator>>,
    segmenter: Option<Box<dyn Segmenter>>,
    measurer: Option<Box<dyn ShapeMeasurer>>,
}

impl AnalyzerBuilder {
    /// Create a new builder with the default configuration
    pub fn new() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            config: config.clone(),
            calibrator: None,
            segmenter: None,
            measurer: None,
        }
    }

    /// Replace the configuration used for the default strategies and the
    /// filter, classifier and aggregator
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the calibrator (replaces the Hough grid calibrator)
    pub fn set_calibrator<C>(mut self, calibrator: C) -> Self
    where
        C: Calibrator + 'static,
    {
        self.calibrator = Some(Box::new(calibrator));
        self
    }

    /// Set the segmenter (replaces the watershed segmenter)
    pub fn set_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: Segmenter + 'static,
    {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    /// Set the shape measurer (replaces the ellipse measurer)
    pub fn set_measurer<M>(mut self, measurer: M) -> Self
    where
        M: ShapeMeasurer + 'static,
    {
        self.measurer = Some(Box::new(measurer));
        self
    }

    /// Validate the configuration and build, filling in default strategies
    pub fn build(self) -> Result<Analyzer> {
        let config = self.config;
        config.validate()?;

        let calibrator = self
            .calibrator
            .unwrap_or_else(|| Box::new(HoughGridCalibrator::new(config.calibration.clone())));
        let segmenter = self.segmenter.unwrap_or_else(|| {
            Box::new(WatershedSegmenter::new(
                config.segmentation.clone(),
                config.plausibility.clone(),
            ))
        });
        let measurer = self
            .measurer
            .unwrap_or_else(|| Box::new(EllipseMeasurer::default()));

        Ok(Analyzer::new(
            calibrator,
            segmenter,
            measurer,
            PlausibilityFilter::new(config.plausibility),
            Classifier::new(config.classification),
            Aggregator::new(config.statistics),
        ))
    }
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SeedScanError,
        fixtures::SyntheticSample,
        types::{CalibrationResult, Region},
    };
    use image::GrayImage;

    struct FixedScale(f64);

    impl Calibrator for FixedScale {
        fn calibrate(&self, _image: &GrayImage) -> Result<CalibrationResult> {
            Ok(CalibrationResult {
                pixels_per_mm: self.0,
                grid_lines_detected: 0,
                horizontal_lines: 0,
                vertical_lines: 0,
                horizontal_spacing_px: self.0,
                vertical_spacing_px: self.0,
                confidence: 1.0,
            })
        }
    }

    struct NothingFound;

    impl Segmenter for NothingFound {
        fn segment(&self, _image: &GrayImage, _calibration: &CalibrationResult) -> Result<Vec<Region>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "nothing"
        }
    }

    /// One disc of radius 15 px plus a two-pixel speck
    struct DiscAndSpeck;

    impl Segmenter for DiscAndSpeck {
        fn segment(&self, _image: &GrayImage, _calibration: &CalibrationResult) -> Result<Vec<Region>> {
            let disc: Vec<[u32; 2]> = (0..60u32)
                .flat_map(|y| (0..60u32).map(move |x| [x, y]))
                .filter(|&[x, y]| (x as f64 - 30.0).powi(2) + (y as f64 - 30.0).powi(2) <= 225.0)
                .collect();
            Ok([Region::from_pixels(1, &disc), Region::from_pixels(2, &[[80, 80], [81, 80]])]
                .into_iter()
                .flatten()
                .collect())
        }

        fn name(&self) -> &'static str {
            "disc-and-speck"
        }
    }

    #[test]
    fn custom_calibrator_replaces_grid_detection() {
        let analyzer = Analyzer::builder().set_calibrator(FixedScale(10.0)).build().unwrap();
        let image = SyntheticSample::blank(200, 200).with_disc(100.0, 100.0, 15.0).render_dynamic();
        let result = analyzer.analyze(&image).unwrap();
        assert_eq!(result.calibration.pixels_per_mm, 10.0);
        assert_eq!(result.seeds.len(), 1);
        assert!((result.seeds[0].measurement.major_axis_mm - 3.0).abs() < 0.15);
    }

    #[test]
    fn custom_segmenter_is_used() {
        let analyzer = Analyzer::builder()
            .set_calibrator(FixedScale(10.0))
            .set_segmenter(NothingFound)
            .build()
            .unwrap();
        assert!(analyzer.info().contains("nothing"));
        let err = analyzer.analyze(&SyntheticSample::blank(50, 50).render_dynamic()).unwrap_err();
        assert!(matches!(err, SeedScanError::NoSeedsDetected { regions_found: 0, .. }));
    }

    #[test]
    fn build_validates_config() {
        let mut config = AnalysisConfig::default();
        config.statistics.small_percentile = 90.0;
        assert!(AnalyzerBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn degenerate_regions_are_skipped_not_fatal() {
        let analyzer = Analyzer::builder()
            .set_calibrator(FixedScale(10.0))
            .set_segmenter(DiscAndSpeck)
            .build()
            .unwrap();
        let result = analyzer.analyze(&SyntheticSample::blank(100, 100).render_dynamic()).unwrap();
        assert_eq!(result.seeds.len(), 1);
        assert_eq!(result.skipped_regions, 1);
        assert!(result.excluded.is_empty());
        assert!((result.seeds[0].measurement.major_axis_mm - 3.0).abs() < 0.15);
    }
}
