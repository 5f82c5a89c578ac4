//! # Seed Measurement Library
//!
//! Measures seeds photographed on millimetre grid paper. The grid gives the
//! pixel-to-millimetre scale; seeds are thresholded out of the paper, touching
//! seeds are split with a distance-transform watershed, and each seed gets an
//! equal-moment ellipse, a shape class and a place in population statistics.
//!
//! ## Core Features
//!
//! - **Grid calibration**: Hough line families, lattice fit, failure instead of a guessed scale
//! - **Segmentation**: Otsu + adaptive thresholds, persistence-filtered watershed markers
//! - **Trait-based stages**: swap calibrator, segmenter or measurer through the builder
//! - **Bounded service**: run analyses on a fixed-size worker pool with backpressure
//! - **GeoJSON export**: fitted ellipses with typed seed properties
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seedscan::{analyze, AnalysisConfig};
//!
//! let image = image::open("seeds.jpg")?;
//! let result = analyze(&image, &AnalysisConfig::default())?;
//! println!("{} seeds at {:.1} px/mm", result.seeds.len(), result.calibration.pixels_per_mm);
//!
//! result.save_geojson("seeds.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Analyzer
//!
//! ```rust,no_run
//! use seedscan::{Analyzer, WatershedSegmenter, SegmentationConfig, PlausibilityConfig};
//!
//! let analyzer = Analyzer::builder()
//!     .set_segmenter(WatershedSegmenter::new(
//!         SegmentationConfig { min_solidity: 0.8, ..Default::default() },
//!         PlausibilityConfig::default(),
//!     ))
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod config;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod filter;
pub mod classify;
pub mod pipeline;
pub mod service;
pub mod io;
pub mod fixtures;

// Re-exports for convenience
pub use error::{Result, SeedScanError};
pub use config::{
    AnalysisConfig, CalibrationConfig, ClassificationConfig, PlausibilityConfig,
    SegmentationConfig, StatisticsConfig, ThresholdMerge,
};
pub use types::*;
pub use traits::*;
pub use algorithms::{EllipseMeasurer, HoughGridCalibrator, WatershedSegmenter};
pub use filter::PlausibilityFilter;
pub use classify::{Aggregator, Classifier};
pub use pipeline::{analyze, builder::AnalyzerBuilder, Analyzer};
pub use service::{AnalysisService, Backpressure, ServiceConfig};
pub use io::{read_seed_properties, SeedProperties, TypedFeature};
