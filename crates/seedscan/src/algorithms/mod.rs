pub mod calibration;
pub mod distance;
pub mod extraction;
pub mod labelling;
pub mod measurement;
pub mod moments;
pub mod segmentation;
pub mod thresholding;
pub mod watershed;

pub use calibration::HoughGridCalibrator;
pub use distance::DistanceMap;
pub use measurement::EllipseMeasurer;
pub use moments::Ellipse;
pub use segmentation::WatershedSegmenter;
pub use thresholding::ForegroundExtractor;
pub use watershed::MarkerCriteria;
