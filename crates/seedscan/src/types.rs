use image::{GrayImage, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// Pixel-to-millimetre calibration derived from the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalibrationResult {
    /// Scale factor, always positive
    pub pixels_per_mm: f64,
    /// Consistent grid lines used for the estimate (both directions)
    pub grid_lines_detected: usize,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    /// Spacing between horizontal lines, in pixels
    pub horizontal_spacing_px: f64,
    /// Spacing between vertical lines, in pixels
    pub vertical_spacing_px: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

impl CalibrationResult {
    pub fn px_to_mm(&self, px: f64) -> f64 {
        px / self.pixels_per_mm
    }

    pub fn px2_to_mm2(&self, px2: f64) -> f64 {
        px2 / (self.pixels_per_mm * self.pixels_per_mm)
    }

    pub fn mm2_to_px2(&self, mm2: f64) -> f64 {
        mm2 * self.pixels_per_mm * self.pixels_per_mm
    }
}

/// One connected foreground component.
///
/// The mask is cropped to the component's bounding box plus a one-pixel
/// background margin; `offset` is the image position of mask pixel (0, 0).
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub label: u32,
    pub offset: [i64; 2],
    pub mask: GrayImage,
    pub area_px: usize,
    pub centroid: [f64; 2],
}

impl Region {
    /// Build a region from image-space pixel coordinates
    pub fn from_pixels(label: u32, pixels: &[[u32; 2]]) -> Option<Self> {
        let first = pixels.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first[0], first[1], first[0], first[1]);
        let (mut sum_x, mut sum_y) = (0.0f64, 0.0f64);
        for &[x, y] in pixels {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            sum_x += x as f64;
            sum_y += y as f64;
        }

        let mut mask = GrayImage::new(max_x - min_x + 3, max_y - min_y + 3);
        for &[x, y] in pixels {
            mask.put_pixel(x - min_x + 1, y - min_y + 1, Luma([255u8]));
        }
        let area_px = mask.pixels().filter(|p| p[0] > 0).count();
        let n = pixels.len() as f64;

        Some(Self {
            label,
            offset: [min_x as i64 - 1, min_y as i64 - 1],
            mask,
            area_px,
            centroid: [sum_x / n, sum_y / n],
        })
    }

    /// Image-space coordinates of every foreground pixel, row-major
    pub fn pixels(&self) -> impl Iterator<Item = [i64; 2]> + '_ {
        let [ox, oy] = self.offset;
        self.mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(move |(x, y, _)| [x as i64 + ox, y as i64 + oy])
    }

    /// Inclusive bounding box `(min, max)` in image coordinates
    pub fn bounding_box(&self) -> ([i64; 2], [i64; 2]) {
        let [ox, oy] = self.offset;
        (
            [ox + 1, oy + 1],
            [ox + self.mask.width() as i64 - 2, oy + self.mask.height() as i64 - 2],
        )
    }
}

/// Geometry of one seed, in millimetres unless stated otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeedMeasurement {
    pub id: u32,
    /// Ellipse centre in image pixels
    pub center_px: [f64; 2],
    pub major_axis_mm: f64,
    pub minor_axis_mm: f64,
    pub area_mm2: f64,
    /// `major_axis_mm / minor_axis_mm`, never below 1
    pub aspect_ratio: f64,
    /// Angle of the major axis in degrees, clockwise from the image x axis
    pub orientation_deg: f64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShapeClass {
    Circular,
    Oval,
    Elongated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifiedSeed {
    #[serde(flatten)]
    pub measurement: SeedMeasurement,
    pub shape: ShapeClass,
}

/// Population statistics of one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DimensionStats {
    pub mean_mm: f64,
    pub min_mm: f64,
    pub max_mm: f64,
    /// Population (not sample) standard deviation
    pub std_mm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeDistribution {
    pub circular: usize,
    pub oval: usize,
    pub elongated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SizeRatio {
    /// Seeds at or above the large percentile by area
    pub large_count: usize,
    /// Seeds at or below the small percentile by area
    pub small_count: usize,
    /// `large_count / small_count`; absent when there are no small seeds
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSummary {
    pub count: usize,
    pub length: Option<DimensionStats>,
    pub width: Option<DimensionStats>,
    pub shape_distribution: ShapeDistribution,
    pub size_ratio: SizeRatio,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExclusionReason {
    /// Major axis above the single-seed length bound
    TooLong,
    /// Area above the single-seed area bound
    TooLarge,
}

/// A measurement dropped by the plausibility filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExcludedSeed {
    pub measurement: SeedMeasurement,
    pub reason: ExclusionReason,
}

/// Everything one `analyze` call produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub calibration: CalibrationResult,
    pub seeds: Vec<ClassifiedSeed>,
    pub summary: AnalysisSummary,
    pub excluded: Vec<ExcludedSeed>,
    /// Regions that could not be fitted with an ellipse
    pub skipped_regions: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_from_pixels_pads_mask() {
        let pixels = [[10, 20], [11, 20], [10, 21], [11, 21], [12, 21]];
        let region = Region::from_pixels(7, &pixels).unwrap();

        assert_eq!(region.offset, [9, 19]);
        assert_eq!(region.mask.dimensions(), (5, 4));
        assert_eq!(region.area_px, 5);
        assert_eq!(region.bounding_box(), ([10, 20], [12, 21]));
        assert!((region.centroid[0] - 10.8).abs() < 1e-9);
        assert!((region.centroid[1] - 20.6).abs() < 1e-9);

        let mut back: Vec<[i64; 2]> = region.pixels().collect();
        back.sort();
        let mut expected: Vec<[i64; 2]> = pixels.iter().map(|&[x, y]| [x as i64, y as i64]).collect();
        expected.sort();
        assert_eq!(back, expected);
    }

    #[test]
    fn empty_pixel_list_is_not_a_region() {
        assert!(Region::from_pixels(1, &[]).is_none());
    }

    #[test]
    fn classified_seed_serializes_flat() {
        let seed = ClassifiedSeed {
            measurement: SeedMeasurement {
                id: 3,
                center_px: [1.0, 2.0],
                major_axis_mm: 2.0,
                minor_axis_mm: 1.0,
                area_mm2: 1.57,
                aspect_ratio: 2.0,
                orientation_deg: 0.0,
            },
            shape: ShapeClass::Elongated,
        };
        let json = serde_json::to_value(&seed).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["shape"], "elongated");
    }
}
