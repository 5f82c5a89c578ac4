use crate::{
    algorithms::{extraction::outer_boundary, moments::Ellipse},
    error::{Result, SeedScanError},
    traits::ShapeMeasurer,
    types::{CalibrationResult, Region, SeedMeasurement},
};

/// Boundary points run through pixel centres, half a pixel inside the true
/// edge on each side
const PIXEL_CENTRE_INSET: f64 = 1.0;

/// Equal-moment ellipse of the traced outer boundary
#[derive(Debug, Clone)]
pub struct EllipseMeasurer {
    pub min_boundary_points: usize,
}

impl Default for EllipseMeasurer {
    fn default() -> Self {
        Self { min_boundary_points: 5 }
    }
}

impl EllipseMeasurer {
    /// Fitted ellipse in image pixel coordinates
    pub fn fit(&self, region: &Region) -> Result<Ellipse> {
        let boundary = outer_boundary(region);
        if boundary.len() < self.min_boundary_points {
            return Err(SeedScanError::DegenerateRegion {
                label: region.label,
                reason: format!(
                    "{} boundary points, need at least {}",
                    boundary.len(),
                    self.min_boundary_points
                ),
            });
        }

        Ellipse::from_polygon(&boundary)
            .map(|e| e.widened(PIXEL_CENTRE_INSET))
            .ok_or_else(|| SeedScanError::DegenerateRegion {
                label: region.label,
                reason: "boundary encloses no area".into(),
            })
    }
}

impl ShapeMeasurer for EllipseMeasurer {
    fn measure(&self, region: &Region, calibration: &CalibrationResult) -> Result<SeedMeasurement> {
        let ellipse = self.fit(region)?;
        let major_axis_mm = calibration.px_to_mm(ellipse.major_axis);
        let minor_axis_mm = calibration.px_to_mm(ellipse.minor_axis);

        Ok(SeedMeasurement {
            id: region.label,
            center_px: ellipse.center,
            major_axis_mm,
            minor_axis_mm,
            area_mm2: calibration.px2_to_mm2(ellipse.area()),
            aspect_ratio: major_axis_mm / minor_axis_mm,
            orientation_deg: ellipse.angle.to_degrees(),
        })
    }
}
