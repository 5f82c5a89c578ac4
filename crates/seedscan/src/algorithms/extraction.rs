use geo::{Area, ConvexHull};
use geo_types::{LineString, Polygon};
use imageproc::contours::{find_contours, BorderType};

use crate::types::Region;

/// Outer boundary of a region in image coordinates.
///
/// Points sit on the centres of the region's edge pixels. When the mask holds
/// several outer borders the longest one wins.
pub fn outer_boundary(region: &Region) -> Vec<[f64; 2]> {
    let [ox, oy] = region.offset;
    find_contours::<i32>(&region.mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .max_by_key(|c| c.points.len())
        .map(|c| {
            c.points
                .iter()
                .map(|p| [(p.x as i64 + ox) as f64, (p.y as i64 + oy) as f64])
                .collect()
        })
        .unwrap_or_default()
}

/// Closed polygon through the given boundary points
pub fn boundary_polygon(points: &[[f64; 2]]) -> Polygon<f64> {
    let ring: LineString<f64> = points.iter().map(|&[x, y]| (x, y)).collect();
    Polygon::new(ring, vec![])
}

/// Polygon area over convex hull area, in `[0, 1]`; 0 for degenerate input
pub fn solidity(points: &[[f64; 2]]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let polygon = boundary_polygon(points);
    let hull_area = polygon.convex_hull().unsigned_area();
    if hull_area <= f64::EPSILON {
        return 0.0;
    }
    (polygon.unsigned_area() / hull_area).min(1.0)
}
