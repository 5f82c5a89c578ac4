use image::{GrayImage, Luma};
use imageproc::{distance_transform::euclidean_squared_distance_transform, map::map_colors};

/// Exact squared Euclidean distance from each foreground pixel to the nearest
/// background pixel.
///
/// Squared distances between pixel centres are integers, so the values are
/// stored as `u32` and order exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMap {
    width: u32,
    height: u32,
    squared: Vec<u32>,
}

impl DistanceMap {
    pub fn euclidean(mask: &GrayImage) -> Self {
        let (width, height) = mask.dimensions();
        // The transform measures distance to the nearest non-zero pixel
        let background = map_colors(mask, |p| Luma([if p[0] > 0 { 0u8 } else { 255 }]));
        let squared = euclidean_squared_distance_transform(&background)
            .pixels()
            .map(|p| p[0].round() as u32)
            .collect();
        Self { width, height, squared }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Squared distance at `(x, y)`
    pub fn squared(&self, x: u32, y: u32) -> u32 {
        self.squared[(y * self.width + x) as usize]
    }

    /// Distance at `(x, y)` in pixels
    pub fn distance(&self, x: u32, y: u32) -> f64 {
        (self.squared(x, y) as f64).sqrt()
    }

    /// Row-major squared distances
    pub fn as_slice(&self) -> &[u32] {
        &self.squared
    }

    pub fn max_distance(&self) -> f64 {
        self.squared.iter().copied().max().map_or(0.0, |d| (d as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn brute_force(mask: &GrayImage, x: u32, y: u32) -> u32 {
        if mask.get_pixel(x, y)[0] == 0 {
            return 0;
        }
        mask.enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 0)
            .map(|(bx, by, _)| {
                let dx = bx as i64 - x as i64;
                let dy = by as i64 - y as i64;
                (dx * dx + dy * dy) as u32
            })
            .min()
            .unwrap()
    }

    #[test]
    fn square_block_center() {
        let mut mask = GrayImage::new(9, 9);
        for y in 2..7 {
            for x in 2..7 {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
        let dt = DistanceMap::euclidean(&mask);
        assert_eq!(dt.squared(4, 4), 9);
        assert_eq!(dt.squared(2, 2), 1);
        assert_eq!(dt.squared(0, 0), 0);
        assert_eq!(dt.max_distance(), 3.0);
    }

    #[test]
    fn matches_brute_force_on_irregular_shape() {
        let mut mask = GrayImage::new(23, 17);
        for y in 1..16u32 {
            for x in 1..22u32 {
                let dx = x as f64 - 8.0;
                let dy = y as f64 - 8.0;
                let in_disc = dx * dx + dy * dy <= 36.0;
                let in_bar = (3..14).contains(&y) && (12..21).contains(&x) && x + y != 24;
                if in_disc || in_bar {
                    mask.put_pixel(x, y, Luma([255u8]));
                }
            }
        }
        let dt = DistanceMap::euclidean(&mask);
        for y in 0..17 {
            for x in 0..23 {
                assert_eq!(dt.squared(x, y), brute_force(&mask, x, y), "at ({x}, {y})");
            }
        }
    }
}
