//! Synthetic grid-paper photographs with known geometry.
//!
//! Used by the test suites and by `seed_cli fixture` to produce images whose
//! true scale and seed sizes are known exactly.

use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// One filled ellipse, in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSeed {
    pub center: [f64; 2],
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Major axis angle in degrees, clockwise from +x
    pub angle_deg: f64,
}

impl SyntheticSeed {
    pub fn disc(cx: f64, cy: f64, radius: f64) -> Self {
        Self {
            center: [cx, cy],
            semi_major: radius,
            semi_minor: radius,
            angle_deg: 0.0,
        }
    }

    pub fn ellipse(cx: f64, cy: f64, semi_major: f64, semi_minor: f64, angle_deg: f64) -> Self {
        Self {
            center: [cx, cy],
            semi_major,
            semi_minor,
            angle_deg,
        }
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        let (sin, cos) = self.angle_deg.to_radians().sin_cos();
        let (dx, dy) = (x - self.center[0], y - self.center[1]);
        let u = dx * cos + dy * sin;
        let v = -dx * sin + dy * cos;
        (u / self.semi_major).powi(2) + (v / self.semi_minor).powi(2) <= 1.0
    }
}

/// Grid paper with seeds lying on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSample {
    pub width: u32,
    pub height: u32,
    /// Distance between vertical lines and between horizontal lines, in
    /// pixels; `None` draws no grid
    pub grid_spacing_px: Option<[f64; 2]>,
    pub paper_tone: u8,
    pub line_tone: u8,
    pub seed_color: [u8; 3],
    pub seeds: Vec<SyntheticSeed>,
}

impl SyntheticSample {
    /// White paper with a 1 px light-gray square grid
    pub fn new(width: u32, height: u32, grid_spacing_px: f64) -> Self {
        Self {
            width,
            height,
            grid_spacing_px: Some([grid_spacing_px, grid_spacing_px]),
            paper_tone: 255,
            line_tone: 200,
            seed_color: [150, 100, 50],
            seeds: Vec::new(),
        }
    }

    /// Blank paper
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            grid_spacing_px: None,
            ..Self::new(width, height, 1.0)
        }
    }

    pub fn with_grid_spacing(mut self, vertical_lines_px: f64, horizontal_lines_px: f64) -> Self {
        self.grid_spacing_px = Some([vertical_lines_px, horizontal_lines_px]);
        self
    }

    pub fn with_seed(mut self, seed: SyntheticSeed) -> Self {
        self.seeds.push(seed);
        self
    }

    pub fn with_disc(self, cx: f64, cy: f64, radius: f64) -> Self {
        self.with_seed(SyntheticSeed::disc(cx, cy, radius))
    }

    pub fn render(&self) -> RgbImage {
        let paper = Rgb([self.paper_tone; 3]);
        let line = Rgb([self.line_tone; 3]);
        let mut img = RgbImage::from_pixel(self.width, self.height, paper);

        if let Some([sx, sy]) = self.grid_spacing_px {
            for x in grid_positions(sx, self.width) {
                for y in 0..self.height {
                    img.put_pixel(x, y, line);
                }
            }
            for y in grid_positions(sy, self.height) {
                for x in 0..self.width {
                    img.put_pixel(x, y, line);
                }
            }
        }

        let color = Rgb(self.seed_color);
        for (x, y, p) in img.enumerate_pixels_mut() {
            if self.seeds.iter().any(|s| s.contains(x as f64, y as f64)) {
                *p = color;
            }
        }
        img
    }

    pub fn render_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.render())
    }
}

fn grid_positions(spacing: f64, limit: u32) -> Vec<u32> {
    if !(spacing >= 1.0) {
        return Vec::new();
    }
    (0..)
        .map(|k| (k as f64 * spacing).round())
        .take_while(|&p| p < limit as f64)
        .map(|p| p as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_lines_land_on_rounded_multiples() {
        assert_eq!(grid_positions(12.5, 60), vec![0, 13, 25, 38, 50]);
        assert!(grid_positions(0.0, 60).is_empty());
    }

    #[test]
    fn render_draws_grid_and_seed() {
        let img = SyntheticSample::new(100, 100, 20.0)
            .with_disc(50.0, 50.0, 8.0)
            .render();
        assert_eq!(img.get_pixel(20, 7), &Rgb([200, 200, 200]));
        assert_eq!(img.get_pixel(7, 7), &Rgb([255, 255, 255]));
        assert_eq!(img.get_pixel(50, 50), &Rgb([150, 100, 50]));
        assert_eq!(img.get_pixel(50, 59), &Rgb([255, 255, 255]));
    }

    #[test]
    fn rotated_ellipse_follows_angle() {
        let seed = SyntheticSeed::ellipse(0.0, 0.0, 10.0, 3.0, 90.0);
        assert!(seed.contains(0.0, 9.0));
        assert!(!seed.contains(9.0, 0.0));
    }
}
