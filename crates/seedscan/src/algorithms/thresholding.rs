use image::{GrayImage, Luma};
use imageproc::{
    contrast::otsu_level,
    distance_transform::Norm,
    filter::{box_filter, gaussian_blur_f32},
    morphology,
};
use tracing::debug;

use crate::config::{SegmentationConfig, ThresholdMerge};

/// Mask value for foreground pixels
pub const FOREGROUND: u8 = 255;

fn binary(image: &GrayImage, predicate: impl Fn(u32, u32, u8) -> bool) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0];
        Luma([if predicate(x, y, v) { FOREGROUND } else { 0 }])
    })
}

/// Gaussian smoothing; a non-positive sigma returns an unchanged copy
pub fn smooth(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(image, sigma)
    } else {
        image.clone()
    }
}

/// Otsu threshold; seeds are darker than paper, so pixels at or below the
/// level are foreground
pub fn global_mask(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    debug!(level, "Otsu level");
    binary(image, |_, _, v| v <= level)
}

/// Local-mean threshold: foreground where a pixel is darker than the mean of
/// its `(2r + 1)²` window by more than `offset`
pub fn adaptive_mask(image: &GrayImage, radius: u32, offset: u8) -> GrayImage {
    let mean = box_filter(image, radius, radius);
    binary(image, |x, y, v| {
        (v as i16) < mean.get_pixel(x, y)[0] as i16 - offset as i16
    })
}

/// Combine the global and adaptive masks under the given policy
pub fn merge_masks(global: &GrayImage, adaptive: &GrayImage, policy: ThresholdMerge) -> GrayImage {
    binary(global, |x, y, g| {
        let g = g > 0;
        let a = adaptive.get_pixel(x, y)[0] > 0;
        match policy {
            ThresholdMerge::Union => g || a,
            ThresholdMerge::Intersection => g && a,
            ThresholdMerge::GlobalOnly => g,
            ThresholdMerge::AdaptiveOnly => a,
        }
    })
}

/// Clear mask pixels whose source intensity is brighter than `cutoff`
pub fn suppress_paper(mask: &mut GrayImage, image: &GrayImage, cutoff: u8) {
    for (x, y, p) in mask.enumerate_pixels_mut() {
        if image.get_pixel(x, y)[0] > cutoff {
            p[0] = 0;
        }
    }
}

/// Opening removes thin structures (grid-line fragments), closing fills pinholes
pub fn clean(mask: GrayImage, open_radius: u8, close_radius: u8) -> GrayImage {
    let opened = if open_radius > 0 {
        morphology::open(&mask, Norm::L1, open_radius)
    } else {
        mask
    };
    if close_radius > 0 {
        morphology::close(&opened, Norm::L1, close_radius)
    } else {
        opened
    }
}

/// Builds the binary seed mask from a grayscale photograph
#[derive(Debug, Clone)]
pub struct ForegroundExtractor {
    pub config: SegmentationConfig,
}

impl ForegroundExtractor {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, image: &GrayImage) -> GrayImage {
        let cfg = &self.config;
        let smoothed = smooth(image, cfg.blur_sigma);

        let global = global_mask(&smoothed);
        let adaptive = adaptive_mask(&smoothed, cfg.adaptive_radius, cfg.adaptive_offset);
        let mut mask = merge_masks(&global, &adaptive, cfg.threshold_merge);
        suppress_paper(&mut mask, &smoothed, cfg.paper_cutoff);

        clean(mask, cfg.open_radius, cfg.close_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] > 0).count()
    }

    fn paper_with_square(value: u8) -> GrayImage {
        let mut img = GrayImage::from_pixel(60, 60, Luma([250u8]));
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([value]));
            }
        }
        img
    }

    #[test]
    fn global_mask_selects_dark_square() {
        let mask = global_mask(&paper_with_square(60));
        assert_eq!(count(&mask), 400);
        assert_eq!(mask.get_pixel(30, 30)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn adaptive_mask_picks_thin_line_but_not_flat_paper() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([255u8]));
        for y in 0..40 {
            img.put_pixel(20, y, Luma([200u8]));
        }
        let mask = adaptive_mask(&img, 5, 4);
        assert_eq!(mask.get_pixel(20, 10)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(19, 10)[0], 0);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn merge_policies() {
        let mut g = GrayImage::new(2, 1);
        let mut a = GrayImage::new(2, 1);
        g.put_pixel(0, 0, Luma([FOREGROUND]));
        a.put_pixel(0, 0, Luma([FOREGROUND]));
        a.put_pixel(1, 0, Luma([FOREGROUND]));

        assert_eq!(count(&merge_masks(&g, &a, ThresholdMerge::Union)), 2);
        assert_eq!(count(&merge_masks(&g, &a, ThresholdMerge::Intersection)), 1);
        assert_eq!(count(&merge_masks(&g, &a, ThresholdMerge::GlobalOnly)), 1);
        assert_eq!(count(&merge_masks(&g, &a, ThresholdMerge::AdaptiveOnly)), 2);
    }

    #[test]
    fn paper_cutoff_clears_light_pixels() {
        let img = paper_with_square(100);
        let mut mask = GrayImage::from_pixel(60, 60, Luma([FOREGROUND]));
        suppress_paper(&mut mask, &img, 180);
        assert_eq!(count(&mask), 400);
    }

    #[test]
    fn opening_removes_lines_and_keeps_blobs() {
        let mut mask = GrayImage::new(60, 60);
        for y in 0..60 {
            mask.put_pixel(5, y, Luma([FOREGROUND]));
            mask.put_pixel(6, y, Luma([FOREGROUND]));
        }
        for y in 20..40 {
            for x in 20..40 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        let cleaned = clean(mask, 2, 2);
        assert_eq!(cleaned.get_pixel(5, 10)[0], 0);
        assert_eq!(cleaned.get_pixel(30, 30)[0], FOREGROUND);
    }

    #[test]
    fn extractor_ignores_light_grid() {
        let mut img = GrayImage::from_pixel(60, 60, Luma([250u8]));
        for i in (0..60).step_by(10) {
            for j in 0..60 {
                img.put_pixel(i, j, Luma([200u8]));
                img.put_pixel(j, i, Luma([200u8]));
            }
        }
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([100u8]));
            }
        }
        let mask = ForegroundExtractor::new(SegmentationConfig::default()).extract(&img);
        assert_eq!(mask.get_pixel(30, 30)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(10, 50)[0], 0);
        assert_eq!(mask.get_pixel(50, 5)[0], 0);
    }
}
