use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::types::Region;

/// Label 8-connected foreground components of a binary mask.
///
/// Labels follow the raster order of each component's first pixel.
pub fn label_regions(mask: &GrayImage) -> Vec<Region> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut pixels: Vec<Vec<[u32; 2]>> = Vec::new();
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p[0];
        if label == 0 {
            continue;
        }
        let index = (label - 1) as usize;
        if pixels.len() <= index {
            pixels.resize_with(index + 1, Vec::new);
        }
        pixels[index].push([x, y]);
    }

    pixels
        .iter()
        .enumerate()
        .filter_map(|(i, px)| Region::from_pixels(i as u32 + 1, px))
        .collect()
}

/// Sort regions top-to-bottom then left-to-right by centroid and relabel 1..n
pub fn order_regions(regions: &mut [Region]) {
    regions.sort_by(|a, b| {
        a.centroid[1]
            .total_cmp(&b.centroid[1])
            .then(a.centroid[0].total_cmp(&b.centroid[0]))
    });
    for (i, region) in regions.iter_mut().enumerate() {
        region.label = i as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
    }

    #[test]
    fn separate_blocks_become_separate_regions() {
        let mut mask = GrayImage::new(30, 30);
        fill(&mut mask, 2, 2, 6, 6);
        fill(&mut mask, 20, 3, 25, 8);
        fill(&mut mask, 10, 20, 12, 22);

        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 3);
        let mut areas: Vec<usize> = regions.iter().map(|r| r.area_px).collect();
        areas.sort();
        assert_eq!(areas, vec![4, 16, 25]);
    }

    #[test]
    fn diagonal_touch_is_connected() {
        let mut mask = GrayImage::new(10, 10);
        fill(&mut mask, 2, 2, 4, 4);
        fill(&mut mask, 4, 4, 6, 6);
        assert_eq!(label_regions(&mask).len(), 1);
    }

    #[test]
    fn ordering_is_by_centroid_row_then_column() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 30, 30, 34, 34);
        fill(&mut mask, 25, 2, 29, 6);
        fill(&mut mask, 2, 2, 6, 6);

        let mut regions = label_regions(&mask);
        order_regions(&mut regions);
        let centroids: Vec<[f64; 2]> = regions.iter().map(|r| r.centroid).collect();
        assert_eq!(centroids, vec![[3.5, 3.5], [26.5, 3.5], [31.5, 31.5]]);
        let labels: Vec<u32> = regions.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![1, 2, 3]);
    }
}
