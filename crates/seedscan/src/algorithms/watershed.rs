//! Distance-transform watershed for splitting touching seeds.
//!
//! Markers are regional maxima of the exact distance map whose persistence
//! (peak distance minus the saddle at which the peak's basin meets a higher
//! one) clears a threshold. The global maximum of a component is always a
//! marker. Flooding then grows every marker in decreasing distance order.

use std::{cmp::Reverse, collections::BinaryHeap};

use tracing::debug;

use crate::{algorithms::distance::DistanceMap, types::Region};

const UNSEEN: usize = usize::MAX;

/// Minimum persistence for a distance peak to seed its own region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerCriteria {
    /// Absolute floor, in pixels
    pub min_prominence_px: f64,
    /// Fraction of the peak's own distance
    pub prominence_ratio: f64,
}

impl MarkerCriteria {
    fn accepts(&self, peak: f64, prominence: f64) -> bool {
        prominence > 0.0 && prominence >= self.min_prominence_px.max(self.prominence_ratio * peak)
    }
}

fn neighbours(index: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let (x, y) = ((index % width) as i64, (index / width) as i64);
    (-1i64..=1)
        .flat_map(|dy| (-1i64..=1).map(move |dx| (dx, dy)))
        .filter(|&d| d != (0, 0))
        .filter_map(move |(dx, dy)| {
            let (nx, ny) = (x + dx, y + dy);
            (nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64)
                .then(|| ny as usize * width + nx as usize)
        })
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Marker pixel indices (row-major), sorted by row then column
pub fn find_markers(distance: &DistanceMap, criteria: &MarkerCriteria) -> Vec<usize> {
    let (w, h) = distance.dimensions();
    let (w, h) = (w as usize, h as usize);
    let d = distance.as_slice();

    let mut order: Vec<usize> = (0..d.len()).filter(|&i| d[i] > 0).collect();
    order.sort_by(|&a, &b| d[b].cmp(&d[a]).then(a.cmp(&b)));
    // Position in the sweep; earlier means higher (ties by index)
    let mut rank = vec![usize::MAX; d.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    let mut parent = vec![UNSEEN; d.len()];
    let mut peak = vec![0usize; d.len()];
    let mut markers = Vec::new();

    for &p in &order {
        parent[p] = p;
        peak[p] = p;
        for q in neighbours(p, w, h) {
            if parent[q] == UNSEEN {
                continue;
            }
            let (rp, rq) = (find(&mut parent, p), find(&mut parent, q));
            if rp == rq {
                continue;
            }
            let (keep, die) = if rank[peak[rp]] < rank[peak[rq]] { (rp, rq) } else { (rq, rp) };
            let peak_distance = (d[peak[die]] as f64).sqrt();
            let saddle = (d[p] as f64).sqrt();
            if criteria.accepts(peak_distance, peak_distance - saddle) {
                markers.push(peak[die]);
            }
            parent[die] = keep;
        }
    }

    for &p in &order {
        if find(&mut parent, p) == p {
            markers.push(peak[p]);
        }
    }

    markers.sort_unstable();
    markers.dedup();
    markers
}

/// Grow markers over the foreground of `distance`; returns per-pixel labels
/// (0 = background, k = k-th marker)
pub fn flood(distance: &DistanceMap, markers: &[usize]) -> Vec<u32> {
    let (w, h) = distance.dimensions();
    let (w, h) = (w as usize, h as usize);
    let d = distance.as_slice();

    let mut labels = vec![0u32; d.len()];
    let mut queue = BinaryHeap::new();
    for (k, &m) in markers.iter().enumerate() {
        labels[m] = k as u32 + 1;
        queue.push((d[m], Reverse(m)));
    }

    while let Some((_, Reverse(p))) = queue.pop() {
        let label = labels[p];
        for q in neighbours(p, w, h) {
            if d[q] > 0 && labels[q] == 0 {
                labels[q] = label;
                queue.push((d[q], Reverse(q)));
            }
        }
    }
    labels
}

/// Split a region along the watershed lines of its distance map.
///
/// Returns the region unchanged when fewer than two markers qualify.
pub fn split_region(region: &Region, criteria: &MarkerCriteria) -> Vec<Region> {
    let distance = DistanceMap::euclidean(&region.mask);
    let markers = find_markers(&distance, criteria);
    if markers.len() < 2 {
        debug!(label = region.label, markers = markers.len(), "Watershed found nothing to split");
        return vec![region.clone()];
    }

    let labels = flood(&distance, &markers);
    let width = region.mask.width() as usize;
    let [ox, oy] = region.offset;

    let mut pieces: Vec<Vec<[u32; 2]>> = vec![Vec::new(); markers.len()];
    for (i, &label) in labels.iter().enumerate() {
        if label > 0 {
            let (x, y) = ((i % width) as i64 + ox, (i / width) as i64 + oy);
            pieces[label as usize - 1].push([x as u32, y as u32]);
        }
    }

    debug!(label = region.label, pieces = pieces.len(), "Watershed split region");
    pieces
        .iter()
        .filter_map(|px| Region::from_pixels(region.label, px))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discs(discs: &[(f64, f64, f64)]) -> Region {
        let mut pixels = Vec::new();
        for y in 0..200u32 {
            for x in 0..200u32 {
                let inside = discs.iter().any(|&(cx, cy, r)| {
                    let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                    dx * dx + dy * dy <= r * r
                });
                if inside {
                    pixels.push([x, y]);
                }
            }
        }
        Region::from_pixels(1, &pixels).unwrap()
    }

    const CRITERIA: MarkerCriteria = MarkerCriteria {
        min_prominence_px: 3.0,
        prominence_ratio: 0.2,
    };

    #[test]
    fn single_disc_is_not_split() {
        let region = discs(&[(100.0, 100.0, 30.0)]);
        let pieces = split_region(&region, &CRITERIA);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], region);
    }

    #[test]
    fn equal_touching_discs_split_in_two_halves() {
        let region = discs(&[(70.0, 100.0, 30.0), (120.0, 100.0, 30.0)]);
        let mut pieces = split_region(&region, &CRITERIA);
        assert_eq!(pieces.len(), 2);

        pieces.sort_by(|a, b| a.centroid[0].total_cmp(&b.centroid[0]));
        assert_eq!(pieces[0].area_px + pieces[1].area_px, region.area_px);
        let diff = pieces[0].area_px.abs_diff(pieces[1].area_px) as f64;
        assert!(diff / region.area_px as f64 <= 0.05);
        assert!((pieces[0].centroid[0] - 70.0).abs() < 4.0);
        assert!((pieces[1].centroid[0] - 120.0).abs() < 4.0);
    }

    #[test]
    fn unequal_touching_discs_keep_the_small_one() {
        let region = discs(&[(70.0, 100.0, 30.0), (110.0, 100.0, 15.0)]);
        let mut pieces = split_region(&region, &CRITERIA);
        assert_eq!(pieces.len(), 2);

        pieces.sort_by_key(|p| p.area_px);
        let small = pieces[0].area_px as f64;
        let expected = std::f64::consts::PI * 15.0 * 15.0;
        assert!((small - expected).abs() / expected < 0.25, "small piece area {small}");
        assert!((pieces[0].centroid[0] - 110.0).abs() < 4.0);
    }

    #[test]
    fn strict_criteria_leave_touching_discs_whole() {
        let region = discs(&[(70.0, 100.0, 30.0), (120.0, 100.0, 30.0)]);
        let strict = MarkerCriteria { min_prominence_px: 20.0, prominence_ratio: 0.0 };
        assert_eq!(split_region(&region, &strict).len(), 1);
    }

    #[test]
    fn markers_are_row_major_sorted() {
        let region = discs(&[(120.0, 60.0, 20.0), (60.0, 140.0, 20.0), (60.0, 60.0, 20.0)]);
        let distance = DistanceMap::euclidean(&region.mask);
        let markers = find_markers(&distance, &CRITERIA);
        assert_eq!(markers.len(), 3);
        assert!(markers.windows(2).all(|m| m[0] < m[1]));
    }
}
