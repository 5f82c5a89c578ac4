//! Millimetre-grid calibration from straight-line Hough peaks.

use std::collections::BTreeMap;

use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use tracing::debug;

use crate::{
    algorithms::thresholding::{adaptive_mask, smooth},
    config::CalibrationConfig,
    error::{Result, SeedScanError},
    traits::Calibrator,
    types::CalibrationResult,
};

/// Lines whose lattice residual exceeds this fraction of the spacing are
/// inconsistent
const MAX_RESIDUAL: f64 = 0.25;
const REFINEMENT_ROUNDS: usize = 4;

/// Lines of one orientation, as signed offsets from the image centre
#[derive(Debug, Clone, PartialEq)]
struct LineFamily {
    angle_deg: i64,
    raw_lines: usize,
    offsets: Vec<f64>,
}

/// Regular spacing fitted to a line family
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lattice {
    spacing: f64,
    lines: usize,
}

/// Grid calibrator using `imageproc`'s Hough transform
#[derive(Debug, Clone, Default)]
pub struct HoughGridCalibrator {
    pub config: CalibrationConfig,
}

impl HoughGridCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    fn families(&self, lines: &[PolarLine], width: u32, height: u32) -> (LineFamily, LineFamily) {
        let tolerance = self.config.axis_tolerance_deg as i64;
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);

        let mut vertical = Vec::new();
        let mut horizontal = Vec::new();
        for line in lines {
            let (mut angle, mut r) = (line.angle_in_degrees as i64, line.r as f64);
            if angle >= 180 - tolerance {
                angle -= 180;
                r = -r;
            }
            let (sin, cos) = (angle as f64).to_radians().sin_cos();
            let offset = r - (cx * cos + cy * sin);
            if angle.abs() <= tolerance {
                vertical.push((angle, offset));
            } else if (angle - 90).abs() <= tolerance {
                horizontal.push((angle, offset));
            }
        }

        let angle_tolerance = self.config.angle_tolerance_deg as i64;
        (
            LineFamily::from_lines(&vertical, angle_tolerance),
            LineFamily::from_lines(&horizontal, angle_tolerance),
        )
    }
}

impl LineFamily {
    fn from_lines(lines: &[(i64, f64)], angle_tolerance: i64) -> Self {
        let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
        for &(angle, _) in lines {
            *votes.entry(angle).or_default() += 1;
        }
        let mut modal = None;
        for (&angle, &count) in &votes {
            if modal.is_none_or(|(_, best)| count > best) {
                modal = Some((angle, count));
            }
        }
        let angle_deg = modal.map_or(0, |(angle, _)| angle);

        Self {
            angle_deg,
            raw_lines: lines.len(),
            offsets: lines
                .iter()
                .filter(|(angle, _)| (angle - angle_deg).abs() <= angle_tolerance)
                .map(|&(_, offset)| offset)
                .collect(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sort offsets and collapse runs closer than `distance` into their mean
fn merge_offsets(mut offsets: Vec<f64>, distance: f64) -> Vec<f64> {
    offsets.sort_by(f64::total_cmp);
    let mut merged = Vec::new();
    let mut run: Vec<f64> = Vec::new();
    for offset in offsets {
        if run.last().is_some_and(|&last| offset - last >= distance) {
            merged.push(mean(&run));
            run.clear();
        }
        run.push(offset);
    }
    if !run.is_empty() {
        merged.push(mean(&run));
    }
    merged
}

fn gap_tolerance(gap: f64) -> f64 {
    (0.1 * gap).max(1.0)
}

/// Most supported gap between adjacent lines, averaged over its supporters.
/// Ties go to the smaller gap.
fn modal_spacing(offsets: &[f64]) -> Option<f64> {
    let gaps: Vec<f64> = offsets.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(usize, f64)> = None;
    for &gap in &gaps {
        let support = supporters(&gaps, gap).count();
        if best.is_none_or(|(n, g)| support > n || (support == n && gap < g)) {
            best = Some((support, gap));
        }
    }
    let (_, gap) = best?;
    let cluster: Vec<f64> = supporters(&gaps, gap).collect();
    Some(mean(&cluster))
}

fn supporters(gaps: &[f64], gap: f64) -> impl Iterator<Item = f64> + '_ {
    gaps.iter()
        .copied()
        .filter(move |g| (g - gap).abs() <= gap_tolerance(gap))
}

fn lattice_members(offsets: &[f64], anchor: f64, spacing: f64) -> Vec<(f64, f64)> {
    offsets
        .iter()
        .filter_map(|&o| {
            let index = ((o - anchor) / spacing).round();
            ((o - anchor - index * spacing).abs() <= MAX_RESIDUAL * spacing).then_some((index, o))
        })
        .collect()
}

fn least_squares_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let (mx, my) = (
        points.iter().map(|p| p.0).sum::<f64>() / n,
        points.iter().map(|p| p.1).sum::<f64>() / n,
    );
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    let slope = sxy / sxx;
    (sxx > 0.0 && slope.is_finite() && slope > 0.0).then_some(slope)
}

/// Anchor on the line that explains the most others, then refine the
/// spacing by least squares until the consistent set stops changing
fn fit_lattice(offsets: &[f64], initial_spacing: f64) -> Option<Lattice> {
    let mut spacing = initial_spacing;
    let mut members: Vec<(f64, f64)> = Vec::new();

    for _ in 0..REFINEMENT_ROUNDS {
        let mut anchor = None;
        for &o in offsets {
            let count = lattice_members(offsets, o, spacing).len();
            if anchor.is_none_or(|(_, best)| count > best) {
                anchor = Some((o, count));
            }
        }
        let (anchor, _) = anchor?;

        let next = lattice_members(offsets, anchor, spacing);
        let refined = least_squares_slope(&next)?;
        let settled = next == members;
        members = next;
        spacing = refined;
        if settled {
            break;
        }
    }

    Some(Lattice {
        spacing,
        lines: members.len(),
    })
}

fn family_lattice(family: &LineFamily, merge_distance: f64) -> Option<Lattice> {
    let offsets = merge_offsets(family.offsets.clone(), merge_distance);
    let initial = modal_spacing(&offsets)?;
    fit_lattice(&offsets, initial)
}

impl Calibrator for HoughGridCalibrator {
    fn calibrate(&self, image: &GrayImage) -> Result<CalibrationResult> {
        let cfg = &self.config;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SeedScanError::calibration("image is empty", 0, 0));
        }

        let smoothed = smooth(image, cfg.blur_sigma);
        let line_mask = adaptive_mask(&smoothed, cfg.line_window_radius, cfg.line_offset);
        let vote_threshold = ((cfg.vote_fraction * width.min(height) as f64).round() as u32).max(1);
        let lines = detect_lines(
            &line_mask,
            LineDetectionOptions {
                vote_threshold,
                suppression_radius: cfg.suppression_radius,
            },
        );
        debug!(lines = lines.len(), vote_threshold, "Hough line candidates");

        let (vertical, horizontal) = self.families(&lines, width, height);
        if vertical.raw_lines > cfg.max_lines_per_direction
            || horizontal.raw_lines > cfg.max_lines_per_direction
        {
            return Err(SeedScanError::calibration(
                format!(
                    "implausibly many line candidates ({} horizontal, {} vertical); the image is likely textured rather than grid paper",
                    horizontal.raw_lines, vertical.raw_lines
                ),
                horizontal.raw_lines,
                vertical.raw_lines,
            ));
        }

        let h = family_lattice(&horizontal, cfg.merge_distance_px);
        let v = family_lattice(&vertical, cfg.merge_distance_px);
        let h_lines = h.map_or(0, |l| l.lines);
        let v_lines = v.map_or(0, |l| l.lines);
        debug!(h_lines, v_lines, h_spacing = ?h.map(|l| l.spacing), v_spacing = ?v.map(|l| l.spacing), "Grid lattices");

        let (h, v) = match (h, v) {
            (Some(h), Some(v))
                if h.lines >= cfg.min_lines_per_direction && v.lines >= cfg.min_lines_per_direction =>
            {
                (h, v)
            }
            _ => {
                return Err(SeedScanError::calibration(
                    format!(
                        "found {h_lines} horizontal and {v_lines} vertical grid lines, need at least {} in each direction",
                        cfg.min_lines_per_direction
                    ),
                    h_lines,
                    v_lines,
                ));
            }
        };

        let total = h.lines + v.lines;
        if total < cfg.min_total_lines {
            return Err(SeedScanError::calibration(
                format!("found {total} grid lines, need at least {}", cfg.min_total_lines),
                h.lines,
                v.lines,
            ));
        }

        let skew = (horizontal.angle_deg - vertical.angle_deg - 90).abs();
        if skew > cfg.orthogonality_tolerance_deg as i64 {
            return Err(SeedScanError::calibration(
                format!("grid lines meet at {}°, not at a right angle", 90 + skew),
                h.lines,
                v.lines,
            ));
        }

        let divergence = (h.spacing - v.spacing).abs() / h.spacing.max(v.spacing);
        if divergence > cfg.max_spacing_divergence {
            return Err(SeedScanError::calibration(
                format!(
                    "horizontal spacing {:.2} px and vertical spacing {:.2} px disagree",
                    h.spacing, v.spacing
                ),
                h.lines,
                v.lines,
            ));
        }

        let pixels_per_mm = (h.spacing + v.spacing) / 2.0 / cfg.grid_size_mm;
        let confidence = 0.7 * (1.0 - divergence) + 0.3 * (total as f64 / 20.0).min(1.0);
        debug!(pixels_per_mm, confidence, "Calibrated");

        Ok(CalibrationResult {
            pixels_per_mm,
            grid_lines_detected: total,
            horizontal_lines: h.lines,
            vertical_lines: v.lines,
            horizontal_spacing_px: h.spacing,
            vertical_spacing_px: v.spacing,
            confidence,
        })
    }
}
