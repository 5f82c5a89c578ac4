//! Shape classification and population statistics.

use crate::{
    config::{ClassificationConfig, StatisticsConfig},
    types::{
        AnalysisSummary, ClassifiedSeed, DimensionStats, SeedMeasurement, ShapeClass,
        ShapeDistribution, SizeRatio,
    },
};

/// Maps aspect ratios onto shape classes
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    pub config: ClassificationConfig,
}

impl Classifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    /// `< circular_max` circular, `<= oval_max` oval, otherwise elongated
    pub fn classify(&self, aspect_ratio: f64) -> ShapeClass {
        if aspect_ratio < self.config.circular_max {
            ShapeClass::Circular
        } else if aspect_ratio <= self.config.oval_max {
            ShapeClass::Oval
        } else {
            ShapeClass::Elongated
        }
    }

    pub fn classify_all(&self, seeds: Vec<SeedMeasurement>) -> Vec<ClassifiedSeed> {
        seeds
            .into_iter()
            .map(|measurement| ClassifiedSeed {
                shape: self.classify(measurement.aspect_ratio),
                measurement,
            })
            .collect()
    }
}

/// Summary statistics over classified seeds
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    pub config: StatisticsConfig,
}

impl Aggregator {
    pub fn new(config: StatisticsConfig) -> Self {
        Self { config }
    }

    pub fn summarize(&self, seeds: &[ClassifiedSeed]) -> AnalysisSummary {
        let lengths: Vec<f64> = seeds.iter().map(|s| s.measurement.major_axis_mm).collect();
        let widths: Vec<f64> = seeds.iter().map(|s| s.measurement.minor_axis_mm).collect();
        let areas: Vec<f64> = seeds.iter().map(|s| s.measurement.area_mm2).collect();

        let mut shape_distribution = ShapeDistribution::default();
        for seed in seeds {
            match seed.shape {
                ShapeClass::Circular => shape_distribution.circular += 1,
                ShapeClass::Oval => shape_distribution.oval += 1,
                ShapeClass::Elongated => shape_distribution.elongated += 1,
            }
        }

        AnalysisSummary {
            count: seeds.len(),
            length: dimension_stats(&lengths),
            width: dimension_stats(&widths),
            shape_distribution,
            size_ratio: self.size_ratio(&areas),
        }
    }

    fn size_ratio(&self, areas: &[f64]) -> SizeRatio {
        let (Some(large_cut), Some(small_cut)) = (
            percentile(areas, self.config.large_percentile),
            percentile(areas, self.config.small_percentile),
        ) else {
            return SizeRatio::default();
        };

        let large_count = areas.iter().filter(|&&a| a >= large_cut).count();
        let small_count = areas.iter().filter(|&&a| a <= small_cut).count();
        SizeRatio {
            large_count,
            small_count,
            ratio: (small_count > 0).then(|| large_count as f64 / small_count as f64),
        }
    }
}

/// Mean, extremes and population standard deviation; `None` when empty
pub fn dimension_stats(values: &[f64]) -> Option<DimensionStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(DimensionStats {
        mean_mm: mean,
        min_mm: values.iter().copied().fold(f64::INFINITY, f64::min),
        max_mm: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_mm: variance.sqrt(),
    })
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(id: u32, length: f64, width: f64, area: f64) -> ClassifiedSeed {
        let classifier = Classifier::default();
        ClassifiedSeed {
            measurement: SeedMeasurement {
                id,
                center_px: [0.0, 0.0],
                major_axis_mm: length,
                minor_axis_mm: width,
                area_mm2: area,
                aspect_ratio: length / width,
                orientation_deg: 0.0,
            },
            shape: classifier.classify(length / width),
        }
    }

    #[test]
    fn breakpoints_are_oval_on_both_edges() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(1.0), ShapeClass::Circular);
        assert_eq!(classifier.classify(1.199_999), ShapeClass::Circular);
        assert_eq!(classifier.classify(1.2), ShapeClass::Oval);
        assert_eq!(classifier.classify(1.8), ShapeClass::Oval);
        assert_eq!(classifier.classify(1.800_001), ShapeClass::Elongated);
    }

    #[test]
    fn population_standard_deviation() {
        let stats = dimension_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean_mm, 5.0);
        assert_eq!(stats.std_mm, 2.0);
        assert_eq!(stats.min_mm, 2.0);
        assert_eq!(stats.max_mm, 9.0);

        let single = dimension_stats(&[3.5]).unwrap();
        assert_eq!(single.std_mm, 0.0);
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 25.0), Some(1.75));
        assert_eq!(percentile(&values, 75.0), Some(3.25));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn eight_seeds_split_two_and_two() {
        let seeds: Vec<ClassifiedSeed> = (1..=8)
            .map(|i| seed(i, 2.0, 1.5, i as f64))
            .collect();
        let summary = Aggregator::default().summarize(&seeds);
        assert_eq!(summary.count, 8);
        assert_eq!(summary.size_ratio.large_count, 2);
        assert_eq!(summary.size_ratio.small_count, 2);
        assert_eq!(summary.size_ratio.ratio, Some(1.0));
    }

    #[test]
    fn shape_distribution_counts_each_class() {
        let seeds = vec![
            seed(1, 2.0, 2.0, 3.0),
            seed(2, 2.4, 2.0, 3.0),
            seed(3, 3.6, 2.0, 3.0),
            seed(4, 4.0, 2.0, 3.0),
        ];
        let summary = Aggregator::default().summarize(&seeds);
        assert_eq!(
            summary.shape_distribution,
            ShapeDistribution { circular: 1, oval: 2, elongated: 1 }
        );
    }

    #[test]
    fn empty_population_has_no_statistics() {
        let summary = Aggregator::default().summarize(&[]);
        assert_eq!(summary.count, 0);
        assert!(summary.length.is_none() && summary.width.is_none());
        assert_eq!(summary.size_ratio, SizeRatio { large_count: 0, small_count: 0, ratio: None });
    }

    #[test]
    fn identical_areas_are_both_large_and_small() {
        let seeds: Vec<ClassifiedSeed> = (1..=3).map(|i| seed(i, 2.0, 1.5, 4.0)).collect();
        let ratio = Aggregator::default().summarize(&seeds).size_ratio;
        assert_eq!((ratio.large_count, ratio.small_count, ratio.ratio), (3, 3, Some(1.0)));
    }
}
