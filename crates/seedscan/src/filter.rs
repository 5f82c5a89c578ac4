use tracing::warn;

use crate::{
    config::PlausibilityConfig,
    types::{ExcludedSeed, ExclusionReason, SeedMeasurement},
};

/// Drops measurements too large to be a single seed.
///
/// Excluded entries keep their measured values; nothing is clamped.
#[derive(Debug, Clone, Default)]
pub struct PlausibilityFilter {
    pub config: PlausibilityConfig,
}

impl PlausibilityFilter {
    pub fn new(config: PlausibilityConfig) -> Self {
        Self { config }
    }

    /// Why a measurement is implausible, if it is. Length is checked first.
    pub fn check(&self, seed: &SeedMeasurement) -> Option<ExclusionReason> {
        if seed.major_axis_mm > self.config.max_seed_length_mm {
            Some(ExclusionReason::TooLong)
        } else if seed.area_mm2 > self.config.max_seed_area_mm2 {
            Some(ExclusionReason::TooLarge)
        } else {
            None
        }
    }

    /// Split measurements into `(kept, excluded)`, preserving order
    pub fn apply(&self, seeds: Vec<SeedMeasurement>) -> (Vec<SeedMeasurement>, Vec<ExcludedSeed>) {
        let mut kept = Vec::with_capacity(seeds.len());
        let mut excluded = Vec::new();
        for seed in seeds {
            match self.check(&seed) {
                Some(reason) => {
                    warn!(
                        id = seed.id,
                        length_mm = seed.major_axis_mm,
                        area_mm2 = seed.area_mm2,
                        %reason,
                        "Excluding implausible seed, likely a merged cluster"
                    );
                    excluded.push(ExcludedSeed { measurement: seed, reason });
                }
                None => kept.push(seed),
            }
        }
        (kept, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(id: u32, major: f64, area: f64) -> SeedMeasurement {
        SeedMeasurement {
            id,
            center_px: [0.0, 0.0],
            major_axis_mm: major,
            minor_axis_mm: 1.0,
            area_mm2: area,
            aspect_ratio: major,
            orientation_deg: 0.0,
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let filter = PlausibilityFilter::default();
        let (kept, excluded) = filter.apply(vec![seed(1, 6.0, 12.0)]);
        assert_eq!(kept.len(), 1);
        assert!(excluded.is_empty());
    }

    #[test]
    fn oversized_entries_are_excluded_with_reason() {
        let filter = PlausibilityFilter::default();
        let (kept, excluded) = filter.apply(vec![
            seed(1, 3.0, 4.0),
            seed(2, 6.5, 5.0),
            seed(3, 5.0, 12.5),
            seed(4, 7.0, 20.0),
        ]);
        assert_eq!(kept.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1]);
        let reasons: Vec<(u32, ExclusionReason)> =
            excluded.iter().map(|e| (e.measurement.id, e.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (2, ExclusionReason::TooLong),
                (3, ExclusionReason::TooLarge),
                (4, ExclusionReason::TooLong),
            ]
        );
        assert_eq!(excluded[1].measurement.area_mm2, 12.5);
    }

    #[test]
    fn custom_bounds_apply() {
        let filter = PlausibilityFilter::new(PlausibilityConfig {
            max_seed_length_mm: 2.0,
            max_seed_area_mm2: 100.0,
        });
        assert_eq!(filter.check(&seed(1, 2.5, 1.0)), Some(ExclusionReason::TooLong));
    }
}
