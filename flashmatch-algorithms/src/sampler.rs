//! Drift-position estimates from conditional slices of a metric histogram.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::histogram::{Histogram1D, Histogram2D};
use log::warn;
use rand::Rng;

/// Default number of entries a projection must exceed.
pub const MIN_PROJECTION_ENTRIES: u64 = 100;

/// A drift-position estimate and its inverse-variance weight.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Estimate {
    /// Drift distance (cm), or -1 when there is no estimate.
    pub hypothesis: f64,
    /// `1 / spread²`, or 0 when there is no estimate.
    pub weight: f64,
}

impl Estimate {
    /// Sentinel for "no estimate".
    pub const NONE: Estimate = Estimate {
        hypothesis: -1.0,
        weight: 0.0,
    };

    /// True unless this is the no-estimate sentinel.
    #[must_use]
    pub fn is_some(&self) -> bool {
        self.weight > 0.0
    }
}

/// One step of the widening window around the observed value.
#[derive(Debug, Clone)]
pub struct ProjectionWindow {
    /// First value slot in the window.
    pub low_slot: usize,
    /// Last value slot in the window (inclusive).
    pub high_slot: usize,
    /// Distance distribution of the entries in the window.
    pub projection: Histogram1D,
}

impl ProjectionWindow {
    /// Entries in the projection.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.projection.entries()
    }
}

/// Iterator over symmetric windows `[slot - k, slot + k]`, `k = 0, 1, ...`,
/// clamped to the axis, ending with the window covering every slot.
pub struct Windows<'a> {
    histogram: &'a Histogram2D,
    center: usize,
    half_width: usize,
    done: bool,
}

impl Iterator for Windows<'_> {
    type Item = ProjectionWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let last = self.histogram.axis().slots() - 1;
        let low_slot = self.center.saturating_sub(self.half_width);
        let high_slot = (self.center + self.half_width).min(last);
        if low_slot == 0 && high_slot == last {
            self.done = true;
        }
        self.half_width += 1;
        Some(ProjectionWindow {
            low_slot,
            high_slot,
            projection: self.histogram.project_distance(low_slot, high_slot),
        })
    }
}

/// Estimates the drift position of an event from one metric.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalSampler {
    min_entries: u64,
}

impl Default for ConditionalSampler {
    fn default() -> Self {
        Self {
            min_entries: MIN_PROJECTION_ENTRIES,
        }
    }
}

impl ConditionalSampler {
    /// Create a sampler that accepts the first window with more than
    /// `min_entries` entries.
    #[must_use]
    pub fn new(min_entries: u64) -> Self {
        Self { min_entries }
    }

    /// Entries threshold.
    #[must_use]
    pub fn min_entries(&self) -> u64 {
        self.min_entries
    }

    /// Windows widening around the value slot of `observed`.
    ///
    /// Yields nothing for a NaN observation.
    #[must_use]
    pub fn windows<'a>(&self, histogram: &'a Histogram2D, observed: f64) -> Windows<'a> {
        let slot = histogram.axis().slot_of(observed);
        Windows {
            histogram,
            center: slot.unwrap_or(0),
            half_width: 0,
            done: slot.is_none(),
        }
    }

    /// Estimate the drift position given an observed metric value.
    ///
    /// The hypothesis is a random draw from the distance distribution of
    /// the first window with enough entries, weighted by the inverse
    /// variance of that distribution. A spread narrower than one distance
    /// bin is rejected as undersampled. Returns [`Estimate::NONE`] when no
    /// window qualifies.
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        histogram: &Histogram2D,
        observed: f64,
        rng: &mut R,
    ) -> Estimate {
        let bin_width = histogram.binning().width();
        for window in self.windows(histogram, observed) {
            let entries = window.entries();
            if entries <= self.min_entries {
                continue;
            }
            let (Some(hypothesis), Some(spread)) = (
                window.projection.sample(rng),
                window.projection.std_dev(),
            ) else {
                return Estimate::NONE;
            };
            if spread < bin_width {
                warn!(
                    "projection at value {observed} (slots {}..={}) has {entries} entries \
                     but spread {spread:.3} below bin width {bin_width:.3}; hypothesis {hypothesis:.3} rejected",
                    window.low_slot, window.high_slot
                );
                return Estimate::NONE;
            }
            return Estimate {
                hypothesis,
                weight: 1.0 / (spread * spread),
            };
        }
        Estimate::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::ValueAxis;
    use approx::assert_relative_eq;
    use flashmatch_core::DistanceBinning;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Metric value rises linearly with distance plus a little smearing.
    fn correlated_histogram(events: usize) -> Histogram2D {
        let mut rng = StdRng::seed_from_u64(42);
        let mut h = Histogram2D::new(
            DistanceBinning::new(200.0, 40),
            ValueAxis::new(50, 0.0, 100.0),
        );
        for _ in 0..events {
            let x: f64 = rng.random_range(0.0..200.0);
            let noise: f64 = rng.random_range(-10.0..10.0);
            h.fill(x, x / 2.0 + noise);
        }
        h
    }

    #[test]
    fn test_windows_are_monotone_in_entries() {
        let h = correlated_histogram(3_000);
        let sampler = ConditionalSampler::default();
        for observed in [-5.0, 0.0, 13.7, 50.0, 99.9, 150.0] {
            let counts: Vec<u64> = sampler.windows(&h, observed).map(|w| w.entries()).collect();
            assert!(!counts.is_empty());
            assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(*counts.last().unwrap(), h.entries());
        }
    }

    #[test]
    fn test_windows_end_at_full_extent() {
        let h = correlated_histogram(10);
        let sampler = ConditionalSampler::default();
        let last = sampler.windows(&h, 50.0).last().unwrap();
        assert_eq!(last.low_slot, 0);
        assert_eq!(last.high_slot, h.axis().slots() - 1);
    }

    #[test]
    fn test_estimate_tracks_correlation() {
        let h = correlated_histogram(20_000);
        let sampler = ConditionalSampler::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut sum = 0.0;
        let n = 200;
        for _ in 0..n {
            let estimate = sampler.estimate(&h, 50.0, &mut rng);
            assert!(estimate.is_some());
            sum += estimate.hypothesis;
        }
        // value 50 corresponds to a distance of about 100 cm
        assert_relative_eq!(sum / f64::from(n), 100.0, epsilon = 10.0);
    }

    #[test]
    fn test_estimate_is_reproducible_under_seed() {
        let h = correlated_histogram(5_000);
        let sampler = ConditionalSampler::default();
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        for observed in [10.0, 40.0, 80.0] {
            assert_eq!(
                sampler.estimate(&h, observed, &mut a),
                sampler.estimate(&h, observed, &mut b)
            );
        }
    }

    #[test]
    fn test_insufficient_sample_returns_sentinel() {
        let h = correlated_histogram(50);
        let sampler = ConditionalSampler::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sampler.estimate(&h, 50.0, &mut rng), Estimate::NONE);
        assert_eq!(sampler.estimate(&h, f64::NAN, &mut rng), Estimate::NONE);
    }

    #[test]
    fn test_narrow_projection_is_rejected() {
        // Every entry sits in one distance bin: the spread is zero.
        let mut h = Histogram2D::new(
            DistanceBinning::new(200.0, 40),
            ValueAxis::new(10, 0.0, 10.0),
        );
        for _ in 0..500 {
            h.fill(52.0, 5.5);
        }
        let sampler = ConditionalSampler::default();
        let mut rng = StdRng::seed_from_u64(0);
        let estimate = sampler.estimate(&h, 5.5, &mut rng);
        assert_eq!(estimate, Estimate::NONE);
        assert!(!estimate.is_some());
    }
}
