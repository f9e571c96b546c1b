//! Equal-width partition of the drift distance.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `bins` equal-width bins covering `[0, drift_distance)`.
///
/// Every distance maps to a bin: values below zero land in the first bin,
/// values at or beyond the drift distance land in the last.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceBinning {
    drift_distance: f64,
    bins: usize,
}

impl DistanceBinning {
    /// Create a binning. Callers validate the inputs through
    /// [`crate::TemplateConfig::validate`].
    #[must_use]
    pub fn new(drift_distance: f64, bins: usize) -> Self {
        Self {
            drift_distance,
            bins: bins.max(1),
        }
    }

    /// Number of bins.
    #[must_use]
    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Full drift distance (cm).
    #[must_use]
    #[inline]
    pub fn drift_distance(&self) -> f64 {
        self.drift_distance
    }

    /// Width of one bin (cm).
    #[must_use]
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn width(&self) -> f64 {
        self.drift_distance / self.bins as f64
    }

    /// Bin index for a drift distance, clamped to `[0, bins - 1]`.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bin_of(&self, distance: f64) -> usize {
        if distance.is_nan() || distance <= 0.0 {
            return 0;
        }
        let bin = (distance / self.width()).floor() as usize;
        bin.min(self.bins - 1)
    }

    /// Lower edge of bin `index`.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn low_edge(&self, index: usize) -> f64 {
        index as f64 * self.width()
    }

    /// Centre of bin `index`.
    #[must_use]
    #[inline]
    pub fn center(&self, index: usize) -> f64 {
        self.low_edge(index) + 0.5 * self.width()
    }

    /// Centres of all bins, in order.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        (0..self.bins).map(|i| self.center(i)).collect()
    }
}
