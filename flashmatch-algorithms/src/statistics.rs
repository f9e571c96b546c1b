//! Per-distance-bin profiles and their derived mean/spread tables.
//!
//! A metric is filled into a [`BinnedStatistics`] (2-D counts plus a
//! profile) until the sample is exhausted, then derived once into a
//! read-only [`ProfileStatistics`] table.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::histogram::{Histogram2D, ValueAxis};
use flashmatch_core::{DistanceBinning, Error, Metric, MetricAxis, ProfileErrors, Result};

/// Running moments of one profile bin (Welford, mergeable).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Moments {
    entries: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            entries: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Moments {
    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, value: f64) {
        self.entries += 1;
        let delta = value - self.mean;
        self.mean += delta / self.entries as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    #[allow(clippy::cast_precision_loss)]
    fn merge(&mut self, other: &Self) {
        if other.entries == 0 {
            return;
        }
        if self.entries == 0 {
            *self = *other;
            return;
        }
        let n_a = self.entries as f64;
        let n_b = other.entries as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.entries += other.entries;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[allow(clippy::cast_precision_loss)]
    fn statistic(&self, errors: ProfileErrors) -> Option<BinStatistic> {
        if self.entries == 0 {
            return None;
        }
        let n = self.entries as f64;
        let spread = (self.m2 / n).max(0.0).sqrt();
        let spread = match errors {
            ProfileErrors::Spread => spread,
            ProfileErrors::ErrorOfMean => spread / n.sqrt(),
        };
        Some(BinStatistic {
            mean: self.mean.clamp(self.min, self.max),
            spread,
            entries: self.entries,
            min: self.min,
            max: self.max,
        })
    }
}

/// Mean of a value per distance bin, ignoring values outside a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    binning: DistanceBinning,
    window: (f64, f64),
    bins: Vec<Moments>,
}

impl Profile {
    /// Create an empty profile accepting values in `window` (inclusive).
    #[must_use]
    pub fn new(binning: DistanceBinning, window: (f64, f64)) -> Self {
        Self {
            binning,
            window,
            bins: vec![Moments::default(); binning.bins()],
        }
    }

    /// Create an empty profile accepting every finite value.
    #[must_use]
    pub fn unbounded(binning: DistanceBinning) -> Self {
        Self::new(binning, (f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Add one entry. Returns false if the value fell outside the window.
    pub fn fill(&mut self, distance: f64, value: f64) -> bool {
        if !(self.window.0..=self.window.1).contains(&value) {
            return false;
        }
        self.bins[self.binning.bin_of(distance)].push(value);
        true
    }

    /// Total accepted entries.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.bins.iter().map(|m| m.entries).sum()
    }

    /// Add another profile with identical binning and window.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleHistograms`] if the binnings differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.binning != other.binning || self.window != other.window {
            return Err(Error::IncompatibleHistograms(format!(
                "profile {:?}/{:?} vs {:?}/{:?}",
                self.binning, self.window, other.binning, other.window
            )));
        }
        for (a, b) in self.bins.iter_mut().zip(&other.bins) {
            a.merge(b);
        }
        Ok(())
    }

    /// Per-bin statistics; empty bins yield `None`.
    #[must_use]
    pub fn statistics(&self, errors: ProfileErrors) -> Vec<Option<BinStatistic>> {
        self.bins.iter().map(|m| m.statistic(errors)).collect()
    }
}

/// Mean and spread of one metric in one distance bin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinStatistic {
    /// Mean value.
    pub mean: f64,
    /// Spread or error of the mean, per [`ProfileErrors`].
    pub spread: f64,
    /// Accepted entries.
    pub entries: u64,
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
}

/// Accumulator for one metric: 2-D counts and a profile over distance.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedStatistics {
    metric: Metric,
    histogram: Histogram2D,
    profile: Profile,
}

impl BinnedStatistics {
    /// Create an empty accumulator for `metric` on `axis`.
    #[must_use]
    pub fn new(metric: Metric, binning: DistanceBinning, axis: &MetricAxis) -> Self {
        Self {
            metric,
            histogram: Histogram2D::new(binning, ValueAxis::new(axis.bins, axis.low, axis.high)),
            profile: Profile::new(binning, axis.profile_window()),
        }
    }

    /// Metric being accumulated.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Add one (distance, value) sample to the histogram and the profile.
    pub fn accumulate(&mut self, distance: f64, value: f64) {
        self.histogram.fill(distance, value);
        self.profile.fill(distance, value);
    }

    /// The 2-D counts.
    #[must_use]
    pub fn histogram(&self) -> &Histogram2D {
        &self.histogram
    }

    /// The profile accumulator.
    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Merge a shard accumulated over a disjoint part of the sample.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleHistograms`] if metric or binning differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.metric != other.metric {
            return Err(Error::IncompatibleHistograms(format!(
                "metric {} vs {}",
                self.metric, other.metric
            )));
        }
        self.histogram.merge(&other.histogram)?;
        self.profile.merge(&other.profile)
    }

    /// Derive the mean/spread table. Call once accumulation is complete.
    #[must_use]
    pub fn derive(&self, errors: ProfileErrors) -> ProfileStatistics {
        ProfileStatistics {
            metric: self.metric,
            binning: *self.histogram.binning(),
            bins: self.profile.statistics(errors),
        }
    }
}

/// Read-only (mean, spread) table of one metric over the distance bins.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileStatistics {
    metric: Metric,
    binning: DistanceBinning,
    bins: Vec<Option<BinStatistic>>,
}

impl ProfileStatistics {
    /// Metric described by the table.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Distance binning of the table.
    #[must_use]
    pub fn binning(&self) -> &DistanceBinning {
        &self.binning
    }

    /// Statistic of bin `index`, `None` if the bin is empty or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BinStatistic> {
        self.bins.get(index).and_then(Option::as_ref)
    }

    /// All bins in order.
    #[must_use]
    pub fn bins(&self) -> &[Option<BinStatistic>] {
        &self.bins
    }

    /// Number of distance bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True if the table has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
