//! Fixed-binning count histograms.
//!
//! Counts are stored flattened and row-major so that a window of value
//! bins projects onto the distance axis with contiguous reads.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use flashmatch_core::{DistanceBinning, Error, Result};
use rand::Rng;

/// Uniform axis with one underflow and one overflow slot.
///
/// Slot 0 holds underflow, slots `1..=bins` are in range and slot
/// `bins + 1` holds overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValueAxis {
    bins: usize,
    low: f64,
    high: f64,
}

impl ValueAxis {
    /// Create an axis of `bins` equal bins over `[low, high)`.
    #[must_use]
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        Self {
            bins: bins.max(1),
            low,
            high,
        }
    }

    /// Number of in-range bins.
    #[must_use]
    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of slots including underflow and overflow.
    #[must_use]
    #[inline]
    pub fn slots(&self) -> usize {
        self.bins + 2
    }

    /// Lower edge.
    #[must_use]
    #[inline]
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge.
    #[must_use]
    #[inline]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Width of one in-range bin.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Slot holding `value`, or `None` for NaN.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn slot_of(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        if value < self.low {
            return Some(0);
        }
        if value >= self.high {
            return Some(self.bins + 1);
        }
        let bin = ((value - self.low) / self.width()).floor() as usize;
        Some(bin.min(self.bins - 1) + 1)
    }

    /// Lower edge of in-range slot `slot` (1-based).
    #[must_use]
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn slot_low_edge(&self, slot: usize) -> f64 {
        self.low + (slot as f64 - 1.0) * self.width()
    }

    /// Centre of in-range slot `slot` (1-based).
    #[must_use]
    #[inline]
    pub fn slot_center(&self, slot: usize) -> f64 {
        self.slot_low_edge(slot) + 0.5 * self.width()
    }
}

/// One-dimensional count histogram with underflow and overflow.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram1D {
    axis: ValueAxis,
    counts: Vec<u64>,
}

impl Histogram1D {
    /// Create an empty histogram.
    #[must_use]
    pub fn new(axis: ValueAxis) -> Self {
        Self {
            axis,
            counts: vec![0; axis.slots()],
        }
    }

    /// The binning axis.
    #[must_use]
    pub fn axis(&self) -> &ValueAxis {
        &self.axis
    }

    /// All slot counts, underflow first and overflow last.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Add one entry. NaN values are dropped.
    pub fn fill(&mut self, value: f64) {
        if let Some(slot) = self.axis.slot_of(value) {
            self.counts[slot] += 1;
        }
    }

    /// Total entries including underflow and overflow.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Entries inside the axis range.
    #[must_use]
    pub fn in_range(&self) -> u64 {
        self.counts[1..=self.axis.bins].iter().sum()
    }

    /// Mean of the in-range bin centres, weighted by counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        let total = self.in_range();
        if total == 0 {
            return None;
        }
        let sum: f64 = (1..=self.axis.bins)
            .map(|slot| self.counts[slot] as f64 * self.axis.slot_center(slot))
            .sum();
        Some(sum / total as f64)
    }

    /// Standard deviation of the in-range bin centres, weighted by counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let total = self.in_range() as f64;
        let var: f64 = (1..=self.axis.bins)
            .map(|slot| {
                let d = self.axis.slot_center(slot) - mean;
                self.counts[slot] as f64 * d * d
            })
            .sum::<f64>()
            / total;
        Some(var.max(0.0).sqrt())
    }

    /// Draw a value distributed like the in-range contents.
    ///
    /// A bin is chosen with probability proportional to its count, then a
    /// position uniformly inside it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        let total = self.in_range();
        if total == 0 {
            return None;
        }
        let target = rng.random_range(0..total);
        let mut cumulative = 0u64;
        for slot in 1..=self.axis.bins {
            cumulative += self.counts[slot];
            if cumulative > target {
                let u: f64 = rng.random();
                return Some(self.axis.slot_low_edge(slot) + u * self.axis.width());
            }
        }
        None
    }

    /// Add another histogram with identical binning.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleHistograms`] if the axes differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.axis != other.axis {
            return Err(Error::IncompatibleHistograms(format!(
                "{:?} vs {:?}",
                self.axis, other.axis
            )));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }
}

/// Counts over (distance bin, metric value).
///
/// Distances are clamped into the distance binning; metric values outside
/// their axis land in the underflow or overflow slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram2D {
    binning: DistanceBinning,
    axis: ValueAxis,
    /// `counts[slot * distance_bins + distance_bin]`
    counts: Vec<u64>,
}

impl Histogram2D {
    /// Create an empty histogram.
    #[must_use]
    pub fn new(binning: DistanceBinning, axis: ValueAxis) -> Self {
        Self {
            binning,
            axis,
            counts: vec![0; binning.bins() * axis.slots()],
        }
    }

    /// Distance binning.
    #[must_use]
    pub fn binning(&self) -> &DistanceBinning {
        &self.binning
    }

    /// Metric value axis.
    #[must_use]
    pub fn axis(&self) -> &ValueAxis {
        &self.axis
    }

    /// Add one entry. NaN metric values are dropped.
    pub fn fill(&mut self, distance: f64, value: f64) {
        if let Some(slot) = self.axis.slot_of(value) {
            let idx = slot * self.binning.bins() + self.binning.bin_of(distance);
            self.counts[idx] += 1;
        }
    }

    /// Count at a distance bin and value slot.
    #[must_use]
    #[inline]
    pub fn get(&self, distance_bin: usize, slot: usize) -> Option<u64> {
        if distance_bin < self.binning.bins() && slot < self.axis.slots() {
            Some(self.counts[slot * self.binning.bins() + distance_bin])
        } else {
            None
        }
    }

    /// Total entries.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Distance distribution of the entries whose value slot lies in
    /// `low_slot..=high_slot` (clamped to the axis).
    #[must_use]
    pub fn project_distance(&self, low_slot: usize, high_slot: usize) -> Histogram1D {
        let n = self.binning.bins();
        let mut projection = Histogram1D::new(ValueAxis::new(
            n,
            0.0,
            self.binning.drift_distance(),
        ));
        let high_slot = high_slot.min(self.axis.slots() - 1);
        if low_slot > high_slot {
            return projection;
        }
        for slot in low_slot..=high_slot {
            let row = &self.counts[slot * n..(slot + 1) * n];
            for (bin, &count) in row.iter().enumerate() {
                projection.counts[bin + 1] += count;
            }
        }
        projection
    }

    /// Add another histogram with identical binning.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleHistograms`] if the binnings differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.binning != other.binning || self.axis != other.axis {
            return Err(Error::IncompatibleHistograms(format!(
                "{:?}/{:?} vs {:?}/{:?}",
                self.binning, self.axis, other.binning, other.axis
            )));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }
}

/// Counts over two value axes, each with underflow and overflow slots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScatterHistogram {
    x: ValueAxis,
    y: ValueAxis,
    /// `counts[y_slot * x.slots() + x_slot]`
    counts: Vec<u64>,
}

impl ScatterHistogram {
    /// Create an empty histogram.
    #[must_use]
    pub fn new(x: ValueAxis, y: ValueAxis) -> Self {
        Self {
            x,
            y,
            counts: vec![0; x.slots() * y.slots()],
        }
    }

    /// Horizontal axis.
    #[must_use]
    pub fn x_axis(&self) -> &ValueAxis {
        &self.x
    }

    /// Vertical axis.
    #[must_use]
    pub fn y_axis(&self) -> &ValueAxis {
        &self.y
    }

    /// Add one entry. Entries with a NaN coordinate are dropped.
    pub fn fill(&mut self, x: f64, y: f64) {
        if let (Some(xs), Some(ys)) = (self.x.slot_of(x), self.y.slot_of(y)) {
            self.counts[ys * self.x.slots() + xs] += 1;
        }
    }

    /// Count at an `(x, y)` slot pair.
    #[must_use]
    #[inline]
    pub fn get(&self, x_slot: usize, y_slot: usize) -> Option<u64> {
        if x_slot < self.x.slots() && y_slot < self.y.slots() {
            Some(self.counts[y_slot * self.x.slots() + x_slot])
        } else {
            None
        }
    }

    /// Total entries.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }
}
