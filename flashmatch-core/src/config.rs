//! Template-generation parameter bundle.
//!
//! The bundle is read-only for the duration of a run. Detector selection is
//! an explicit value carried by the bundle, never process-wide state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binning::DistanceBinning;
use crate::error::{Error, Result};

/// The six per-bin template metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Metric {
    /// Corrected flash y minus charge y.
    Dy,
    /// Corrected flash z minus charge z.
    Dz,
    /// PE spread of the flash.
    Rr,
    /// PE ratio of the flash.
    Ratio,
    /// Flash slope minus charge slope.
    Slope,
    /// Photoelectrons per unit charge.
    Petoq,
}

impl Metric {
    /// All metrics in table order.
    pub const ALL: [Metric; 6] = [
        Metric::Dy,
        Metric::Dz,
        Metric::Rr,
        Metric::Ratio,
        Metric::Slope,
        Metric::Petoq,
    ];

    /// Short lowercase name used in tables and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Metric::Dy => "dy",
            Metric::Dz => "dz",
            Metric::Rr => "rr",
            Metric::Ratio => "ratio",
            Metric::Slope => "slope",
            Metric::Petoq => "petoq",
        }
    }

    /// Position of the metric in [`Metric::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Value axis of one metric histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricAxis {
    /// Number of value bins.
    pub bins: usize,
    /// Lower edge.
    pub low: f64,
    /// Upper edge.
    pub high: f64,
    /// Scale applied to `low`/`high` for the profile's accepted value window.
    pub profile_scale: f64,
}

impl MetricAxis {
    /// Axis with a profile window equal to the histogram range.
    #[must_use]
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        Self {
            bins,
            low,
            high,
            profile_scale: 1.0,
        }
    }

    /// Set the profile window scale.
    #[must_use]
    pub fn with_profile_scale(mut self, scale: f64) -> Self {
        self.profile_scale = scale;
        self
    }

    /// Accepted value window of the profile.
    #[must_use]
    pub fn profile_window(&self) -> (f64, f64) {
        (self.low * self.profile_scale, self.high * self.profile_scale)
    }
}

/// Histogram ranges for the six metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricAxes {
    /// Corrected flash y minus charge y (cm).
    pub dy: MetricAxis,
    /// Corrected flash z minus charge z (cm).
    pub dz: MetricAxis,
    /// PE spread of the flash (cm).
    pub rr: MetricAxis,
    /// PE ratio of the flash.
    pub ratio: MetricAxis,
    /// Flash slope minus charge slope.
    pub slope: MetricAxis,
    /// Photoelectrons per unit charge.
    pub petoq: MetricAxis,
}

impl MetricAxes {
    /// Axis for `metric`.
    #[must_use]
    pub fn get(&self, metric: Metric) -> &MetricAxis {
        match metric {
            Metric::Dy => &self.dy,
            Metric::Dz => &self.dz,
            Metric::Rr => &self.rr,
            Metric::Ratio => &self.ratio,
            Metric::Slope => &self.slope,
            Metric::Petoq => &self.petoq,
        }
    }
}

impl Default for MetricAxes {
    fn default() -> Self {
        Self {
            dy: MetricAxis::new(100, -100.0, 100.0).with_profile_scale(2.0),
            dz: MetricAxis::new(100, -100.0, 100.0).with_profile_scale(2.5),
            rr: MetricAxis::new(100, 0.0, 200.0),
            ratio: MetricAxis::new(100, 0.0, 1.0),
            slope: MetricAxis::new(100, -1.0, 1.0),
            petoq: MetricAxis::new(100, 0.0, 5.0),
        }
    }
}

/// Detector the templates are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Detector {
    /// SBND. The ratio metric compares coated and uncoated PMTs.
    Sbnd {
        /// Include the ratio term in the match score.
        use_uncoated_pmt: bool,
    },
    /// ICARUS, one cryostat at a time. The ratio metric compares the two
    /// TPC volumes of the cryostat.
    Icarus {
        /// Cryostat index (0 or 1).
        cryostat: u8,
        /// Include the ratio term in the match score.
        use_opposite_volume: bool,
    },
}

impl Detector {
    /// Whether the ratio metric contributes to the match score.
    #[must_use]
    pub fn scores_ratio(&self) -> bool {
        match *self {
            Detector::Sbnd { use_uncoated_pmt } => use_uncoated_pmt,
            Detector::Icarus {
                use_opposite_volume,
                ..
            } => use_opposite_volume,
        }
    }

    /// Lowercase detector name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Detector::Sbnd { .. } => "sbnd",
            Detector::Icarus { .. } => "icarus",
        }
    }
}

/// What to do when a distance bin's spread is zero or missing.
///
/// A substituted bin takes its spread from the donor bin. An empty bin
/// also borrows the donor's mean; a populated bin with zero spread keeps
/// its own mean. If no bin of a table has a usable spread, the metric's
/// term is left out of the score under every policy except `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SpreadPolicy {
    /// Abort scoring with [`Error::DegenerateSpread`].
    Fail,
    /// Borrow the next higher bin (next lower for the last bin). If that
    /// bin is unusable too, fall through to the nearest usable bin.
    #[default]
    AdjacentBin,
    /// Borrow the nearest bin with a usable spread, searching both ways.
    NearestPopulated,
}

/// Which error each profile bin reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProfileErrors {
    /// Standard deviation of the values in the bin.
    #[default]
    Spread,
    /// Standard deviation divided by `sqrt(entries)`.
    ErrorOfMean,
}

/// How bias-correction polynomials are fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CorrectionFit {
    /// Unbinned least squares over every selected event.
    #[default]
    Points,
    /// Weighted least squares over the per-bin means of a profile.
    Profile,
}

/// Binning of the match-score summary histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreAxis {
    /// Number of score bins.
    pub bins: usize,
    /// Lowest score of the histogram.
    pub low: f64,
    /// Upper edge of the histogram; the scatter plots stop at three fifths of it.
    pub high: f64,
}

impl Default for ScoreAxis {
    fn default() -> Self {
        Self {
            bins: 200,
            low: 0.0,
            high: 100.0,
        }
    }
}

/// Global x extent of the score scatter plots (cm).
///
/// The scatter uses twice as many bins as there are distance bins.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalXRange {
    /// Lower edge.
    pub low: f64,
    /// Upper edge.
    pub high: f64,
}

impl GlobalXRange {
    /// Both SBND drift volumes.
    pub const SBND: Self = Self {
        low: -215.0,
        high: 215.0,
    };

    /// The two drift volumes of one ICARUS cryostat.
    #[must_use]
    pub fn icarus(cryostat: u8) -> Self {
        if cryostat == 0 {
            Self {
                low: -380.0,
                high: -50.0,
            }
        } else {
            Self {
                low: 50.0,
                high: 380.0,
            }
        }
    }
}

impl Default for GlobalXRange {
    fn default() -> Self {
        Self::SBND
    }
}

/// Configuration for a template-generation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TemplateConfig {
    /// Detector selection and its score options.
    pub detector: Detector,
    /// Drift distance (cm).
    pub drift_distance: f64,
    /// Number of distance bins.
    pub distance_bins: usize,
    /// Value axes of the six metric histograms.
    pub axes: MetricAxes,
    /// Upper |skew| limit for the y correction fit.
    pub skew_limit_y: f64,
    /// Upper |skew| limit for the z correction fit.
    pub skew_limit_z: f64,
    /// Lower |skew| limit for both correction fits.
    pub skew_low_limit: f64,
    /// Above this |skew| no correction is applied (default: 10).
    pub correction_skew_limit: f64,
    /// Degree of the bias-correction polynomials (default: 2).
    pub correction_degree: usize,
    /// Fit mode for the bias corrections.
    pub correction_fit: CorrectionFit,
    /// Entries a conditional projection needs before it is accepted (default: 100).
    pub min_projection_entries: u64,
    /// Handling of zero spreads during scoring.
    pub spread_policy: SpreadPolicy,
    /// Error reported by each profile bin.
    pub profile_errors: ProfileErrors,
    /// Degree of the rr/ratio band fits.
    pub band_degree: usize,
    /// Match-score summary histogram.
    pub score_axis: ScoreAxis,
    /// Global x extent of the score scatter plots.
    pub global_x: GlobalXRange,
    /// Accumulate histograms on the rayon pool.
    pub parallel: bool,
    /// Seed of the hypothesis sampler.
    pub seed: u64,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            detector: Detector::Sbnd {
                use_uncoated_pmt: false,
            },
            drift_distance: 200.0,
            distance_bins: 40,
            axes: MetricAxes::default(),
            skew_limit_y: 10.0,
            skew_limit_z: 10.0,
            skew_low_limit: 0.05,
            correction_skew_limit: 10.0,
            correction_degree: 2,
            correction_fit: CorrectionFit::Points,
            min_projection_entries: 100,
            spread_policy: SpreadPolicy::AdjacentBin,
            profile_errors: ProfileErrors::Spread,
            band_degree: 3,
            score_axis: ScoreAxis::default(),
            global_x: GlobalXRange::SBND,
            parallel: true,
            seed: 0,
        }
    }
}

impl TemplateConfig {
    /// SBND defaults.
    #[must_use]
    pub fn sbnd() -> Self {
        Self::default()
    }

    /// ICARUS defaults for one cryostat.
    #[must_use]
    pub fn icarus(cryostat: u8) -> Self {
        Self {
            detector: Detector::Icarus {
                cryostat,
                use_opposite_volume: false,
            },
            drift_distance: 148.2,
            distance_bins: 30,
            global_x: GlobalXRange::icarus(cryostat),
            ..Self::default()
        }
    }

    /// Set the detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    /// Set drift distance and number of distance bins.
    #[must_use]
    pub fn with_drift(mut self, drift_distance: f64, distance_bins: usize) -> Self {
        self.drift_distance = drift_distance;
        self.distance_bins = distance_bins;
        self
    }

    /// Set the metric axes.
    #[must_use]
    pub fn with_axes(mut self, axes: MetricAxes) -> Self {
        self.axes = axes;
        self
    }

    /// Set the upper skew limits of the y and z correction fits.
    #[must_use]
    pub fn with_skew_limits(mut self, y: f64, z: f64) -> Self {
        self.skew_limit_y = y;
        self.skew_limit_z = z;
        self
    }

    /// Set the spread policy.
    #[must_use]
    pub fn with_spread_policy(mut self, policy: SpreadPolicy) -> Self {
        self.spread_policy = policy;
        self
    }

    /// Set the profile error mode.
    #[must_use]
    pub fn with_profile_errors(mut self, errors: ProfileErrors) -> Self {
        self.profile_errors = errors;
        self
    }

    /// Set the correction fit mode.
    #[must_use]
    pub fn with_correction_fit(mut self, fit: CorrectionFit) -> Self {
        self.correction_fit = fit;
        self
    }

    /// Set the minimum projection entries of the hypothesis sampler.
    #[must_use]
    pub fn with_min_projection_entries(mut self, entries: u64) -> Self {
        self.min_projection_entries = entries;
        self
    }

    /// Set the global x extent of the score scatter plots.
    #[must_use]
    pub fn with_global_x(mut self, low: f64, high: f64) -> Self {
        self.global_x = GlobalXRange { low, high };
        self
    }

    /// Enable or disable parallel accumulation.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the sampler seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Distance binning described by this configuration.
    #[must_use]
    pub fn binning(&self) -> DistanceBinning {
        DistanceBinning::new(self.drift_distance, self.distance_bins)
    }

    /// Upper skew limit of the correction fit along `axis`.
    #[must_use]
    pub fn skew_limit(&self, axis: crate::OffsetAxis) -> f64 {
        match axis {
            crate::OffsetAxis::Y => self.skew_limit_y,
            crate::OffsetAxis::Z => self.skew_limit_z,
        }
    }

    /// Range sanity checks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.drift_distance.is_finite() && self.drift_distance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "drift_distance must be positive, got {}",
                self.drift_distance
            )));
        }
        if self.distance_bins == 0 {
            return Err(Error::InvalidConfig("distance_bins must be > 0".into()));
        }
        for metric in Metric::ALL {
            let axis = self.axes.get(metric);
            if axis.bins == 0 {
                return Err(Error::InvalidConfig(format!("{metric}: bins must be > 0")));
            }
            if !(axis.low < axis.high) {
                return Err(Error::InvalidConfig(format!(
                    "{metric}: low ({}) must be below high ({})",
                    axis.low, axis.high
                )));
            }
            if !(axis.profile_scale > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{metric}: profile_scale must be positive"
                )));
            }
        }
        if !(self.skew_low_limit >= 0.0
            && self.skew_low_limit < self.skew_limit_y
            && self.skew_low_limit < self.skew_limit_z)
        {
            return Err(Error::InvalidConfig(format!(
                "skew limits must satisfy 0 <= low ({}) < high (y: {}, z: {})",
                self.skew_low_limit, self.skew_limit_y, self.skew_limit_z
            )));
        }
        if !(self.correction_skew_limit > 0.0) {
            return Err(Error::InvalidConfig(
                "correction_skew_limit must be positive".into(),
            ));
        }
        if self.score_axis.bins == 0 || !(self.score_axis.low < self.score_axis.high) {
            return Err(Error::InvalidConfig("score_axis is empty".into()));
        }
        if !(self.global_x.low < self.global_x.high) {
            return Err(Error::InvalidConfig(format!(
                "global_x: low ({}) must be below high ({})",
                self.global_x.low, self.global_x.high
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(TemplateConfig::default().validate().is_ok());
        assert!(TemplateConfig::icarus(1).validate().is_ok());
    }

    #[test]
    fn test_ratio_term_follows_detector_flag() {
        assert!(!TemplateConfig::sbnd().detector.scores_ratio());
        let sbnd = Detector::Sbnd {
            use_uncoated_pmt: true,
        };
        assert!(sbnd.scores_ratio());
        let icarus = Detector::Icarus {
            cryostat: 0,
            use_opposite_volume: true,
        };
        assert!(icarus.scores_ratio());
        assert_eq!(icarus.name(), "icarus");
    }

    #[test]
    fn test_profile_window_scale() {
        let axes = MetricAxes::default();
        assert_eq!(axes.dy.profile_window(), (-200.0, 200.0));
        assert_eq!(axes.dz.profile_window(), (-250.0, 250.0));
        assert_eq!(axes.rr.profile_window(), (0.0, 200.0));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = TemplateConfig::default().with_drift(0.0, 40);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut axes = MetricAxes::default();
        axes.petoq = MetricAxis::new(10, 5.0, 1.0);
        let config = TemplateConfig::default().with_axes(axes);
        assert!(config.validate().is_err());

        let config = TemplateConfig::default().with_skew_limits(0.01, 10.0);
        assert!(config.validate().is_err());

        let config = TemplateConfig::default().with_global_x(50.0, -50.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_global_x_follows_cryostat() {
        assert_eq!(TemplateConfig::sbnd().global_x, GlobalXRange::SBND);
        let east = TemplateConfig::icarus(0).global_x;
        let west = TemplateConfig::icarus(1).global_x;
        assert!(east.high < 0.0 && east.low < east.high);
        assert!(west.low > 0.0 && west.low < west.high);
    }

    #[test]
    fn test_metric_indices_follow_table_order() {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }
}
