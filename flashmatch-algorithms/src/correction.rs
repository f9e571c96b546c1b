//! Skew-scaled polynomial corrections of the flash barycenter.
//!
//! The flash barycenter is biased along y and z in proportion to the flash
//! skew, with a coefficient that varies with drift distance. The bias is
//! modelled as `skew · P(x)` where `P` is fit to `offset / skew` against
//! the drift-position hypothesis `x`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hypothesis::Hypothesis;
use crate::polyfit::Polynomial;
use crate::statistics::Profile;
use flashmatch_core::{
    CorrectionFit, DistanceBinning, Error, OffsetAxis, ProfileErrors, Result, SliceEvent,
    TemplateConfig,
};
use log::{debug, info};

/// Significant figures of the reported coefficients.
pub const REPORTED_SIG_FIGS: u32 = 3;

/// Skew above which no correction is applied, unless configured otherwise.
pub const DEFAULT_SKEW_HIGH_LIMIT: f64 = 10.0;

/// Open interval of admissible `|skew|` for the fit selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewWindow {
    /// Exclusive lower bound on `|skew|`.
    pub low: f64,
    /// Exclusive upper bound on `|skew|`.
    pub high: f64,
}

impl SkewWindow {
    /// True if `low < |skew| < high`.
    #[must_use]
    pub fn admits(&self, skew: f64) -> bool {
        let s = skew.abs();
        self.low < s && s < self.high
    }
}

/// A fitted bias correction for one directional offset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolynomialCorrection {
    label: String,
    polynomial: Polynomial,
    skew_high_limit: f64,
    selected: usize,
}

impl PolynomialCorrection {
    /// Build a correction from known coefficients.
    #[must_use]
    pub fn new(label: impl Into<String>, polynomial: Polynomial, skew_high_limit: f64) -> Self {
        Self {
            label: label.into(),
            polynomial,
            skew_high_limit,
            selected: 0,
        }
    }

    /// Offset the correction applies to.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Full-precision polynomial, the one [`apply`](Self::apply) evaluates.
    #[must_use]
    pub fn polynomial(&self) -> &Polynomial {
        &self.polynomial
    }

    /// Coefficients rounded for reporting.
    #[must_use]
    pub fn reported(&self) -> Polynomial {
        self.polynomial.rounded(REPORTED_SIG_FIGS)
    }

    /// Events that entered the fit.
    #[must_use]
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Skew above which the correction is zero.
    #[must_use]
    pub fn skew_high_limit(&self) -> f64 {
        self.skew_high_limit
    }

    /// `skew · P(hypothesis)`, or 0 if `|skew|` exceeds the limit or either
    /// input is NaN.
    #[must_use]
    pub fn apply(&self, skew: f64, hypothesis: f64) -> f64 {
        if hypothesis.is_nan() || skew.is_nan() || skew.abs() > self.skew_high_limit {
            return 0.0;
        }
        skew * self.polynomial.eval(hypothesis)
    }
}

/// Fits [`PolynomialCorrection`]s from the matched sample.
#[derive(Debug, Clone)]
pub struct BiasCorrector {
    degree: usize,
    mode: CorrectionFit,
    binning: DistanceBinning,
    apply_limit: f64,
}

impl BiasCorrector {
    /// Create a corrector fitting polynomials of `degree` over the distance
    /// range of `binning`.
    #[must_use]
    pub fn new(degree: usize, mode: CorrectionFit, binning: DistanceBinning) -> Self {
        Self {
            degree,
            mode,
            binning,
            apply_limit: DEFAULT_SKEW_HIGH_LIMIT,
        }
    }

    /// Corrector configured from a template configuration.
    #[must_use]
    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(config.correction_degree, config.correction_fit, config.binning())
            .with_apply_limit(config.correction_skew_limit)
    }

    /// Set the skew above which fitted corrections apply no correction.
    #[must_use]
    pub fn with_apply_limit(mut self, limit: f64) -> Self {
        self.apply_limit = limit;
        self
    }

    /// Fit `offset / skew` against the hypothesis.
    ///
    /// Only events passing the quality filter, with `skew` admitted by
    /// `window` and a defined hypothesis inside the distance range enter
    /// the fit. `hypotheses` is indexed like `events`.
    ///
    /// # Errors
    /// Returns [`Error::UnfittableCorrection`] if too few events survive the
    /// selection or the fit is singular.
    pub fn fit<O, S>(
        &self,
        label: &str,
        events: &[SliceEvent],
        hypotheses: &[Hypothesis],
        offset: O,
        skew: S,
        window: SkewWindow,
    ) -> Result<PolynomialCorrection>
    where
        O: Fn(&SliceEvent) -> f64,
        S: Fn(&SliceEvent) -> f64,
    {
        let range = 0.0..self.binning.drift_distance();
        let points: Vec<(f64, f64)> = events
            .iter()
            .zip(hypotheses)
            .filter(|(event, _)| event.passes_quality())
            .filter_map(|(event, hypothesis)| {
                let s = skew(event);
                let x = hypothesis.value();
                if !window.admits(s) || !range.contains(&x) {
                    return None;
                }
                let y = offset(event) / s;
                y.is_finite().then_some((x, y))
            })
            .collect();
        let selected = points.len();
        debug!("{label} correction: {selected} events selected");

        let unfittable = |selected: usize| Error::UnfittableCorrection {
            offset: label.to_string(),
            selected,
            required: self.degree + 1,
        };
        let polynomial = match self.mode {
            CorrectionFit::Points => {
                if selected <= self.degree {
                    return Err(unfittable(selected));
                }
                Polynomial::fit(&points, self.degree).map_err(|_| unfittable(selected))?
            }
            CorrectionFit::Profile => {
                let profile_points = self.profile_points(&points);
                if profile_points.len() <= self.degree {
                    return Err(unfittable(profile_points.len()));
                }
                Polynomial::fit_weighted(&profile_points, self.degree)
                    .map_err(|_| unfittable(selected))?
            }
        };

        info!(
            "{label} correction fit on {selected} events, coefficients {:?}",
            polynomial.rounded(REPORTED_SIG_FIGS).coefficients()
        );
        Ok(PolynomialCorrection {
            label: label.to_string(),
            polynomial,
            skew_high_limit: self.apply_limit,
            selected,
        })
    }

    /// Fit the correction of a flash-minus-charge offset along `axis`.
    ///
    /// # Errors
    /// See [`fit`](Self::fit).
    pub fn fit_axis(
        &self,
        events: &[SliceEvent],
        hypotheses: &[Hypothesis],
        axis: OffsetAxis,
        window: SkewWindow,
    ) -> Result<PolynomialCorrection> {
        self.fit(
            axis.name(),
            events,
            hypotheses,
            |e| e.raw_offset(axis),
            |e| e.skew(axis),
            window,
        )
    }

    /// Per-bin means of the points, weighted by their inverse squared
    /// error of the mean. Bins with fewer than two entries or no spread
    /// are skipped.
    fn profile_points(&self, points: &[(f64, f64)]) -> Vec<(f64, f64, f64)> {
        let mut profile = Profile::unbounded(self.binning);
        for &(x, y) in points {
            profile.fill(x, y);
        }
        profile
            .statistics(ProfileErrors::ErrorOfMean)
            .iter()
            .enumerate()
            .filter_map(|(bin, stat)| {
                let stat = stat.as_ref()?;
                (stat.entries >= 2 && stat.spread > 0.0).then(|| {
                    (
                        self.binning.center(bin),
                        stat.mean,
                        1.0 / (stat.spread * stat.spread),
                    )
                })
            })
            .collect()
    }
}
