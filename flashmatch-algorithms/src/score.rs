//! Match score of a charge/flash pair against the per-bin templates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::correction::PolynomialCorrection;
use crate::statistics::ProfileStatistics;
use flashmatch_core::{
    DistanceBinning, Error, Metric, OffsetAxis, Result, SliceEvent, SpreadPolicy,
};
use log::warn;

/// Spreads at or below this are treated as degenerate.
pub const MIN_SPREAD: f64 = 1e-8;

/// The six derived template tables, indexed by [`Metric`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemplateTables {
    tables: Vec<ProfileStatistics>,
}

impl TemplateTables {
    /// Assemble from one table per metric, in any order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] unless every metric appears exactly
    /// once and all tables share one binning.
    pub fn new(mut tables: Vec<ProfileStatistics>) -> Result<Self> {
        tables.sort_by_key(ProfileStatistics::metric);
        let metrics: Vec<Metric> = tables.iter().map(ProfileStatistics::metric).collect();
        if metrics != Metric::ALL {
            return Err(Error::InvalidConfig(format!(
                "expected one table per metric, got {metrics:?}"
            )));
        }
        let binning = *tables[0].binning();
        if tables.iter().any(|t| *t.binning() != binning) {
            return Err(Error::InvalidConfig(
                "template tables use different distance binnings".into(),
            ));
        }
        Ok(Self { tables })
    }

    /// Table of `metric`.
    #[must_use]
    pub fn get(&self, metric: Metric) -> &ProfileStatistics {
        &self.tables[metric.index()]
    }

    /// All tables in [`Metric::ALL`] order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &ProfileStatistics> {
        self.tables.iter()
    }

    /// Shared distance binning.
    #[must_use]
    pub fn binning(&self) -> &DistanceBinning {
        self.tables[0].binning()
    }
}

/// The y and z bias corrections.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Corrections {
    /// Correction of the flash y barycenter.
    pub y: PolynomialCorrection,
    /// Correction of the flash z barycenter.
    pub z: PolynomialCorrection,
}

impl Corrections {
    /// Correction for `axis`.
    #[must_use]
    pub fn get(&self, axis: OffsetAxis) -> &PolynomialCorrection {
        match axis {
            OffsetAxis::Y => &self.y,
            OffsetAxis::Z => &self.z,
        }
    }

    /// Flash barycenter along `axis` with the bias removed.
    #[must_use]
    pub fn corrected_flash(&self, event: &SliceEvent, axis: OffsetAxis, hypothesis: f64) -> f64 {
        event.flash_position(axis) - self.get(axis).apply(event.skew(axis), hypothesis)
    }
}

/// Observed value of every metric, in [`Metric::ALL`] order, given the
/// corrected flash barycenter.
#[must_use]
pub fn observed_metrics(event: &SliceEvent, corrected_y: f64, corrected_z: f64) -> [f64; 6] {
    [
        corrected_y - event.charge_y,
        corrected_z - event.charge_z,
        event.flash_rr,
        event.flash_ratio,
        event.slope_offset(),
        event.petoq,
    ]
}

/// Mean and spread used for one metric in one distance bin.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Usable { mean: f64, spread: f64 },
    Substituted { mean: f64, spread: f64, from: usize },
    /// No bin of the table is usable; the term is left out of the score.
    Unavailable,
    Degenerate,
}

/// Contribution of one metric to a score.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricTerm {
    /// Metric.
    pub metric: Metric,
    /// Observed value.
    pub observed: f64,
    /// Template mean of the bin.
    pub mean: f64,
    /// Template spread of the bin (possibly borrowed).
    pub spread: f64,
    /// `|observed - mean| / spread`.
    pub term: f64,
    /// Whether the term enters the score.
    pub included: bool,
    /// Distance bin the spread was borrowed from, if any.
    pub substituted_from: Option<usize>,
    /// True if no bin of the table had a usable spread. The term is then
    /// NaN and left out of the score.
    pub unavailable: bool,
}

/// Full diagnostic record of one scored event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreRecord {
    /// Row of the event in the sample.
    pub index: usize,
    /// Distance bin of the charge.
    pub distance_bin: usize,
    /// Charge drift distance.
    pub charge_x: f64,
    /// Charge global x.
    pub charge_x_gl: f64,
    /// Drift-position hypothesis used for the corrections (NaN if none).
    pub hypothesis: f64,
    /// Corrected flash y barycenter.
    pub corrected_flash_y: f64,
    /// Corrected flash z barycenter.
    pub corrected_flash_z: f64,
    /// Per-metric terms in [`Metric::ALL`] order.
    pub terms: [MetricTerm; 6],
    /// Sum of the included terms.
    pub score: f64,
    /// Score carried by the input row, if any.
    pub previous_score: Option<f64>,
}

impl ScoreRecord {
    /// Term of `metric`.
    #[must_use]
    pub fn term(&self, metric: Metric) -> &MetricTerm {
        &self.terms[metric.index()]
    }

    /// True if any spread was borrowed from another bin or a term had to
    /// be left out.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.terms
            .iter()
            .any(|t| t.substituted_from.is_some() || t.unavailable)
    }
}

/// Scores events against fixed templates and corrections.
///
/// Spread substitutions are resolved once, when the engine is built, and
/// logged once per metric and bin.
pub struct ScoreEngine<'a> {
    tables: &'a TemplateTables,
    corrections: &'a Corrections,
    include_ratio: bool,
    resolved: Vec<Vec<Resolution>>,
}

impl<'a> ScoreEngine<'a> {
    /// Build an engine. `include_ratio` adds the ratio metric to the score.
    #[must_use]
    pub fn new(
        tables: &'a TemplateTables,
        corrections: &'a Corrections,
        policy: SpreadPolicy,
        include_ratio: bool,
    ) -> Self {
        let resolved = Metric::ALL
            .iter()
            .map(|&metric| resolve_table(tables.get(metric), policy))
            .collect();
        Self {
            tables,
            corrections,
            include_ratio,
            resolved,
        }
    }

    /// Score one event given its drift-position hypothesis.
    ///
    /// Returns `Ok(None)` for events failing the quality filter.
    ///
    /// # Errors
    /// Returns [`Error::DegenerateSpread`] when a needed bin has no usable
    /// spread and the policy is [`SpreadPolicy::Fail`].
    pub fn score(
        &self,
        index: usize,
        event: &SliceEvent,
        hypothesis: f64,
    ) -> Result<Option<ScoreRecord>> {
        if !event.passes_quality() {
            return Ok(None);
        }
        let bin = self.tables.binning().bin_of(event.charge_x);
        let corrected_flash_y = self
            .corrections
            .corrected_flash(event, OffsetAxis::Y, hypothesis);
        let corrected_flash_z = self
            .corrections
            .corrected_flash(event, OffsetAxis::Z, hypothesis);
        let observed = observed_metrics(event, corrected_flash_y, corrected_flash_z);

        let mut terms = [MetricTerm {
            metric: Metric::Dy,
            observed: 0.0,
            mean: 0.0,
            spread: 0.0,
            term: 0.0,
            included: false,
            substituted_from: None,
            unavailable: false,
        }; 6];
        let mut score = 0.0;
        for metric in Metric::ALL {
            let value = observed[metric.index()];
            let (mean, spread, substituted_from) = match self.resolved[metric.index()][bin] {
                Resolution::Usable { mean, spread } => (mean, spread, None),
                Resolution::Substituted { mean, spread, from } => (mean, spread, Some(from)),
                Resolution::Unavailable => {
                    terms[metric.index()] = MetricTerm {
                        metric,
                        observed: value,
                        mean: f64::NAN,
                        spread: f64::NAN,
                        term: f64::NAN,
                        included: false,
                        substituted_from: None,
                        unavailable: true,
                    };
                    continue;
                }
                Resolution::Degenerate => {
                    return Err(Error::DegenerateSpread {
                        metric: metric.name(),
                        bin,
                    })
                }
            };
            let term = (value - mean).abs() / spread;
            let included = metric != Metric::Ratio || self.include_ratio;
            if included {
                score += term;
            }
            terms[metric.index()] = MetricTerm {
                metric,
                observed: value,
                mean,
                spread,
                term,
                included,
                substituted_from,
                unavailable: false,
            };
        }

        Ok(Some(ScoreRecord {
            index,
            distance_bin: bin,
            charge_x: event.charge_x,
            charge_x_gl: event.charge_x_gl,
            hypothesis,
            corrected_flash_y,
            corrected_flash_z,
            terms,
            score,
            previous_score: event.score,
        }))
    }
}

fn usable(table: &ProfileStatistics, bin: usize) -> Option<(f64, f64)> {
    table
        .get(bin)
        .filter(|s| s.spread > MIN_SPREAD && s.spread.is_finite())
        .map(|s| (s.mean, s.spread))
}

fn resolve_table(table: &ProfileStatistics, policy: SpreadPolicy) -> Vec<Resolution> {
    let n = table.len();
    let outward = |bin: usize| {
        (1..n)
            .flat_map(move |d| [bin.checked_add(d), bin.checked_sub(d)])
            .flatten()
            .filter(move |&b| b < n)
    };
    (0..n)
        .map(|bin| {
            if let Some((mean, spread)) = usable(table, bin) {
                return Resolution::Usable { mean, spread };
            }
            let candidates: Vec<usize> = match policy {
                SpreadPolicy::Fail => return Resolution::Degenerate,
                SpreadPolicy::AdjacentBin => {
                    let adjacent = if bin + 1 < n { bin + 1 } else { bin.saturating_sub(1) };
                    std::iter::once(adjacent)
                        .chain(outward(bin).filter(|&b| b != adjacent))
                        .filter(|&b| b != bin)
                        .collect()
                }
                SpreadPolicy::NearestPopulated => outward(bin).collect(),
            };
            let spread_before = table.get(bin).map_or(f64::NAN, |s| s.spread);
            for (rank, from) in candidates.into_iter().enumerate() {
                if let Some((other_mean, spread)) = usable(table, from) {
                    let mean = table.get(bin).map_or(other_mean, |s| s.mean);
                    if policy == SpreadPolicy::AdjacentBin && rank > 0 {
                        warn!(
                            "zero spread for {} in distance bin {bin} and its neighbour; \
                             using spread {spread} of nearest usable bin {from}",
                            table.metric()
                        );
                    } else {
                        warn!(
                            "zero spread for {} in distance bin {bin} (spread {spread_before}); \
                             using spread {spread} of bin {from}",
                            table.metric()
                        );
                    }
                    return Resolution::Substituted { mean, spread, from };
                }
            }
            warn!(
                "no distance bin of {} has a usable spread; term left out of the score",
                table.metric()
            );
            Resolution::Unavailable
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyfit::Polynomial;
    use crate::statistics::BinnedStatistics;
    use approx::assert_relative_eq;
    use flashmatch_core::{MetricAxis, ProfileErrors};

    fn binning() -> DistanceBinning {
        DistanceBinning::new(100.0, 4)
    }

    fn event(charge_x: f64) -> SliceEvent {
        SliceEvent {
            slices: 1,
            true_nus: 1,
            mc_t0: 0.3,
            charge_x,
            charge_y: 10.0,
            charge_z: 50.0,
            flash_yb: 12.0,
            flash_zb: 49.0,
            y_skew: 0.2,
            z_skew: -0.4,
            flash_slope: 0.3,
            charge_slope: 0.1,
            flash_rr: 40.0,
            flash_ratio: 0.5,
            petoq: 1.0,
            ..SliceEvent::default()
        }
    }

    /// Tables where every metric has mean `m` and spread 1 in the given
    /// bins; the others stay empty.
    fn tables(populated: &[usize]) -> TemplateTables {
        let axis = MetricAxis::new(10, -1000.0, 1000.0);
        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let mut stats = BinnedStatistics::new(metric, binning(), &axis);
                for &bin in populated {
                    let x = binning().center(bin);
                    // values m-1 and m+1: mean m, spread 1
                    let m = f64::from(u8::try_from(metric.index()).unwrap());
                    stats.accumulate(x, m - 1.0);
                    stats.accumulate(x, m + 1.0);
                }
                stats.derive(ProfileErrors::Spread)
            })
            .collect();
        TemplateTables::new(tables).unwrap()
    }

    fn zero_corrections() -> Corrections {
        Corrections {
            y: PolynomialCorrection::new("y", Polynomial::zero(2), 10.0),
            z: PolynomialCorrection::new("z", Polynomial::zero(2), 10.0),
        }
    }

    #[test]
    fn test_score_sums_normalized_deviations() {
        let tables = tables(&[0, 1, 2, 3]);
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(7, &event(30.0), 80.0).unwrap().unwrap();
        assert_eq!(record.index, 7);
        assert_eq!(record.distance_bin, 1);
        // dy = 2, mean 0 -> 2; dz = -1, mean 1 -> 2; rr 40 vs 2 -> 38;
        // ratio excluded; slope 0.2 vs 4 -> 3.8; petoq 1 vs 5 -> 4
        assert_relative_eq!(record.term(Metric::Dy).term, 2.0);
        assert_relative_eq!(record.term(Metric::Dz).term, 2.0);
        assert_relative_eq!(record.term(Metric::Rr).term, 38.0);
        assert!(!record.term(Metric::Ratio).included);
        assert_relative_eq!(record.term(Metric::Ratio).term, 2.5);
        assert_relative_eq!(record.term(Metric::Slope).term, 3.8, epsilon = 1e-12);
        assert_relative_eq!(record.term(Metric::Petoq).term, 4.0);
        assert_relative_eq!(record.score, 2.0 + 2.0 + 38.0 + 3.8 + 4.0, epsilon = 1e-12);
        assert!(!record.used_fallback());
    }

    #[test]
    fn test_ratio_term_included_on_flag() {
        let tables = tables(&[0, 1, 2, 3]);
        let corrections = zero_corrections();
        let without = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false)
            .score(0, &event(30.0), 80.0)
            .unwrap()
            .unwrap();
        let with = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, true)
            .score(0, &event(30.0), 80.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(with.score - without.score, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_corrections_shift_the_offsets() {
        let tables = tables(&[0, 1, 2, 3]);
        let corrections = Corrections {
            y: PolynomialCorrection::new("y", Polynomial::new(vec![10.0]), 10.0),
            z: PolynomialCorrection::new("z", Polynomial::zero(0), 10.0),
        };
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(30.0), 80.0).unwrap().unwrap();
        // flash_yb 12 - 0.2 * 10 = 10
        assert_relative_eq!(record.corrected_flash_y, 10.0);
        assert_relative_eq!(record.term(Metric::Dy).observed, 0.0);

        let undefined = engine.score(0, &event(30.0), f64::NAN).unwrap().unwrap();
        assert_relative_eq!(undefined.corrected_flash_y, 12.0);
    }

    #[test]
    fn test_failing_event_yields_no_record() {
        let tables = tables(&[0, 1, 2, 3]);
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let bad = SliceEvent {
            slices: 2,
            ..event(30.0)
        };
        assert!(engine.score(0, &bad, 80.0).unwrap().is_none());
    }

    #[test]
    fn test_empty_bin_falls_back_to_next_bin_and_stays_finite() {
        let tables = tables(&[0, 2, 3]);
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(30.0), 80.0).unwrap().unwrap();
        assert!(record.score.is_finite());
        assert!(record.used_fallback());
        for term in &record.terms {
            assert_eq!(term.substituted_from, Some(2));
            assert!(term.spread > 0.0);
        }
    }

    #[test]
    fn test_last_bin_falls_back_downward() {
        let tables = tables(&[0, 1, 2]);
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(99.0), 80.0).unwrap().unwrap();
        assert_eq!(record.term(Metric::Rr).substituted_from, Some(2));
        assert!(record.score.is_finite());
    }

    #[test]
    fn test_policies_on_sparse_tables() {
        let tables = tables(&[3]);
        let corrections = zero_corrections();

        let fail = ScoreEngine::new(&tables, &corrections, SpreadPolicy::Fail, false);
        assert!(matches!(
            fail.score(0, &event(5.0), 80.0),
            Err(Error::DegenerateSpread { bin: 0, .. })
        ));

        // bin 1 is empty too: the nearest usable bin lends its spread
        let adjacent = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = adjacent.score(0, &event(5.0), 80.0).unwrap().unwrap();
        assert_eq!(record.term(Metric::Dy).substituted_from, Some(3));
        assert!(record.score.is_finite());

        let nearest =
            ScoreEngine::new(&tables, &corrections, SpreadPolicy::NearestPopulated, false);
        let record = nearest.score(0, &event(5.0), 80.0).unwrap().unwrap();
        assert_eq!(record.term(Metric::Dy).substituted_from, Some(3));
        assert!(record.score.is_finite());
    }

    #[test]
    fn test_single_entry_bin_keeps_its_mean() {
        let axis = MetricAxis::new(10, -100.0, 100.0);
        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let mut stats = BinnedStatistics::new(metric, binning(), &axis);
                stats.accumulate(10.0, 7.0); // bin 0: one entry, zero spread
                stats.accumulate(30.0, 0.0);
                stats.accumulate(30.0, 2.0);
                stats.derive(ProfileErrors::Spread)
            })
            .collect();
        let tables = TemplateTables::new(tables).unwrap();
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(10.0), 80.0).unwrap().unwrap();
        let petoq = record.term(Metric::Petoq);
        assert_relative_eq!(petoq.mean, 7.0);
        assert_relative_eq!(petoq.spread, 1.0);
        assert_relative_eq!(petoq.term, 6.0);
    }

    #[test]
    fn test_tables_require_every_metric() {
        let axis = MetricAxis::new(10, 0.0, 1.0);
        let only_rr = vec![BinnedStatistics::new(Metric::Rr, binning(), &axis)
            .derive(ProfileErrors::Spread)];
        assert!(TemplateTables::new(only_rr).is_err());
    }

    /// Tables where bins 0 and 1 hold a single entry each (zero spread).
    fn tables_with_single_entry_neighbours() -> TemplateTables {
        let axis = MetricAxis::new(10, -100.0, 100.0);
        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let mut stats = BinnedStatistics::new(metric, binning(), &axis);
                stats.accumulate(10.0, 3.0);
                stats.accumulate(30.0, 4.0);
                for x in [60.0, 80.0] {
                    stats.accumulate(x, 0.0);
                    stats.accumulate(x, 2.0);
                }
                stats.derive(ProfileErrors::Spread)
            })
            .collect();
        TemplateTables::new(tables).unwrap()
    }

    #[test]
    fn test_adjacent_policy_skips_degenerate_neighbour() {
        let tables = tables_with_single_entry_neighbours();
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(10.0), 80.0).unwrap().unwrap();
        let petoq = record.term(Metric::Petoq);
        assert_eq!(petoq.substituted_from, Some(2));
        assert_relative_eq!(petoq.mean, 3.0);
        assert_relative_eq!(petoq.spread, 1.0);
        assert!(record.score.is_finite());

        let record = engine.score(0, &event(30.0), 80.0).unwrap().unwrap();
        assert_eq!(record.term(Metric::Petoq).substituted_from, Some(2));

        let strict = ScoreEngine::new(&tables, &corrections, SpreadPolicy::Fail, false);
        assert!(strict.score(0, &event(10.0), 80.0).is_err());
    }

    #[test]
    fn test_table_without_usable_bin_drops_the_term() {
        let axis = MetricAxis::new(10, -100.0, 100.0);
        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let mut stats = BinnedStatistics::new(metric, binning(), &axis);
                stats.accumulate(10.0, 1.0);
                if metric != Metric::Slope {
                    stats.accumulate(10.0, 3.0);
                }
                stats.derive(ProfileErrors::Spread)
            })
            .collect();
        let tables = TemplateTables::new(tables).unwrap();
        let corrections = zero_corrections();
        let engine = ScoreEngine::new(&tables, &corrections, SpreadPolicy::AdjacentBin, false);
        let record = engine.score(0, &event(10.0), 80.0).unwrap().unwrap();
        let slope = record.term(Metric::Slope);
        assert!(slope.unavailable && !slope.included);
        assert!(slope.term.is_nan());
        assert!(record.score.is_finite());
        assert!(record.used_fallback());
    }
}
