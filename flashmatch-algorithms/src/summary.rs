//! Distribution of match scores over a run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::histogram::{Histogram1D, Histogram2D, ScatterHistogram, ValueAxis};
use crate::score::ScoreRecord;
use flashmatch_core::TemplateConfig;

/// Score histograms and counters.
///
/// Every scatter plot cuts its score axis to three fifths of the summary
/// range.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreSummary {
    /// Match-score distribution.
    pub scores: Histogram1D,
    /// Score against charge drift distance.
    pub scatter: Histogram2D,
    /// Score against charge global x.
    pub global_scatter: ScatterHistogram,
    /// Score carried by the input rows against charge global x. Only rows
    /// with a previous score are filled.
    pub previous_scatter: ScatterHistogram,
    /// Events scored.
    pub scored: usize,
    /// Events scored with at least one borrowed spread.
    pub with_fallback: usize,
}

impl ScoreSummary {
    /// Create empty histograms for `config`.
    #[must_use]
    pub fn new(config: &TemplateConfig) -> Self {
        let axis = &config.score_axis;
        let scatter_axis = ValueAxis::new(axis.bins, axis.low, axis.high * 3.0 / 5.0);
        let global_axis = ValueAxis::new(
            2 * config.distance_bins,
            config.global_x.low,
            config.global_x.high,
        );
        Self {
            scores: Histogram1D::new(ValueAxis::new(axis.bins, axis.low, axis.high)),
            scatter: Histogram2D::new(config.binning(), scatter_axis),
            global_scatter: ScatterHistogram::new(global_axis, scatter_axis),
            previous_scatter: ScatterHistogram::new(global_axis, scatter_axis),
            scored: 0,
            with_fallback: 0,
        }
    }

    /// Add one record.
    pub fn record(&mut self, record: &ScoreRecord) {
        self.scores.fill(record.score);
        self.scatter.fill(record.charge_x, record.score);
        self.global_scatter.fill(record.charge_x_gl, record.score);
        if let Some(previous) = record.previous_score {
            self.previous_scatter.fill(record.charge_x_gl, previous);
        }
        self.scored += 1;
        if record.used_fallback() {
            self.with_fallback += 1;
        }
    }

    /// Mean of the in-range scores.
    #[must_use]
    pub fn mean_score(&self) -> Option<f64> {
        self.scores.mean()
    }
}

impl<'a> Extend<&'a ScoreRecord> for ScoreSummary {
    fn extend<I: IntoIterator<Item = &'a ScoreRecord>>(&mut self, iter: I) {
        for record in iter {
            self.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::MetricTerm;
    use approx::assert_relative_eq;
    use flashmatch_core::Metric;

    fn record(charge_x_gl: f64, score: f64, previous_score: Option<f64>) -> ScoreRecord {
        let term = |metric| MetricTerm {
            metric,
            observed: 0.0,
            mean: 0.0,
            spread: 1.0,
            term: 0.0,
            included: true,
            substituted_from: None,
            unavailable: false,
        };
        ScoreRecord {
            index: 0,
            distance_bin: 0,
            charge_x: charge_x_gl.abs(),
            charge_x_gl,
            hypothesis: f64::NAN,
            corrected_flash_y: 0.0,
            corrected_flash_z: 0.0,
            terms: Metric::ALL.map(term),
            score,
            previous_score,
        }
    }

    #[test]
    fn test_scatters_share_the_cut_score_axis() {
        let config = TemplateConfig::sbnd().with_drift(200.0, 10);
        let summary = ScoreSummary::new(&config);
        assert_relative_eq!(summary.scores.axis().high(), 100.0);
        assert_relative_eq!(summary.scatter.axis().high(), 60.0);
        assert_relative_eq!(summary.global_scatter.y_axis().high(), 60.0);
        let x = summary.global_scatter.x_axis();
        assert_eq!(x.bins(), 20);
        assert_relative_eq!(x.low(), -215.0);
        assert_relative_eq!(x.high(), 215.0);
    }

    #[test]
    fn test_previous_scores_fill_only_when_present() {
        let config = TemplateConfig::sbnd().with_drift(200.0, 10);
        let mut summary = ScoreSummary::new(&config);
        let records = [
            record(-100.0, 4.0, Some(6.0)),
            record(100.0, 5.0, None),
            record(30.0, 7.0, Some(2.0)),
        ];
        summary.extend(&records);

        assert_eq!(summary.scored, 3);
        assert_eq!(summary.with_fallback, 0);
        assert_eq!(summary.global_scatter.entries(), 3);
        assert_eq!(summary.previous_scatter.entries(), 2);
        // Bin centres of 0.5-wide bins: 4.25, 5.25 and 7.25.
        assert_relative_eq!(summary.mean_score().unwrap(), 16.75 / 3.0, epsilon = 1e-9);

        let x = *summary.previous_scatter.x_axis();
        let y = *summary.previous_scatter.y_axis();
        let cell = |gl: f64, s: f64| {
            summary
                .previous_scatter
                .get(x.slot_of(gl).unwrap(), y.slot_of(s).unwrap())
        };
        assert_eq!(cell(-100.0, 6.0), Some(1));
        assert_eq!(cell(100.0, 5.0), Some(0));
    }

    #[test]
    fn test_fallback_records_are_counted() {
        let config = TemplateConfig::sbnd();
        let mut summary = ScoreSummary::new(&config);
        let mut borrowed = record(0.0, 3.0, None);
        borrowed.terms[Metric::Dy.index()].substituted_from = Some(4);
        summary.record(&borrowed);
        summary.record(&record(0.0, 3.0, None));
        assert_eq!(summary.scored, 2);
        assert_eq!(summary.with_fallback, 1);
    }
}
