//! Staged template generation.
//!
//! A run moves through stage types, each consuming the previous one:
//!
//! ```text
//! Accumulated (rr, ratio) -> Derived -> Hypothesized -> Corrected -> TemplateRun
//! ```
//!
//! [`Corrected`] accumulates the dy, dz, slope and petoq profiles with the
//! fitted bias corrections applied, so scoring can only begin once both
//! offsets are fitted and every table has been derived.

use crate::bands::BandFit;
use crate::correction::{BiasCorrector, SkewWindow};
use crate::hypothesis::{combine, Hypothesis};
use crate::sampler::ConditionalSampler;
use crate::score::{observed_metrics, Corrections, ScoreEngine, ScoreRecord, TemplateTables};
use crate::statistics::{BinnedStatistics, ProfileStatistics};
use crate::summary::ScoreSummary;
use flashmatch_core::{Error, Metric, OffsetAxis, Result, SliceEvent, TemplateConfig};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Metrics accumulated before any hypothesis exists.
const DISCRIMINATING: [Metric; 2] = [Metric::Rr, Metric::Ratio];

/// Metrics accumulated once the bias corrections are known.
const CORRECTED: [Metric; 4] = [Metric::Dy, Metric::Dz, Metric::Slope, Metric::Petoq];

/// Entry point of a template-generation run.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    config: TemplateConfig,
}

impl TemplateGenerator {
    /// Create a generator.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the configuration fails validation.
    pub fn new(config: TemplateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Run every stage with a generator seeded from the configuration.
    ///
    /// # Errors
    /// Fails if no event qualifies, if a bias fit is impossible or if a
    /// spread cannot be resolved under the configured policy.
    pub fn run(&self, events: &[SliceEvent]) -> Result<TemplateRun> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.accumulate(events)?
            .derive()
            .hypothesize(&mut rng)
            .fit_corrections()?
            .score()
    }

    /// Accumulate the rr and ratio histograms over the qualifying events.
    ///
    /// # Errors
    /// Returns [`Error::EmptySample`] if no event passes the quality filter.
    pub fn accumulate<'a>(&'a self, events: &'a [SliceEvent]) -> Result<Accumulated<'a>> {
        let shard = accumulate(&self.config, events, &DISCRIMINATING, |_, event| {
            observed_metrics(event, f64::NAN, f64::NAN)
        })?;
        if shard.events == 0 {
            return Err(Error::EmptySample);
        }
        info!(
            "Accumulated rr/ratio from {} of {} events",
            shard.events,
            events.len()
        );
        let mut stats = shard.stats.into_iter();
        let (Some(rr), Some(ratio)) = (stats.next(), stats.next()) else {
            return Err(Error::EmptySample);
        };
        Ok(Accumulated {
            generator: self,
            events,
            qualifying: shard.events,
            rr,
            ratio,
        })
    }
}

/// rr and ratio histograms fully accumulated.
#[derive(Debug)]
pub struct Accumulated<'a> {
    generator: &'a TemplateGenerator,
    events: &'a [SliceEvent],
    qualifying: usize,
    rr: BinnedStatistics,
    ratio: BinnedStatistics,
}

impl<'a> Accumulated<'a> {
    /// Events that passed the quality filter.
    #[must_use]
    pub fn qualifying(&self) -> usize {
        self.qualifying
    }

    /// rr accumulator.
    #[must_use]
    pub fn rr(&self) -> &BinnedStatistics {
        &self.rr
    }

    /// Ratio accumulator.
    #[must_use]
    pub fn ratio(&self) -> &BinnedStatistics {
        &self.ratio
    }

    /// Close accumulation and derive the rr and ratio tables.
    #[must_use]
    pub fn derive(self) -> Derived<'a> {
        let errors = self.generator.config.profile_errors;
        let rr_table = self.rr.derive(errors);
        let ratio_table = self.ratio.derive(errors);
        Derived {
            accumulated: self,
            rr_table,
            ratio_table,
        }
    }
}

/// rr and ratio tables derived; histograms read-only.
#[derive(Debug)]
pub struct Derived<'a> {
    accumulated: Accumulated<'a>,
    rr_table: ProfileStatistics,
    ratio_table: ProfileStatistics,
}

impl<'a> Derived<'a> {
    /// Derived rr table.
    #[must_use]
    pub fn rr_table(&self) -> &ProfileStatistics {
        &self.rr_table
    }

    /// Derived ratio table.
    #[must_use]
    pub fn ratio_table(&self) -> &ProfileStatistics {
        &self.ratio_table
    }

    /// Estimate a drift position for every qualifying event.
    ///
    /// Events are visited in order and all draws come from `rng`, so a
    /// fixed seed reproduces the hypotheses exactly.
    #[must_use]
    pub fn hypothesize<R: Rng + ?Sized>(self, rng: &mut R) -> Hypothesized<'a> {
        let acc = &self.accumulated;
        let sampler = ConditionalSampler::new(acc.generator.config.min_projection_entries);
        let hypotheses: Vec<Hypothesis> = acc
            .events
            .iter()
            .map(|event| {
                if !event.passes_quality() {
                    return Hypothesis::Undefined;
                }
                let from_rr = sampler.estimate(acc.rr.histogram(), event.flash_rr, rng);
                let from_ratio = sampler.estimate(acc.ratio.histogram(), event.flash_ratio, rng);
                combine(from_rr, from_ratio)
            })
            .collect();
        let defined = hypotheses.iter().filter(|h| h.is_defined()).count();
        info!(
            "Hypotheses defined for {defined} of {} qualifying events",
            acc.qualifying
        );
        Hypothesized {
            derived: self,
            hypotheses,
        }
    }
}

/// Every event carries a hypothesis (possibly undefined).
#[derive(Debug)]
pub struct Hypothesized<'a> {
    derived: Derived<'a>,
    hypotheses: Vec<Hypothesis>,
}

impl<'a> Hypothesized<'a> {
    /// Hypotheses, indexed like the input events.
    #[must_use]
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Fit both bias corrections, then accumulate and derive the remaining
    /// four tables with the corrections applied.
    ///
    /// # Errors
    /// Returns [`Error::UnfittableCorrection`] if either fit has too few
    /// events.
    pub fn fit_corrections(self) -> Result<Corrected<'a>> {
        let acc = &self.derived.accumulated;
        let config = &acc.generator.config;
        let corrector = BiasCorrector::from_config(config);
        let fit = |axis: OffsetAxis| {
            corrector.fit_axis(
                acc.events,
                &self.hypotheses,
                axis,
                SkewWindow {
                    low: config.skew_low_limit,
                    high: config.skew_limit(axis),
                },
            )
        };
        let corrections = Corrections {
            y: fit(OffsetAxis::Y)?,
            z: fit(OffsetAxis::Z)?,
        };

        let hypotheses = &self.hypotheses;
        let shard = accumulate(config, acc.events, &CORRECTED, |index, event| {
            let x = hypotheses[index].value();
            observed_metrics(
                event,
                corrections.corrected_flash(event, OffsetAxis::Y, x),
                corrections.corrected_flash(event, OffsetAxis::Z, x),
            )
        })?;
        info!("Accumulated dy/dz/slope/petoq from {} events", shard.events);

        let mut tables: Vec<ProfileStatistics> = shard
            .stats
            .iter()
            .map(|stats| stats.derive(config.profile_errors))
            .collect();
        tables.push(self.derived.rr_table.clone());
        tables.push(self.derived.ratio_table.clone());
        let tables = TemplateTables::new(tables)?;

        Ok(Corrected {
            hypothesized: self,
            corrections,
            tables,
        })
    }
}

/// Corrections fitted and all six tables derived.
#[derive(Debug)]
pub struct Corrected<'a> {
    hypothesized: Hypothesized<'a>,
    corrections: Corrections,
    tables: TemplateTables,
}

impl Corrected<'_> {
    /// Fitted corrections.
    #[must_use]
    pub fn corrections(&self) -> &Corrections {
        &self.corrections
    }

    /// Derived tables.
    #[must_use]
    pub fn tables(&self) -> &TemplateTables {
        &self.tables
    }

    /// Score every qualifying event and finish the run.
    ///
    /// # Errors
    /// Returns [`Error::DegenerateSpread`] when an event lands in a bin
    /// whose spread the configured policy cannot resolve.
    pub fn score(self) -> Result<TemplateRun> {
        let acc = &self.hypothesized.derived.accumulated;
        let config = &acc.generator.config;
        let hypotheses = &self.hypothesized.hypotheses;
        let engine = ScoreEngine::new(
            &self.tables,
            &self.corrections,
            config.spread_policy,
            config.detector.scores_ratio(),
        );
        let score_one = |(index, event): (usize, &SliceEvent)| {
            engine.score(index, event, hypotheses[index].value())
        };
        let scored: Vec<Option<ScoreRecord>> = if config.parallel {
            acc.events
                .par_iter()
                .enumerate()
                .map(score_one)
                .collect::<Result<_>>()?
        } else {
            acc.events
                .iter()
                .enumerate()
                .map(score_one)
                .collect::<Result<_>>()?
        };
        let records: Vec<ScoreRecord> = scored.into_iter().flatten().collect();

        let bands = [Metric::Rr, Metric::Ratio]
            .into_iter()
            .filter_map(
                |metric| match BandFit::fit(self.tables.get(metric), config.band_degree) {
                    Ok(band) => Some(band),
                    Err(e) => {
                        warn!("{metric} band fit skipped: {e}");
                        None
                    }
                },
            )
            .collect();

        let mut summary = ScoreSummary::new(config);
        summary.extend(&records);
        info!(
            "Scored {} events ({} with borrowed spreads)",
            summary.scored, summary.with_fallback
        );

        Ok(TemplateRun {
            hypotheses: self.hypothesized.hypotheses,
            tables: self.tables,
            corrections: self.corrections,
            records,
            bands,
            summary,
        })
    }
}

/// Outputs of a completed run.
#[derive(Debug, Clone)]
pub struct TemplateRun {
    /// The six per-bin tables.
    pub tables: TemplateTables,
    /// The y and z bias corrections.
    pub corrections: Corrections,
    /// Hypothesis per input event.
    pub hypotheses: Vec<Hypothesis>,
    /// One record per qualifying event, in input order.
    pub records: Vec<ScoreRecord>,
    /// rr and ratio band fits that succeeded.
    pub bands: Vec<BandFit>,
    /// Score histograms.
    pub summary: ScoreSummary,
}

/// Partial accumulation over a subset of the events.
struct Shard {
    stats: Vec<BinnedStatistics>,
    events: usize,
}

impl Shard {
    fn new(config: &TemplateConfig, metrics: &[Metric]) -> Self {
        let binning = config.binning();
        Self {
            stats: metrics
                .iter()
                .map(|&m| BinnedStatistics::new(m, binning, config.axes.get(m)))
                .collect(),
            events: 0,
        }
    }

    fn fill(&mut self, distance: f64, observed: &[f64; 6]) {
        for stats in &mut self.stats {
            stats.accumulate(distance, observed[stats.metric().index()]);
        }
        self.events += 1;
    }

    fn merge(mut self, other: Self) -> Result<Self> {
        for (mine, theirs) in self.stats.iter_mut().zip(&other.stats) {
            mine.merge(theirs)?;
        }
        self.events += other.events;
        Ok(self)
    }
}

/// Fill `metrics` from every qualifying event. `observe` maps an event
/// (and its index) to the values of all six metrics.
fn accumulate<F>(
    config: &TemplateConfig,
    events: &[SliceEvent],
    metrics: &[Metric],
    observe: F,
) -> Result<Shard>
where
    F: Fn(usize, &SliceEvent) -> [f64; 6] + Sync,
{
    if config.parallel {
        events
            .par_iter()
            .enumerate()
            .filter(|(_, event)| event.passes_quality())
            .fold(
                || Shard::new(config, metrics),
                |mut shard, (index, event)| {
                    shard.fill(event.charge_x, &observe(index, event));
                    shard
                },
            )
            .map(Ok)
            .try_reduce(|| Shard::new(config, metrics), Shard::merge)
    } else {
        let mut shard = Shard::new(config, metrics);
        for (index, event) in events.iter().enumerate() {
            if event.passes_quality() {
                shard.fill(event.charge_x, &observe(index, event));
            }
        }
        Ok(shard)
    }
}
