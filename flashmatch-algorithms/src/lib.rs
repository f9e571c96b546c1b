//! flashmatch-algorithms: Template construction and match scoring.
//!
//! This crate provides the stages of a template-generation run:
//! - **Binned statistics** - per-distance-bin histograms and profiles
//! - **Conditional sampling** - drift-position hypotheses from 2-D histograms
//! - **Bias correction** - polynomial fits of skewed flash offsets
//! - **Scoring** - normalized deviations from the templates
//!
//! [`TemplateGenerator`] runs them in order. Lifetime equalization of
//! calorimetric hits lives in [`lifetime`].
//!
#![warn(missing_docs)]

mod bands;
mod correction;
mod histogram;
mod hypothesis;
pub mod lifetime;
mod pipeline;
mod polyfit;
mod sampler;
mod score;
mod statistics;
mod summary;

pub use bands::BandFit;
pub use correction::{
    BiasCorrector, PolynomialCorrection, SkewWindow, DEFAULT_SKEW_HIGH_LIMIT, REPORTED_SIG_FIGS,
};
pub use histogram::{Histogram1D, Histogram2D, ScatterHistogram, ValueAxis};
pub use hypothesis::{combine, Hypothesis};
pub use pipeline::{
    Accumulated, Corrected, Derived, Hypothesized, TemplateGenerator, TemplateRun,
};
pub use polyfit::{round_sig_figs, Polynomial};
pub use sampler::{ConditionalSampler, Estimate, ProjectionWindow, Windows, MIN_PROJECTION_ENTRIES};
pub use score::{
    observed_metrics, Corrections, MetricTerm, ScoreEngine, ScoreRecord, TemplateTables,
    MIN_SPREAD,
};
pub use statistics::{BinStatistic, BinnedStatistics, Profile, ProfileStatistics};
pub use summary::ScoreSummary;

// Re-export core types used in the public API
pub use flashmatch_core::{Metric, OffsetAxis, SliceEvent, TemplateConfig};
