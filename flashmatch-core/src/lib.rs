//! flashmatch-core: Core types for flash-matching template generation.
//!
//! This crate provides the event record read from the matched sample, the
//! shared quality filter, distance binning, the run configuration bundle,
//! and the error taxonomy used across the workspace.
//!

pub mod binning;
pub mod config;
pub mod error;
pub mod event;

pub use binning::DistanceBinning;
pub use config::{
    CorrectionFit, Detector, GlobalXRange, Metric, MetricAxes, MetricAxis, ProfileErrors, ScoreAxis,
    SpreadPolicy, TemplateConfig,
};
pub use error::{Error, Result};
pub use event::{OffsetAxis, SliceEvent, MC_T0_MAX, MC_T0_MIN};
