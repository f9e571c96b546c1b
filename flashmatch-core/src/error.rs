//! Error types for flashmatch-core.

use thiserror::Error;

/// Result type alias for flashmatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for template generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A bias-correction fit had too few usable events, or the fit was singular.
    #[error("cannot fit {offset} correction: {selected} events selected, at least {required} required")]
    UnfittableCorrection {
        /// Which directional offset was being fit.
        offset: String,
        /// Events that survived the skew and quality selection.
        selected: usize,
        /// Minimum number of points for the requested degree.
        required: usize,
    },

    /// A distance bin had no usable spread and no substitute was allowed or found.
    #[error("degenerate spread for metric {metric} in distance bin {bin}")]
    DegenerateSpread {
        /// Metric name.
        metric: &'static str,
        /// Distance bin index.
        bin: usize,
    },

    /// No event passed the quality filter.
    #[error("no event in the sample passed the quality filter")]
    EmptySample,

    /// Histograms with different binning cannot be merged.
    #[error("incompatible histogram binning: {0}")]
    IncompatibleHistograms(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// No electron lifetime is known for a run.
    #[error("no electron lifetime for run {0}")]
    MissingLifetime(u32),

    /// Singular system in a least-squares fit.
    #[error("singular matrix in least-squares fit")]
    SingularMatrix,
}
