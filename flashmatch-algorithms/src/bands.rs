//! Smooth parameterizations of the light-shape templates.
//!
//! The rr and ratio templates are summarized by three polynomials of the
//! drift distance: through `mean + spread`, `mean`, and `mean - spread`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::polyfit::Polynomial;
use crate::statistics::ProfileStatistics;
use flashmatch_core::{Metric, Result};

/// High, middle and low band polynomials of one metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BandFit {
    /// Metric the bands describe.
    pub metric: Metric,
    /// Fit through `mean + spread`.
    pub high: Polynomial,
    /// Fit through `mean`.
    pub middle: Polynomial,
    /// Fit through `mean - spread`.
    pub low: Polynomial,
}

impl BandFit {
    /// Fit the three bands over the populated distance bins of `table`.
    ///
    /// # Errors
    /// Returns [`flashmatch_core::Error::SingularMatrix`] when fewer than
    /// `degree + 1` bins are populated.
    pub fn fit(table: &ProfileStatistics, degree: usize) -> Result<Self> {
        let binning = table.binning();
        let populated: Vec<(f64, f64, f64)> = table
            .bins()
            .iter()
            .enumerate()
            .filter_map(|(bin, stat)| stat.map(|s| (binning.center(bin), s.mean, s.spread)))
            .collect();
        let band = |k: f64| {
            let points: Vec<(f64, f64)> = populated
                .iter()
                .map(|&(x, mean, spread)| (x, mean + k * spread))
                .collect();
            Polynomial::fit(&points, degree)
        };
        Ok(Self {
            metric: table.metric(),
            high: band(1.0)?,
            middle: band(0.0)?,
            low: band(-1.0)?,
        })
    }
}
