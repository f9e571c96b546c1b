//! Precision-weighted combination of two drift-position estimates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sampler::Estimate;

/// Combined drift-position hypothesis of one event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Hypothesis {
    /// Neither estimate carried weight; no correction is possible.
    #[default]
    Undefined,
    /// Weighted drift position and its uncertainty (cm).
    Defined {
        /// Drift distance from the anode.
        x: f64,
        /// One-sigma uncertainty.
        uncertainty: f64,
    },
}

impl Hypothesis {
    /// Drift position, NaN when undefined.
    #[must_use]
    pub fn value(&self) -> f64 {
        match *self {
            Hypothesis::Undefined => f64::NAN,
            Hypothesis::Defined { x, .. } => x,
        }
    }

    /// Uncertainty, NaN when undefined.
    #[must_use]
    pub fn uncertainty(&self) -> f64 {
        match *self {
            Hypothesis::Undefined => f64::NAN,
            Hypothesis::Defined { uncertainty, .. } => uncertainty,
        }
    }

    /// True for [`Hypothesis::Defined`].
    #[must_use]
    pub fn is_defined(&self) -> bool {
        matches!(self, Hypothesis::Defined { .. })
    }
}

/// `(h1·w1 + h2·w2) / (w1 + w2)` with uncertainty `sqrt(w1 + w2) / (w1 + w2)`.
#[must_use]
pub fn combine(first: Estimate, second: Estimate) -> Hypothesis {
    let sum_weights = first.weight + second.weight;
    if !(sum_weights > 0.0) || !sum_weights.is_finite() {
        return Hypothesis::Undefined;
    }
    let x = (first.hypothesis * first.weight + second.hypothesis * second.weight) / sum_weights;
    Hypothesis::Defined {
        x,
        uncertainty: sum_weights.sqrt() / sum_weights,
    }
}
