//! Truth-matched charge/flash pairs and the shared quality filter.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Earliest accepted true interaction time (µs).
pub const MC_T0_MIN: f64 = 0.0;
/// Latest accepted true interaction time (µs), one readout cycle.
pub const MC_T0_MAX: f64 = 1.6;

/// One reconstructed neutrino slice with its matched flash.
///
/// Rows are read once from the external sample and never mutated. Derived
/// quantities (position hypothesis, score) live beside the sample, indexed
/// by row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceEvent {
    /// Number of reconstructed slices in the event.
    pub slices: i32,
    /// Number of true neutrino interactions in the event.
    pub true_nus: i32,
    /// True interaction time (µs).
    pub mc_t0: f64,
    /// Charge-side drift distance from the anode (cm).
    pub charge_x: f64,
    /// Charge-side y position (cm).
    pub charge_y: f64,
    /// Charge-side z position (cm).
    pub charge_z: f64,
    /// Charge-side global x position (cm).
    pub charge_x_gl: f64,
    /// Charge-side z/y slope.
    pub charge_slope: f64,
    /// Flash barycenter y (cm).
    pub flash_yb: f64,
    /// Flash barycenter z (cm).
    pub flash_zb: f64,
    /// Directional asymmetry of the flash along y.
    pub y_skew: f64,
    /// Directional asymmetry of the flash along z.
    pub z_skew: f64,
    /// Flash z/y slope.
    pub flash_slope: f64,
    /// PE-weighted radial spread of the flash (cm).
    pub flash_rr: f64,
    /// PE ratio between optical detector populations.
    pub flash_ratio: f64,
    /// Photoelectrons per unit charge.
    pub petoq: f64,
    /// Score assigned by a previous template generation, if any.
    pub score: Option<f64>,
}

impl SliceEvent {
    /// True if the event qualifies for template building and scoring.
    ///
    /// Requires exactly one slice, exactly one true neutrino, a true
    /// interaction time inside `[MC_T0_MIN, MC_T0_MAX]`, a non-negative
    /// charge drift distance, and finite values for every metric input.
    #[must_use]
    pub fn passes_quality(&self) -> bool {
        if self.slices != 1 || self.true_nus != 1 {
            return false;
        }
        if !(MC_T0_MIN..=MC_T0_MAX).contains(&self.mc_t0) {
            return false;
        }
        if self.charge_x.is_nan() || self.charge_x < 0.0 {
            return false;
        }
        self.metric_inputs().iter().all(|v| v.is_finite())
    }

    /// Raw flash-minus-charge offset along `axis`, before bias correction.
    #[must_use]
    #[inline]
    pub fn raw_offset(&self, axis: OffsetAxis) -> f64 {
        match axis {
            OffsetAxis::Y => self.flash_yb - self.charge_y,
            OffsetAxis::Z => self.flash_zb - self.charge_z,
        }
    }

    /// Flash barycenter along `axis`.
    #[must_use]
    #[inline]
    pub fn flash_position(&self, axis: OffsetAxis) -> f64 {
        match axis {
            OffsetAxis::Y => self.flash_yb,
            OffsetAxis::Z => self.flash_zb,
        }
    }

    /// Charge position along `axis`.
    #[must_use]
    #[inline]
    pub fn charge_position(&self, axis: OffsetAxis) -> f64 {
        match axis {
            OffsetAxis::Y => self.charge_y,
            OffsetAxis::Z => self.charge_z,
        }
    }

    /// Flash skew along `axis`.
    #[must_use]
    #[inline]
    pub fn skew(&self, axis: OffsetAxis) -> f64 {
        match axis {
            OffsetAxis::Y => self.y_skew,
            OffsetAxis::Z => self.z_skew,
        }
    }

    /// Flash slope minus charge slope.
    #[must_use]
    #[inline]
    pub fn slope_offset(&self) -> f64 {
        self.flash_slope - self.charge_slope
    }

    fn metric_inputs(&self) -> [f64; 13] {
        [
            self.charge_x,
            self.charge_y,
            self.charge_z,
            self.charge_slope,
            self.flash_yb,
            self.flash_zb,
            self.y_skew,
            self.z_skew,
            self.flash_slope,
            self.flash_rr,
            self.flash_ratio,
            self.petoq,
            self.mc_t0,
        ]
    }
}

/// Directional offset between flash barycenter and charge position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OffsetAxis {
    /// Vertical.
    Y,
    /// Beam direction.
    Z,
}

impl OffsetAxis {
    /// Both axes, in fitting order.
    pub const ALL: [OffsetAxis; 2] = [OffsetAxis::Y, OffsetAxis::Z];

    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OffsetAxis::Y => "y",
            OffsetAxis::Z => "z",
        }
    }
}

impl std::fmt::Display for OffsetAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
