//! Polynomials and weighted least-squares fitting.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use flashmatch_core::{Error, Result};

/// Polynomial with coefficients in ascending powers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Create from ascending coefficients `c0 + c1·x + c2·x² + ...`.
    #[must_use]
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// All-zero polynomial of `degree`.
    #[must_use]
    pub fn zero(degree: usize) -> Self {
        Self::new(vec![0.0; degree + 1])
    }

    /// Coefficients in ascending powers.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Degree (number of coefficients minus one).
    #[must_use]
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluate at `x`.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Copy with every coefficient rounded to `digits` significant figures.
    #[must_use]
    pub fn rounded(&self, digits: u32) -> Self {
        Self::new(
            self.coefficients
                .iter()
                .map(|&c| round_sig_figs(c, digits))
                .collect(),
        )
    }

    /// Unweighted least-squares fit of `(x, y)` points.
    ///
    /// # Errors
    /// Returns [`Error::SingularMatrix`] when the points cannot determine
    /// `degree + 1` coefficients.
    pub fn fit(points: &[(f64, f64)], degree: usize) -> Result<Self> {
        let weighted: Vec<(f64, f64, f64)> = points.iter().map(|&(x, y)| (x, y, 1.0)).collect();
        Self::fit_weighted(&weighted, degree)
    }

    /// Weighted least-squares fit of `(x, y, weight)` points.
    ///
    /// Abscissae are rescaled to `[-1, 1]` before forming the normal
    /// equations and the coefficients are scaled back afterwards.
    ///
    /// # Errors
    /// Returns [`Error::SingularMatrix`] when the points cannot determine
    /// `degree + 1` coefficients.
    pub fn fit_weighted(points: &[(f64, f64, f64)], degree: usize) -> Result<Self> {
        let terms = degree + 1;
        if points.len() < terms {
            return Err(Error::SingularMatrix);
        }
        let scale = points
            .iter()
            .map(|&(x, _, _)| x.abs())
            .fold(0.0f64, f64::max);
        let scale = if scale > 0.0 && scale.is_finite() {
            scale
        } else {
            1.0
        };

        let mut ata = vec![vec![0.0; terms]; terms];
        let mut atb = vec![0.0; terms];
        let mut powers = vec![0.0; terms];
        for &(x, y, w) in points {
            let t = x / scale;
            let mut p = 1.0;
            for power in &mut powers {
                *power = p;
                p *= t;
            }
            for i in 0..terms {
                atb[i] += w * powers[i] * y;
                for j in 0..terms {
                    ata[i][j] += w * powers[i] * powers[j];
                }
            }
        }

        let scaled = solve_linear_system(ata, atb)?;
        let mut factor = 1.0;
        let coefficients = scaled
            .into_iter()
            .map(|c| {
                let value = c / factor;
                factor *= scale;
                value
            })
            .collect();
        Ok(Self::new(coefficients))
    }
}

/// Round `value` to `digits` significant figures.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn round_sig_figs(value: f64, digits: u32) -> f64 {
    if value == 0.0 || !value.is_finite() || digits == 0 {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits as i32 - 1 - magnitude);
    (value * factor).round() / factor
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    let norm = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |m, v| m.max(v.abs()));
    if !(norm > 0.0) || !norm.is_finite() {
        return Err(Error::SingularMatrix);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            let val = a[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val <= 1e-12 * norm {
            return Err(Error::SingularMatrix);
        }
        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = b[i];
        for j in (i + 1)..n {
            x[i] -= a[i][j] * x[j];
        }
        x[i] /= a[i][i];
    }
    Ok(x)
}
