//! Penalised least squares via accumulated normal equations
//!
//! Rows are streamed into `XᵀX` and `Xᵀy`, so the design matrix never has to
//! be materialised. Solves `(XᵀX + diag(λ)) β = Xᵀy` with a Cholesky
//! factorisation.

use crate::forecast::error::{ForecastError, ForecastResult};

/// Accumulated `XᵀX` and `Xᵀy` for a fixed column count
#[derive(Debug, Clone)]
pub struct NormalEquations {
    cols: usize,
    xtx: Vec<f64>,
    xty: Vec<f64>,
    rows: usize,
}

impl NormalEquations {
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            xtx: vec![0.0; cols * cols],
            xty: vec![0.0; cols],
            rows: 0,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Add one observation row
    pub fn add_row(&mut self, x: &[f64], y: f64) {
        debug_assert_eq!(x.len(), self.cols);
        for i in 0..self.cols {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            self.xty[i] += xi * y;
            let row = &mut self.xtx[i * self.cols..(i + 1) * self.cols];
            for j in i..self.cols {
                row[j] += xi * x[j];
            }
        }
        self.rows += 1;
    }

    /// Solve with a per-column ridge penalty added to the diagonal
    pub fn solve(&self, penalty: &[f64]) -> ForecastResult<Vec<f64>> {
        if penalty.len() != self.cols {
            return Err(ForecastError::InvalidParameter(format!(
                "penalty has {} entries for {} columns",
                penalty.len(),
                self.cols
            )));
        }

        // Mirror the upper triangle and apply the penalty
        let n = self.cols;
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = self.xtx[i * n + j];
                a[i * n + j] = v;
                a[j * n + i] = v;
            }
            a[i * n + i] += penalty[i];
        }

        cholesky_solve(&mut a, &self.xty, n).ok_or_else(|| {
            ForecastError::Numerical("normal equations are not positive definite".to_string())
        })
    }
}

/// Solve `A x = b` for symmetric positive definite `A` (row-major, n×n).
/// `A` is overwritten with its Cholesky factor.
fn cholesky_solve(a: &mut [f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    for j in 0..n {
        let original = a[j * n + j];
        let mut diag = original;
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        // Relative floor so rounding noise on a rank-deficient column fails
        if !diag.is_finite() || diag <= original.abs() * 1e-12 {
            return None;
        }
        let l_jj = diag.sqrt();
        a[j * n + j] = l_jj;

        for i in (j + 1)..n {
            let mut s = a[i * n + j];
            for k in 0..j {
                s -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = s / l_jj;
        }
    }

    // Forward: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= a[i * n + k] * z[k];
        }
        z[i] = s / a[i * n + i];
    }

    // Backward: Lᵀ x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut s = z[i];
        for k in (i + 1)..n {
            s -= a[k * n + i] * x[k];
        }
        x[i] = s / a[i * n + i];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}
