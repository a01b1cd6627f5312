// Dense least squares via column-pivoted QR.
//
// faer's `ColPivQr` factors A·P = Q·R. Pivots whose |R_jj| falls below
// rcond·|R_00| mark dependent columns, which get a zero coefficient (basic
// solution). The initial solve is then polished by iterative refinement
// against the same factorization, which is where the iteration cap and
// tolerance apply.

use faer::linalg::solvers::ColPivQr;
use faer::Mat;
use ndarray::{s, Array1, Array2, ArrayView1};
use tracing::{debug, info};

use super::SolveDiagnostics;
use crate::config::DenseConfig;
use crate::error::PipelineError;

/// Thin factors of A·P = Q·R, copied back into ndarray.
struct PivotedQr {
    /// m × k
    q: Array2<f64>,
    /// k × n, upper trapezoidal
    r: Array2<f64>,
    /// `pivot[j]` = original column placed at position j
    pivot: Vec<usize>,
    rank: usize,
}

impl PivotedQr {
    fn factor(a: &Array2<f64>, rcond: f64) -> Self {
        let (m, n) = a.dim();
        let k = m.min(n);
        if k == 0 {
            return Self {
                q: Array2::zeros((m, 0)),
                r: Array2::zeros((0, n)),
                pivot: (0..n).collect(),
                rank: 0,
            };
        }

        let mut a_faer = Mat::zeros(m, n);
        for i in 0..m {
            for j in 0..n {
                a_faer[(i, j)] = a[[i, j]];
            }
        }
        let qr = ColPivQr::new(a_faer.as_ref());

        let q_faer = qr.compute_thin_Q();
        let q = Array2::from_shape_fn((m, k), |(i, j)| q_faer[(i, j)]);
        let r_faer = qr.R();
        let r = Array2::from_shape_fn((k, n), |(i, j)| r_faer[(i, j)]);
        let pivot: Vec<usize> = qr.P().arrays().0.to_vec();

        let tol = if rcond > 0.0 {
            rcond
        } else {
            m.max(n) as f64 * f64::EPSILON
        };
        let lead = r[[0, 0]].abs();
        let rank = if lead == 0.0 {
            0
        } else {
            (0..k).take_while(|&j| r[[j, j]].abs() > tol * lead).count()
        };

        Self { q, r, pivot, rank }
    }

    /// Least-squares solve of A·x ≈ b using the stored factorization.
    fn solve(&self, b: ArrayView1<f64>) -> Array1<f64> {
        let n = self.pivot.len();
        let y = self.q.t().dot(&b);

        // Back-substitute R₁₁·z = y[..rank]; dependent columns stay zero.
        let mut z = vec![0.0; n];
        for i in (0..self.rank).rev() {
            let row = self.r.slice(s![i, i + 1..self.rank]);
            let acc = y[i]
                - row
                    .iter()
                    .zip(&z[i + 1..self.rank])
                    .map(|(rij, zj)| rij * zj)
                    .sum::<f64>();
            z[i] = acc / self.r[[i, i]];
        }

        let mut x = Array1::zeros(n);
        for (pos, &col) in self.pivot.iter().enumerate() {
            x[col] = z[pos];
        }
        x
    }

    /// |R_00| / |R_rr| over the retained pivots.
    fn condition_estimate(&self) -> Option<f64> {
        if self.rank == 0 {
            return None;
        }
        let last = self.rank - 1;
        Some(self.r[[0, 0]].abs() / self.r[[last, last]].abs())
    }
}

#[derive(Debug, Clone)]
pub struct DenseOutcome {
    pub x: Array1<f64>,
    pub rank: usize,
    pub refinements: usize,
    pub converged: bool,
    pub residual_norm: f64,
    pub normal_residual_norm: f64,
    pub condition_estimate: Option<f64>,
}

impl DenseOutcome {
    pub fn diagnostics(&self) -> SolveDiagnostics {
        let stop_reason = if self.converged {
            format!("refinement settled after {} sweeps", self.refinements)
        } else {
            format!("refinement did not settle within {} sweeps", self.refinements)
        };
        SolveDiagnostics {
            converged: self.converged,
            iterations: self.refinements,
            stop_reason,
            residual_norm: self.residual_norm,
            normal_residual_norm: self.normal_residual_norm,
            rank: Some(self.rank),
            condition_estimate: self.condition_estimate,
        }
    }
}

/// Solve min ‖A·x − b‖ densely.
pub fn least_squares(
    a: &Array2<f64>,
    b: &Array1<f64>,
    config: &DenseConfig,
) -> Result<DenseOutcome, PipelineError> {
    let (m, n) = a.dim();
    PipelineError::check_dims("dense right-hand side", m, b.len())?;

    let qr = PivotedQr::factor(a, config.rcond);
    let mut x = qr.solve(b.view());

    let mut refinements = 0;
    let mut converged = config.max_refinements == 0;
    while refinements < config.max_refinements {
        refinements += 1;
        let r = b - &a.dot(&x);
        let dx = qr.solve(r.view());
        x += &dx;

        let dx_norm = dx.dot(&dx).sqrt();
        let x_norm = x.dot(&x).sqrt();
        debug!(sweep = refinements, dx_norm, "Dense refinement sweep");
        if dx_norm <= config.tol * x_norm.max(f64::MIN_POSITIVE) {
            converged = true;
            break;
        }
    }

    let r = b - &a.dot(&x);
    let residual_norm = r.dot(&r).sqrt();
    let atr = a.t().dot(&r);
    let normal_residual_norm = atr.dot(&atr).sqrt();

    info!(
        rows = m,
        cols = n,
        rank = qr.rank,
        refinements,
        residual_norm,
        "Dense least squares finished"
    );

    Ok(DenseOutcome {
        x,
        rank: qr.rank,
        refinements,
        converged,
        residual_norm,
        normal_residual_norm,
        condition_estimate: qr.condition_estimate(),
    })
}
