// LSQR (Paige & Saunders, 1982) for min ‖A·x − b‖₂.
//
// Only needs A·v and Aᵀ·u, so the operator is a trait and the sparse
// observation matrix plugs straight in. Starting from a guess x₀ we solve for the
// correction against r₀ = b − A·x₀. No damping: collinear food columns give
// poorly conditioned coefficients and that is reported, not corrected.

use tracing::{debug, info};

use super::{norm, SolveDiagnostics};
use crate::config::LsqrConfig;
use crate::error::PipelineError;
use crate::matrix::sparse::SparseMatrix;

/// Anything LSQR can iterate against.
pub trait LinearOperator {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    fn apply(&self, x: &[f64]) -> Result<Vec<f64>, PipelineError>;
    fn apply_transpose(&self, y: &[f64]) -> Result<Vec<f64>, PipelineError>;
}

impl LinearOperator for SparseMatrix {
    fn nrows(&self) -> usize {
        SparseMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        SparseMatrix::ncols(self)
    }

    fn apply(&self, x: &[f64]) -> Result<Vec<f64>, PipelineError> {
        self.mul_vec(x)
    }

    fn apply_transpose(&self, y: &[f64]) -> Result<Vec<f64>, PipelineError> {
        self.mul_t_vec(y)
    }
}

/// Why LSQR stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsqrStop {
    /// Aᵀ·r₀ = 0: the starting guess already solves the problem
    InitialGuessIsSolution,
    /// ‖r‖ within btol/atol: the system is compatible
    Compatible,
    /// ‖Aᵀr‖ within atol: least-squares optimum reached
    LeastSquares,
    /// Condition estimate exceeded conlim
    IllConditioned,
    /// As `Compatible`, at machine precision
    CompatibleAtPrecision,
    /// As `LeastSquares`, at machine precision
    LeastSquaresAtPrecision,
    /// Condition estimate too large for machine precision
    IllConditionedAtPrecision,
    IterationLimit,
}

impl LsqrStop {
    pub fn converged(self) -> bool {
        !matches!(
            self,
            Self::IllConditioned | Self::IllConditionedAtPrecision | Self::IterationLimit
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::InitialGuessIsSolution => "initial guess is a least-squares solution",
            Self::Compatible => "residual below tolerance (compatible system)",
            Self::LeastSquares => "normal-equation residual below tolerance",
            Self::IllConditioned => "condition estimate exceeded limit",
            Self::CompatibleAtPrecision => "residual at machine precision",
            Self::LeastSquaresAtPrecision => "normal-equation residual at machine precision",
            Self::IllConditionedAtPrecision => "condition estimate at machine precision limit",
            Self::IterationLimit => "iteration limit reached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LsqrOutcome {
    pub x: Vec<f64>,
    pub stop: LsqrStop,
    pub iterations: usize,
    /// Estimate of cond(A) from the bidiagonalization
    pub acond: f64,
    pub residual_norm: f64,
    pub normal_residual_norm: f64,
}

impl LsqrOutcome {
    pub fn diagnostics(&self) -> SolveDiagnostics {
        SolveDiagnostics {
            converged: self.stop.converged(),
            iterations: self.iterations,
            stop_reason: self.stop.describe().to_string(),
            residual_norm: self.residual_norm,
            normal_residual_norm: self.normal_residual_norm,
            rank: None,
            condition_estimate: Some(self.acond),
        }
    }
}

fn scale(v: &mut [f64], s: f64) {
    for x in v.iter_mut() {
        *x *= s;
    }
}

/// Solve min ‖A·x − b‖ starting from `x0` (zeros when `None`).
pub fn lsqr<A: LinearOperator + ?Sized>(
    a: &A,
    b: &[f64],
    x0: Option<&[f64]>,
    config: &LsqrConfig,
) -> Result<LsqrOutcome, PipelineError> {
    let (m, n) = (a.nrows(), a.ncols());
    PipelineError::check_dims("lsqr right-hand side", m, b.len())?;
    let x0: Vec<f64> = match x0 {
        Some(x0) => {
            PipelineError::check_dims("lsqr initial guess", n, x0.len())?;
            x0.to_vec()
        }
        None => vec![0.0; n],
    };

    let iter_lim = if config.max_iter == 0 { 2 * n.max(1) } else { config.max_iter };
    let ctol = if config.conlim > 0.0 { 1.0 / config.conlim } else { 0.0 };
    let eps = f64::EPSILON;

    // u = b − A·x0, β = ‖u‖
    let ax0 = a.apply(&x0)?;
    let mut u: Vec<f64> = b.iter().zip(&ax0).map(|(bi, ai)| bi - ai).collect();
    let mut beta = norm(&u);
    let bnorm = beta;

    let mut v = vec![0.0; n];
    let mut alfa = 0.0;
    if beta > 0.0 {
        scale(&mut u, 1.0 / beta);
        v = a.apply_transpose(&u)?;
        alfa = norm(&v);
    }
    if alfa > 0.0 {
        scale(&mut v, 1.0 / alfa);
    }

    let mut w = v.clone();
    let mut dx = vec![0.0; n];

    let mut rhobar = alfa;
    let mut phibar = beta;
    let mut anorm: f64 = 0.0;
    let mut acond = 0.0;
    let mut ddnorm = 0.0;
    let mut xxnorm = 0.0;
    let mut z = 0.0;
    let mut cs2 = -1.0;
    let mut sn2 = 0.0;
    let mut iterations = 0;

    let stop = if alfa * beta == 0.0 {
        LsqrStop::InitialGuessIsSolution
    } else {
        loop {
            iterations += 1;

            // Next step of the Golub-Kahan bidiagonalization.
            let av = a.apply(&v)?;
            for (ui, avi) in u.iter_mut().zip(&av) {
                *ui = avi - alfa * *ui;
            }
            beta = norm(&u);
            if beta > 0.0 {
                scale(&mut u, 1.0 / beta);
                anorm = (anorm * anorm + alfa * alfa + beta * beta).sqrt();
                let atu = a.apply_transpose(&u)?;
                for (vi, atui) in v.iter_mut().zip(&atu) {
                    *vi = atui - beta * *vi;
                }
                alfa = norm(&v);
                if alfa > 0.0 {
                    scale(&mut v, 1.0 / alfa);
                }
            }

            // Plane rotation eliminating the subdiagonal β.
            let rho = rhobar.hypot(beta);
            if rho == 0.0 {
                break LsqrStop::LeastSquaresAtPrecision;
            }
            let cs = rhobar / rho;
            let sn = beta / rho;
            let theta = sn * alfa;
            rhobar = -cs * alfa;
            let phi = cs * phibar;
            phibar *= sn;
            let tau = sn * phi;

            // Update x and w.
            let t1 = phi / rho;
            let t2 = -theta / rho;
            let mut dk_norm2 = 0.0;
            for i in 0..n {
                let wi = w[i];
                dk_norm2 += (wi / rho) * (wi / rho);
                dx[i] += t1 * wi;
                w[i] = v[i] + t2 * wi;
            }
            ddnorm += dk_norm2;

            // Estimate ‖x‖ via a second rotation on the lower bidiagonal system.
            let delta = sn2 * rho;
            let gambar = -cs2 * rho;
            let rhs = phi - delta * z;
            let zbar = if gambar != 0.0 { rhs / gambar } else { 0.0 };
            let xnorm = (xxnorm + zbar * zbar).sqrt();
            let gamma = gambar.hypot(theta);
            if gamma != 0.0 {
                cs2 = gambar / gamma;
                sn2 = theta / gamma;
                z = rhs / gamma;
            }
            xxnorm += z * z;

            acond = anorm * ddnorm.sqrt();
            let rnorm = phibar.abs();
            let arnorm = alfa * tau.abs();

            let test1 = rnorm / bnorm;
            let test2 = arnorm / (anorm * rnorm + eps);
            let test3 = 1.0 / (acond + eps);
            let t1 = test1 / (1.0 + anorm * xnorm / bnorm);
            let rtol = config.btol + config.atol * anorm * xnorm / bnorm;

            debug!(iteration = iterations, rnorm, arnorm, "LSQR step");

            // Checked weakest-first so the strongest satisfied test wins.
            let mut stop = None;
            if iterations >= iter_lim {
                stop = Some(LsqrStop::IterationLimit);
            }
            if 1.0 + test3 <= 1.0 {
                stop = Some(LsqrStop::IllConditionedAtPrecision);
            }
            if 1.0 + test2 <= 1.0 {
                stop = Some(LsqrStop::LeastSquaresAtPrecision);
            }
            if 1.0 + t1 <= 1.0 {
                stop = Some(LsqrStop::CompatibleAtPrecision);
            }
            if test3 <= ctol {
                stop = Some(LsqrStop::IllConditioned);
            }
            if test2 <= config.atol {
                stop = Some(LsqrStop::LeastSquares);
            }
            if test1 <= rtol {
                stop = Some(LsqrStop::Compatible);
            }
            if let Some(stop) = stop {
                break stop;
            }
        }
    };

    let x: Vec<f64> = x0.iter().zip(&dx).map(|(a, d)| a + d).collect();

    // Report true residuals at the returned x rather than the recurrences.
    let ax = a.apply(&x)?;
    let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
    let residual_norm = norm(&r);
    let normal_residual_norm = norm(&a.apply_transpose(&r)?);

    info!(
        rows = m,
        cols = n,
        iterations,
        stop = stop.describe(),
        residual_norm,
        condition = acond,
        "LSQR finished"
    );

    Ok(LsqrOutcome {
        x,
        stop,
        iterations,
        acond,
        residual_norm,
        normal_residual_norm,
    })
}
