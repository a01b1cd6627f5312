// Least-squares solvers for the two regression passes.
//
// The first pass is very wide and very sparse, so it runs LSQR against the
// sparse observation rows without ever forming AᵀA. The second pass has a few hundred
// columns and uses a dense column-pivoted QR. Both report a
// `SolveDiagnostics`; hitting an iteration budget is a warning, not an error.

pub mod dense;
pub mod lsqr;

use serde::Serialize;
use tracing::warn;

use crate::error::Warning;

/// How a solve ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveDiagnostics {
    pub converged: bool,
    pub iterations: usize,
    pub stop_reason: String,
    /// ‖b − A·x‖ at the returned solution
    pub residual_norm: f64,
    /// ‖Aᵀ(b − A·x)‖ at the returned solution
    pub normal_residual_norm: f64,
    /// Numerical rank, for solvers that detect it
    pub rank: Option<usize>,
    /// Estimated condition number of the system matrix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_estimate: Option<f64>,
}

impl SolveDiagnostics {
    /// A convergence warning for the report, logged on the way out.
    pub fn warning(&self, stage: &str) -> Option<Warning> {
        if self.converged {
            return None;
        }
        warn!(
            stage,
            iterations = self.iterations,
            reason = %self.stop_reason,
            "Solver stopped without meeting tolerance"
        );
        Some(Warning::Convergence {
            stage: stage.to_string(),
            iterations: self.iterations,
            reason: self.stop_reason.clone(),
        })
    }
}

pub(crate) fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
