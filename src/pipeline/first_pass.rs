// Pass 1: LSQR on the sparse augmented matrix, starting from all ones.

use anyhow::Result;
use tracing::info;

use crate::config::LsqrConfig;
use crate::error::Warning;
use crate::solver::lsqr::lsqr;

use super::prepare::Prepared;
use super::report::{CoefficientRow, CoefficientTable};

pub const STAGE: &str = "first_pass";

/// One coefficient per augmented column (significant foods, then Other).
pub fn first_pass(prepared: &Prepared, config: &LsqrConfig) -> Result<(CoefficientTable, Vec<Warning>)> {
    let a = &prepared.augmented;
    let x0 = vec![1.0; a.matrix.ncols()];
    let outcome = lsqr(&a.matrix, &prepared.goals, Some(&x0), config)?;
    let diagnostics = outcome.diagnostics();

    info!(
        columns = x0.len(),
        iterations = outcome.iterations,
        stop = outcome.stop.describe(),
        residual = outcome.residual_norm,
        "First pass solved"
    );

    let rows = a
        .labels
        .iter()
        .zip(&outcome.x)
        .map(|(label, &c)| CoefficientRow::new(label.clone(), c))
        .collect();

    let warnings = diagnostics.warning(STAGE).into_iter().collect();
    Ok((
        CoefficientTable {
            stage: STAGE.to_string(),
            rows,
            diagnostics,
        },
        warnings,
    ))
}
