// ClusteredMatrix: the augmented matrix with food columns summed by cluster.

use ndarray::Array2;
use tracing::info;

use super::significance::AugmentedMatrix;
use crate::error::PipelineError;

/// Dense rows × (clusters + 1). Column `k` holds cluster `k`; the last
/// column is the carried-through Other column.
#[derive(Debug, Clone)]
pub struct ClusteredMatrix {
    pub data: Array2<f64>,
    pub clusters: usize,
}

impl ClusteredMatrix {
    /// `assignment[j]` is the cluster of the augmented matrix's food column `j`.
    pub fn build(
        augmented: &AugmentedMatrix,
        assignment: &[usize],
        clusters: usize,
    ) -> Result<Self, PipelineError> {
        let foods = augmented.food_count();
        PipelineError::check_dims("cluster assignment", foods, assignment.len())?;
        if let Some(&bad) = assignment.iter().find(|&&c| c >= clusters) {
            return Err(PipelineError::DimensionMismatch {
                stage: "cluster id range",
                expected: clusters,
                actual: bad + 1,
            });
        }

        let source = &augmented.matrix;
        let mut data = Array2::zeros((source.nrows(), clusters + 1));
        for i in 0..source.nrows() {
            for (c, v) in source.row(i) {
                let target = if c < foods { assignment[c] } else { clusters };
                data[[i, target]] += v;
            }
        }

        info!(
            rows = data.nrows(),
            columns = data.ncols(),
            "Built clustered matrix"
        );
        Ok(Self { data, clusters })
    }

    /// Index of the Other column.
    pub fn other_column(&self) -> usize {
        self.clusters
    }
}
