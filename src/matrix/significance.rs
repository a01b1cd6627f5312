// Significance partitioning and the augmented first-pass matrix.
//
// A food keeps its own column when its total calories across the whole
// dataset reach the threshold. Everything else is folded, row by row, into a
// single trailing "Other" column, so each augmented row still sums to the
// same total as the observation row it came from.

use tracing::{info, warn};

use super::observation::ObservationMatrix;
use super::sparse::{SparseBuilder, SparseMatrix};
use crate::error::{PipelineError, Warning};

/// Label of the aggregate column for insignificant foods.
pub const OTHER_LABEL: &str = "Other";

/// Disjoint, exhaustive split of the food index space.
#[derive(Debug, Clone)]
pub struct SignificancePartition {
    pub threshold: f64,
    /// Food index → total calories over all rows
    pub column_sums: Vec<f64>,
    pub significant: Vec<usize>,
    pub insignificant: Vec<usize>,
}

impl SignificancePartition {
    pub fn compute(matrix: &SparseMatrix, threshold: f64) -> Self {
        let column_sums = matrix.col_sums();
        let (significant, insignificant): (Vec<usize>, Vec<usize>) =
            (0..column_sums.len()).partition(|&c| column_sums[c] >= threshold);

        let partition = Self {
            threshold,
            column_sums,
            significant,
            insignificant,
        };

        info!(
            threshold,
            significant = partition.significant.len(),
            insignificant = partition.insignificant.len(),
            retained_fraction = partition.retained_fraction(),
            "Partitioned foods by total calories"
        );
        partition
    }

    /// Share of all calories that land in named (significant) columns.
    /// Zero when the dataset has no calories at all.
    pub fn retained_fraction(&self) -> f64 {
        let total: f64 = self.column_sums.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let kept: f64 = self.significant.iter().map(|&c| self.column_sums[c]).sum();
        kept / total
    }

    /// A warning when the threshold keeps nothing or drops nothing.
    pub fn degenerate_warning(&self) -> Option<Warning> {
        if self.column_sums.is_empty() {
            return None;
        }
        let detail = if self.significant.is_empty() {
            format!(
                "threshold {} excludes all {} foods; only the Other column remains",
                self.threshold,
                self.insignificant.len()
            )
        } else if self.insignificant.is_empty() {
            format!(
                "threshold {} keeps all {} foods; the Other column is all zero",
                self.threshold,
                self.significant.len()
            )
        } else {
            return None;
        };
        warn!("{detail}");
        Some(Warning::degenerate("significance", detail))
    }
}

/// Significant food columns plus a trailing Other column.
#[derive(Debug, Clone)]
pub struct AugmentedMatrix {
    /// Rows × (significant + 1), Other last
    pub matrix: SparseMatrix,
    /// Column labels: significant food names then `OTHER_LABEL`
    pub labels: Vec<String>,
    /// Food index of each significant column, in column order
    pub food_columns: Vec<usize>,
    /// Row-wise sum of insignificant columns
    pub other: Vec<f64>,
}

impl AugmentedMatrix {
    pub fn build(
        observations: &ObservationMatrix,
        partition: &SignificancePartition,
    ) -> Result<Self, PipelineError> {
        let source = &observations.matrix;
        PipelineError::check_dims(
            "significance partition",
            source.ncols(),
            partition.column_sums.len(),
        )?;

        let mut remap = vec![None; source.ncols()];
        for (new, &old) in partition.significant.iter().enumerate() {
            remap[old] = Some(new);
        }
        let other_col = partition.significant.len();

        let mut builder = SparseBuilder::with_capacity(other_col + 1, source.nnz() + source.nrows());
        let mut other = Vec::with_capacity(source.nrows());
        for i in 0..source.nrows() {
            let mut row = Vec::new();
            let mut rest = 0.0;
            for (c, v) in source.row(i) {
                match remap[c] {
                    Some(n) => row.push((n, v)),
                    None => rest += v,
                }
            }
            row.push((other_col, rest));
            other.push(rest);
            builder.push_row(row)?;
        }

        let mut labels = Vec::with_capacity(other_col + 1);
        for &c in &partition.significant {
            let name = observations.index.name(c).ok_or(PipelineError::DimensionMismatch {
                stage: "food index inverse lookup",
                expected: observations.index.len(),
                actual: c + 1,
            })?;
            labels.push(name.to_string());
        }
        labels.push(OTHER_LABEL.to_string());

        Ok(Self {
            matrix: builder.finish()?,
            labels,
            food_columns: partition.significant.clone(),
            other,
        })
    }

    /// Number of named food columns (excludes Other).
    pub fn food_count(&self) -> usize {
        self.food_columns.len()
    }

    pub fn food_names(&self) -> &[String] {
        &self.labels[..self.food_count()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diary::schema::FoodRecord;

    fn observations() -> ObservationMatrix {
        let records: Vec<FoodRecord> = vec![
            [("A", 200), ("B", 300)].into_iter().collect(),
            [("A", 150), ("C", 500)].into_iter().collect(),
            [("B", 400)].into_iter().collect(),
        ];
        ObservationMatrix::build(&records).unwrap()
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let obs = observations();
        let p = SignificancePartition::compute(&obs.matrix, 500.0);
        let mut all: Vec<usize> = p.significant.iter().chain(&p.insignificant).copied().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2]);
        // A = 350, B = 700, C = 500
        assert_eq!(p.significant, vec![1, 2]);
        assert_eq!(p.insignificant, vec![0]);
        assert!(p.degenerate_warning().is_none());
    }

    #[test]
    fn test_other_column_conserves_row_sums() {
        let obs = observations();
        let p = SignificancePartition::compute(&obs.matrix, 600.0);
        let aug = AugmentedMatrix::build(&obs, &p).unwrap();
        assert_eq!(aug.labels, vec!["B", "Other"]);
        assert_eq!(aug.matrix.row_sums(), obs.matrix.row_sums());
        assert_eq!(aug.other, vec![200.0, 650.0, 0.0]);
    }

    #[test]
    fn test_retained_fraction() {
        let obs = observations();
        let p = SignificancePartition::compute(&obs.matrix, 600.0);
        assert!((p.retained_fraction() - 700.0 / 1550.0).abs() < 1e-12);
    }

    #[test]
    fn test_everything_excluded_warns() {
        let obs = observations();
        let p = SignificancePartition::compute(&obs.matrix, 1000.0);
        assert!(p.significant.is_empty());
        assert!(matches!(
            p.degenerate_warning(),
            Some(Warning::DegenerateInput { .. })
        ));
    }
}
