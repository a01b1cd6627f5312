// ObservationMatrix: one sparse row per person-day over the food index.

use std::borrow::Borrow;

use tracing::info;

use super::index::{FoodIndex, FoodIndexBuilder};
use super::sparse::{SparseBuilder, SparseMatrix};
use crate::diary::schema::FoodRecord;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct ObservationMatrix {
    pub index: FoodIndex,
    pub matrix: SparseMatrix,
}

impl ObservationMatrix {
    /// Build the food index over all records, then emit one row per record.
    /// An empty record becomes an all-zero row.
    pub fn build<R: Borrow<FoodRecord>>(records: &[R]) -> Result<Self, PipelineError> {
        let mut vocab = FoodIndexBuilder::new();
        for record in records {
            vocab.observe(record.borrow());
        }
        let index = vocab.freeze();

        let nnz = records.iter().map(|r| r.borrow().len()).sum();
        let mut builder = SparseBuilder::with_capacity(index.len(), nnz);
        for record in records {
            let record = record.borrow();
            let row: Vec<(usize, f64)> = record
                .foods
                .iter()
                .filter_map(|(name, &calories)| index.get(name).map(|col| (col, calories as f64)))
                .collect();
            PipelineError::check_dims("food index lookup", record.len(), row.len())?;
            builder.push_row(row)?;
        }
        let matrix = builder.finish()?;

        info!(
            rows = matrix.nrows(),
            foods = matrix.ncols(),
            nonzeros = matrix.nnz(),
            "Built sparse observation matrix"
        );

        Ok(Self { index, matrix })
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    /// The goal vector must have exactly one entry per row.
    pub fn check_goals(&self, goals: &[f64]) -> Result<(), PipelineError> {
        PipelineError::check_dims("goal vector", self.nrows(), goals.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_sums_equal_record_totals() {
        let records: Vec<FoodRecord> = vec![
            [("A", 200), ("B", 300)].into_iter().collect(),
            FoodRecord::default(),
            [("A", 150), ("C", 500)].into_iter().collect(),
        ];
        let obs = ObservationMatrix::build(&records).unwrap();

        assert_eq!(obs.nrows(), 3);
        assert_eq!(obs.index.len(), 3);
        let sums = obs.matrix.row_sums();
        for (record, sum) in records.iter().zip(sums) {
            assert_eq!(record.total_calories() as f64, sum);
        }
    }

    #[test]
    fn test_check_goals_length() {
        let records: Vec<FoodRecord> = vec![[("A", 1)].into_iter().collect()];
        let obs = ObservationMatrix::build(&records).unwrap();
        assert!(obs.check_goals(&[1.0]).is_ok());
        assert!(obs.check_goals(&[1.0, 2.0]).is_err());
    }
}
