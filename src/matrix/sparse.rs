// Sparse observation storage on faer's row-major sparse matrix.
//
// Rows are person-days and columns are foods, so a row holds a few dozen
// nonzeros while the column space can reach the millions. Rows are collected
// as triplets, handed to faer once, and then read back through the symbolic
// row pointers for sums and the two matrix-vector products LSQR runs on.

use std::fmt;

use faer::sparse::{SparseRowMat, Triplet};
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::PipelineError;

#[derive(Clone)]
pub struct SparseMatrix {
    inner: SparseRowMat<usize, f64>,
}

impl fmt::Debug for SparseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrix")
            .field("nrows", &self.nrows())
            .field("ncols", &self.ncols())
            .field("nnz", &self.nnz())
            .finish()
    }
}

/// Row-by-row triplet collector. Rows are appended in order; entries within
/// a row may arrive in any order but must name distinct columns.
#[derive(Debug)]
pub struct SparseBuilder {
    nrows: usize,
    ncols: usize,
    triplets: Vec<Triplet<usize, usize, f64>>,
}

impl SparseBuilder {
    pub fn new(ncols: usize) -> Self {
        Self::with_capacity(ncols, 0)
    }

    pub fn with_capacity(ncols: usize, nnz: usize) -> Self {
        Self {
            nrows: 0,
            ncols,
            triplets: Vec::with_capacity(nnz),
        }
    }

    /// Append one row. Explicit zeros are dropped.
    pub fn push_row<I>(&mut self, entries: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let mut row: Vec<(usize, f64)> = entries.into_iter().filter(|(_, v)| *v != 0.0).collect();
        row.sort_unstable_by_key(|(c, _)| *c);

        for (i, &(col, _)) in row.iter().enumerate() {
            if col >= self.ncols {
                return Err(PipelineError::DimensionMismatch {
                    stage: "sparse row column bound",
                    expected: self.ncols,
                    actual: col + 1,
                });
            }
            if i > 0 && row[i - 1].0 == col {
                return Err(PipelineError::DimensionMismatch {
                    stage: "sparse row duplicate column",
                    expected: row.len() - 1,
                    actual: row.len(),
                });
            }
        }
        let r = self.nrows;
        self.triplets
            .extend(row.into_iter().map(|(col, value)| Triplet::new(r, col, value)));
        self.nrows += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<SparseMatrix, PipelineError> {
        let (nrows, ncols, nnz) = (self.nrows, self.ncols, self.triplets.len());
        let inner = SparseRowMat::try_new_from_triplets(nrows, ncols, &self.triplets)
            .map_err(|_| PipelineError::SparseAllocation {
                rows: nrows,
                cols: ncols,
                nnz,
            })?;
        Ok(SparseMatrix { inner })
    }
}

impl SparseMatrix {
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Number of stored nonzeros.
    pub fn nnz(&self) -> usize {
        let (symbolic, _) = self.inner.parts();
        symbolic.row_ptr()[self.nrows()]
    }

    /// Iterate the stored `(column, value)` pairs of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (symbolic, values) = self.inner.parts();
        let row_ptr = symbolic.row_ptr();
        let span = row_ptr[i]..row_ptr[i + 1];
        symbolic.col_idx()[span.clone()]
            .iter()
            .copied()
            .zip(values[span].iter().copied())
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows())
            .map(|i| self.row(i).map(|(_, v)| v).sum())
            .collect()
    }

    pub fn col_sums(&self) -> Vec<f64> {
        let (symbolic, values) = self.inner.parts();
        let mut sums = vec![0.0; self.ncols()];
        for (&col, &value) in symbolic.col_idx().iter().zip(values) {
            sums[col] += value;
        }
        sums
    }

    /// `A · x`
    pub fn mul_vec(&self, x: &[f64]) -> Result<Vec<f64>, PipelineError> {
        PipelineError::check_dims("sparse A·x", self.ncols(), x.len())?;
        Ok((0..self.nrows())
            .into_par_iter()
            .map(|i| self.row(i).map(|(c, v)| v * x[c]).sum())
            .collect())
    }

    /// `Aᵀ · y`
    pub fn mul_t_vec(&self, y: &[f64]) -> Result<Vec<f64>, PipelineError> {
        PipelineError::check_dims("sparse Aᵀ·y", self.nrows(), y.len())?;
        let mut out = vec![0.0; self.ncols()];
        for (i, &yi) in y.iter().enumerate() {
            if yi == 0.0 {
                continue;
            }
            for (c, v) in self.row(i) {
                out[c] += v * yi;
            }
        }
        Ok(out)
    }

    /// Materialize densely. Only for small matrices (tests, diagnostics).
    pub fn to_dense(&self) -> Array2<f64> {
        let dense = self.inner.as_ref().to_dense();
        Array2::from_shape_fn((dense.nrows(), dense.ncols()), |(i, j)| dense[(i, j)])
    }
}
