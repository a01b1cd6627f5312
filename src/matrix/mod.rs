// Matrix construction: sparse observations, significance bucketing, and
// the clustered dense matrix for the second pass.

pub mod clustered;
pub mod index;
pub mod observation;
pub mod significance;
pub mod sparse;
