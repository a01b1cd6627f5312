// Report types produced by the pipeline.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Warning;
use crate::solver::SolveDiagnostics;

/// One fitted coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub label: String,
    pub coefficient: f64,
    /// Cluster id for second-pass rows; absent for food columns and Other
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,
    /// Member food names for cluster rows
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

impl CoefficientRow {
    pub fn new(label: impl Into<String>, coefficient: f64) -> Self {
        Self {
            label: label.into(),
            coefficient,
            cluster: None,
            members: Vec::new(),
        }
    }
}

/// Coefficients from one regression pass, in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientTable {
    pub stage: String,
    pub rows: Vec<CoefficientRow>,
    pub diagnostics: SolveDiagnostics,
}

impl CoefficientTable {
    /// Rows ranked by coefficient, largest first. NaN sorts last.
    pub fn sorted_desc(&self) -> Vec<&CoefficientRow> {
        let mut rows: Vec<&CoefficientRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| match (a.coefficient.is_nan(), b.coefficient.is_nan()) {
            (false, false) => b.coefficient.total_cmp(&a.coefficient),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => Ordering::Equal,
        });
        rows
    }

    pub fn get(&self, label: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

/// Dataset shape after extraction and partitioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub lines_read: usize,
    /// Person-days that made it into the matrix
    pub days: usize,
    pub skipped: usize,
    pub people: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub total_calories: f64,
    pub distinct_foods: usize,
    pub significant_foods: usize,
    pub threshold: f64,
    pub retained_fraction: f64,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct SatietyReport {
    pub stats: DatasetStats,
    pub first_pass: CoefficientTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_pass: Option<CoefficientTable>,
    pub warnings: Vec<Warning>,
}

impl SatietyReport {
    /// The final table: the second pass when it ran, otherwise the first.
    pub fn final_table(&self) -> &CoefficientTable {
        self.second_pass.as_ref().unwrap_or(&self.first_pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &[(&str, f64)]) -> CoefficientTable {
        CoefficientTable {
            stage: "test".to_string(),
            rows: values
                .iter()
                .map(|&(label, c)| CoefficientRow::new(label, c))
                .collect(),
            diagnostics: SolveDiagnostics {
                converged: true,
                iterations: 1,
                stop_reason: "ok".to_string(),
                residual_norm: 0.0,
                normal_residual_norm: 0.0,
                rank: None,
                condition_estimate: None,
            },
        }
    }

    #[test]
    fn test_sorted_desc_puts_nan_last() {
        let t = table(&[("a", 0.5), ("b", f64::NAN), ("c", 2.0), ("d", -1.0)]);
        let order: Vec<&str> = t.sorted_desc().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_row_serialization_omits_empty_fields() {
        let json = serde_json::to_value(CoefficientRow::new("Other", 1.5)).unwrap();
        assert_eq!(json, serde_json::json!({"label": "Other", "coefficient": 1.5}));
    }
}
