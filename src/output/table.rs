// Coefficient tables on disk.
//
// TSV: `label<TAB>coefficient<TAB>cluster`, one row per coefficient, ranked
// largest first. Coefficients use Rust's shortest round-trip formatting so
// the written text parses back to the identical f64. Tabs and newlines in
// labels are replaced with spaces.
//
// JSON: the full report, including diagnostics, warnings, and members.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::{CoefficientTable, SatietyReport};

pub fn write_tsv<W: Write>(table: &CoefficientTable, mut out: W) -> Result<()> {
    writeln!(out, "label\tcoefficient\tcluster")?;
    for row in table.sorted_desc() {
        let label: String = row
            .label
            .chars()
            .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let cluster = row.cluster.map(|c| c.to_string()).unwrap_or_default();
        writeln!(out, "{label}\t{}\t{cluster}", row.coefficient)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(report: &SatietyReport, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, report).context("Failed to serialize report")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

pub fn save_tsv(table: &CoefficientTable, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_tsv(table, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn save_json(report: &SatietyReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_json(report, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))
}
