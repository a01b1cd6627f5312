// Stages 1-3: extraction, observation matrix, significance partition.

use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::diary::extract::{extract_all, Extraction};
use crate::diary::schema::DiaryEntry;
use crate::error::{PipelineError, Warning};
use crate::matrix::observation::ObservationMatrix;
use crate::matrix::significance::{AugmentedMatrix, SignificancePartition};

use super::report::DatasetStats;

/// Everything both regression passes need, built once.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub observations: ObservationMatrix,
    /// One calorie goal per observation row
    pub goals: Vec<f64>,
    pub partition: SignificancePartition,
    pub augmented: AugmentedMatrix,
    pub stats: DatasetStats,
    pub warnings: Vec<Warning>,
}

/// Extract records, build the sparse matrix and the augmented matrix.
pub fn prepare(entries: &[Result<DiaryEntry, PipelineError>], config: &Config) -> Result<Prepared> {
    let extraction = extract_all(entries, config.duplicates, config.on_parse_error)?;
    let goals = extraction.goals();

    let observations = ObservationMatrix::build(&extraction.records())?;
    observations.check_goals(&goals)?;

    let partition = SignificancePartition::compute(&observations.matrix, config.threshold);
    let augmented = AugmentedMatrix::build(&observations, &partition)?;

    let stats = dataset_stats(entries.len(), &extraction, &observations, &partition);
    info!(
        days = stats.days,
        people = stats.people,
        foods = stats.distinct_foods,
        significant = stats.significant_foods,
        "Prepared regression inputs"
    );

    let Extraction { mut warnings, .. } = extraction;
    warnings.extend(partition.degenerate_warning());

    Ok(Prepared {
        observations,
        goals,
        partition,
        augmented,
        stats,
        warnings,
    })
}

fn dataset_stats(
    lines_read: usize,
    extraction: &Extraction,
    observations: &ObservationMatrix,
    partition: &SignificancePartition,
) -> DatasetStats {
    let people: HashSet<&str> = extraction
        .days
        .iter()
        .map(|d| d.person_id.as_str())
        .collect();

    DatasetStats {
        lines_read,
        days: extraction.days.len(),
        skipped: extraction.skipped(),
        people: people.len(),
        first_date: extraction.days.iter().map(|d| d.date).min(),
        last_date: extraction.days.iter().map(|d| d.date).max(),
        total_calories: partition.column_sums.iter().sum(),
        distinct_foods: observations.index.len(),
        significant_foods: partition.significant.len(),
        threshold: partition.threshold,
        retained_fraction: partition.retained_fraction(),
    }
}
