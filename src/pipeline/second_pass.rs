// Pass 2: cluster the significant foods, re-solve densely, label clusters.

use anyhow::Result;
use ndarray::Array1;
use tracing::{info, warn};

use crate::clustering::embeddings::{embed_all, Embedder};
use crate::clustering::kmeans::Clusterer;
use crate::clustering::labels::{label_clusters, KeywordExtractor};
use crate::clustering::normalize::{Normalizer, Padding, TokenSequence};
use crate::config::Config;
use crate::error::Warning;
use crate::matrix::clustered::ClusteredMatrix;
use crate::matrix::significance::OTHER_LABEL;
use crate::solver::dense::least_squares;

use super::prepare::Prepared;
use super::report::{CoefficientRow, CoefficientTable};

pub const STAGE: &str = "second_pass";

/// Embedding, clustering and labelling services for the second pass.
pub struct Collaborators {
    pub embedder: Box<dyn Embedder>,
    pub clusterer: Box<dyn Clusterer>,
    pub keywords: Box<dyn KeywordExtractor>,
}

/// Normalize every name, reporting how many needed the two-token guard.
pub fn normalize_names(names: &[String], normalizer: &Normalizer) -> (Vec<TokenSequence>, Vec<Warning>) {
    let mut duplicated = 0;
    let mut placeholder = 0;
    let sequences = names
        .iter()
        .map(|name| {
            let (seq, padding) = normalizer.sequence(name);
            match padding {
                Padding::None => {}
                Padding::Duplicated => duplicated += 1,
                Padding::Placeholder => placeholder += 1,
            }
            seq
        })
        .collect();

    let mut warnings = Vec::new();
    if duplicated > 0 {
        warn!(count = duplicated, "Single-token food names duplicated");
        warnings.push(Warning::degenerate(
            "normalize",
            format!("{duplicated} food names reduced to a single token; token duplicated"),
        ));
    }
    if placeholder > 0 {
        warn!(count = placeholder, "Empty food names replaced by placeholder");
        warnings.push(Warning::degenerate(
            "normalize",
            format!("{placeholder} food names reduced to no tokens; placeholder used"),
        ));
    }
    (sequences, warnings)
}

/// One coefficient per labelled cluster plus Other.
pub async fn second_pass(
    prepared: &Prepared,
    config: &Config,
    collaborators: &Collaborators,
) -> Result<(CoefficientTable, Vec<Warning>)> {
    let augmented = &prepared.augmented;
    let names = augmented.food_names();
    let mut warnings = Vec::new();

    let k = config.clusters.min(names.len());
    if k < config.clusters {
        let detail = format!(
            "{} clusters requested but only {} significant foods; using {k}",
            config.clusters,
            names.len()
        );
        warn!("{detail}");
        warnings.push(Warning::degenerate("clustering", detail));
    }

    let assignments = if k == 0 {
        Vec::new()
    } else {
        let normalizer = Normalizer::new(&config.normalize);
        let (sequences, guard_warnings) = normalize_names(names, &normalizer);
        warnings.extend(guard_warnings);

        let points = embed_all(
            collaborators.embedder.as_ref(),
            &sequences,
            config.embed_batch_size,
        )
        .await?;
        let clustering = collaborators.clusterer.cluster(&points, k)?;
        warnings.extend(clustering.warning());
        clustering.assignments
    };

    let clustered = ClusteredMatrix::build(augmented, &assignments, k)?;
    let goals = Array1::from(prepared.goals.clone());
    let outcome = least_squares(&clustered.data, &goals, &config.dense)?;
    let diagnostics = outcome.diagnostics();
    warnings.extend(diagnostics.warning(STAGE));

    let mut members = vec![Vec::new(); k];
    for (name, &c) in names.iter().zip(&assignments) {
        members[c].push(name.clone());
    }
    let (labels, label_warnings) = label_clusters(collaborators.keywords.as_ref(), &members)?;
    warnings.extend(label_warnings);

    let mut rows: Vec<CoefficientRow> = labels
        .into_iter()
        .map(|l| CoefficientRow {
            coefficient: outcome.x[l.cluster],
            cluster: Some(l.cluster),
            label: l.label,
            members: l.members,
        })
        .collect();
    rows.push(CoefficientRow::new(
        OTHER_LABEL,
        outcome.x[clustered.other_column()],
    ));

    info!(
        clusters = k,
        labelled = rows.len() - 1,
        rank = outcome.rank,
        residual = outcome.residual_norm,
        "Second pass solved"
    );

    Ok((
        CoefficientTable {
            stage: STAGE.to_string(),
            rows,
            diagnostics,
        },
        warnings,
    ))
}
