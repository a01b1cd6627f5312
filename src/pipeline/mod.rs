// End-to-end satiety analysis.
//
// prepare      extraction → observation matrix → significance → augmented
// first_pass   LSQR on the augmented matrix
// second_pass  normalize → embed → k-means → clustered matrix → dense QR → labels
//
// Each stage consumes the previous stage's output in full; warnings from
// every stage are collected into the final report in stage order.

pub mod first_pass;
pub mod prepare;
pub mod report;
pub mod second_pass;

use anyhow::Result;
use tracing::warn;

use crate::clustering::embeddings::{Embedder, HashingEmbedder, SentenceEmbedder};
use crate::clustering::kmeans::KMeans;
use crate::clustering::labels::RakeExtractor;
use crate::config::{Config, EmbedderBackend};
use crate::diary::schema::DiaryEntry;
use crate::download::{embedding_files_present, embedding_model_dir};
use crate::error::{PipelineError, Warning};

pub use first_pass::first_pass;
pub use prepare::{prepare, Prepared};
pub use report::{CoefficientRow, CoefficientTable, DatasetStats, SatietyReport};
pub use second_pass::{second_pass, Collaborators};

impl Collaborators {
    /// Build the configured embedder plus k-means and RAKE.
    ///
    /// When the ONNX model is selected but not downloaded, falls back to the
    /// hashing embedder and returns a warning saying so. A model that is
    /// present but fails to load is an error.
    pub fn from_config(config: &Config) -> Result<(Self, Option<Warning>)> {
        let (embedder, fallback): (Box<dyn Embedder>, Option<Warning>) = match config.embedder {
            EmbedderBackend::Hashing => (Box::new(HashingEmbedder::new(config.hash_dim)), None),
            EmbedderBackend::Onnx if embedding_files_present(&config.model_dir) => {
                let dir = embedding_model_dir(&config.model_dir);
                (Box::new(SentenceEmbedder::load(&dir)?), None)
            }
            EmbedderBackend::Onnx => {
                let detail = format!(
                    "embedding model not found under {}; using the hashing embedder \
                     (run `satiety download-model` for sentence embeddings)",
                    config.model_dir.display()
                );
                warn!("{detail}");
                (
                    Box::new(HashingEmbedder::new(config.hash_dim)),
                    Some(Warning::degenerate("embedding", detail)),
                )
            }
        };

        Ok((
            Self {
                embedder,
                clusterer: Box::new(KMeans::new(config.kmeans.clone())),
                keywords: Box::new(RakeExtractor::default()),
            },
            fallback,
        ))
    }
}

/// Run the whole analysis. `collaborators` is only needed for the second
/// pass; pass `None` to stop after the first.
pub async fn run(
    entries: &[Result<DiaryEntry, PipelineError>],
    config: &Config,
    collaborators: Option<&Collaborators>,
) -> Result<SatietyReport> {
    config.validate()?;

    let prepared = prepare(entries, config)?;
    let mut warnings = prepared.warnings.clone();

    let (first, first_warnings) = first_pass(&prepared, &config.lsqr)?;
    warnings.extend(first_warnings);

    let second = match collaborators {
        Some(collaborators) => {
            let (table, second_warnings) = second_pass(&prepared, config, collaborators).await?;
            warnings.extend(second_warnings);
            Some(table)
        }
        None => None,
    };

    Ok(SatietyReport {
        stats: prepared.stats,
        first_pass: first,
        second_pass: second,
        warnings,
    })
}
