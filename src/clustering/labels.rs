// Cluster labelling.
//
// Each cluster's member food names (as they appear in the diaries) are joined
// into one text and handed to a keyword extractor; the top-ranked phrase
// becomes the cluster's label. Distinct clusters may end up with the same
// label. That is reported, not rewritten; rows keep their cluster id.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use keyword_extraction::rake::{Rake, RakeParams};
use serde::Serialize;
use stop_words::{get, LANGUAGE};
use tracing::{debug, warn};

use crate::error::Warning;

/// Keyword-extraction collaborator: one text in, ranked phrases out.
pub trait KeywordExtractor: Send + Sync {
    fn ranked_phrases(&self, text: &str) -> Result<Vec<String>>;
}

/// RAKE over English stopwords.
pub struct RakeExtractor {
    stop_words: Vec<String>,
    /// Phrases requested from RAKE per text
    pub top_n: usize,
}

impl Default for RakeExtractor {
    fn default() -> Self {
        Self {
            stop_words: get(LANGUAGE::English),
            top_n: 5,
        }
    }
}

impl KeywordExtractor for RakeExtractor {
    fn ranked_phrases(&self, text: &str) -> Result<Vec<String>> {
        let rake = Rake::new(RakeParams::WithDefaults(text, &self.stop_words));
        Ok(rake.get_ranked_phrases(self.top_n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterLabel {
    pub cluster: usize,
    pub label: String,
    /// Member food names, original spelling
    pub members: Vec<String>,
}

/// Label every non-empty cluster. `members[c]` holds the names in cluster c.
///
/// Returns labels in cluster-id order plus any warnings: empty clusters,
/// texts the extractor found no phrase in (labelled with the first member's
/// name), and label collisions.
pub fn label_clusters(
    extractor: &dyn KeywordExtractor,
    members: &[Vec<String>],
) -> Result<(Vec<ClusterLabel>, Vec<Warning>)> {
    let mut labels = Vec::with_capacity(members.len());
    let mut warnings = Vec::new();

    for (cluster, names) in members.iter().enumerate() {
        let Some(first) = names.first() else {
            warn!(cluster, "Cluster has no members; no label produced");
            warnings.push(Warning::degenerate(
                "labels",
                format!("cluster {cluster} has no members"),
            ));
            continue;
        };

        let text = names.join(". ");
        let phrases = extractor
            .ranked_phrases(&text)
            .with_context(|| format!("Keyword extraction failed for cluster {cluster}"))?;

        let label = match phrases.into_iter().find(|p| !p.trim().is_empty()) {
            Some(phrase) => phrase,
            None => {
                warn!(cluster, fallback = %first, "No keyword phrase found; using member name");
                warnings.push(Warning::degenerate(
                    "labels",
                    format!("cluster {cluster}: no keyword phrase, labelled '{first}'"),
                ));
                first.clone()
            }
        };
        debug!(cluster, label = %label, size = names.len(), "Labelled cluster");

        labels.push(ClusterLabel {
            cluster,
            label,
            members: names.clone(),
        });
    }

    warnings.extend(collisions(&labels));
    Ok((labels, warnings))
}

/// One warning per label shared by two or more clusters.
pub fn collisions(labels: &[ClusterLabel]) -> Vec<Warning> {
    let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for l in labels {
        by_label.entry(l.label.as_str()).or_default().push(l.cluster);
    }
    by_label
        .into_iter()
        .filter(|(_, clusters)| clusters.len() > 1)
        .map(|(label, clusters)| {
            warn!(label, clusters = ?clusters, "Label shared by several clusters");
            Warning::LabelCollision {
                label: label.to_string(),
                clusters,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the first word of the text, lowercased.
    struct FirstWord;

    impl KeywordExtractor for FirstWord {
        fn ranked_phrases(&self, text: &str) -> Result<Vec<String>> {
            Ok(text
                .split_whitespace()
                .next()
                .map(|w| vec![w.trim_matches('.').to_lowercase()])
                .unwrap_or_default())
        }
    }

    struct Nothing;

    impl KeywordExtractor for Nothing {
        fn ranked_phrases(&self, _text: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_labels_follow_cluster_order() {
        let members = vec![names(&["Apple Pie", "Apple Crumble"]), names(&["Green Salad"])];
        let (labels, warnings) = label_clusters(&FirstWord, &members).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].label, "apple");
        assert_eq!(labels[1].label, "green");
        assert_eq!(labels[1].cluster, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_collision_is_flagged_not_rewritten() {
        let members = vec![names(&["Apple Pie"]), names(&["Apple Juice"])];
        let (labels, warnings) = label_clusters(&FirstWord, &members).unwrap();
        assert_eq!(labels[0].label, "apple");
        assert_eq!(labels[1].label, "apple");
        assert_eq!(
            warnings,
            vec![Warning::LabelCollision {
                label: "apple".to_string(),
                clusters: vec![0, 1],
            }]
        );
    }

    #[test]
    fn test_empty_cluster_and_fallback_label() {
        let members = vec![Vec::new(), names(&["Mystery Item"])];
        let (labels, warnings) = label_clusters(&Nothing, &members).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].cluster, 1);
        assert_eq!(labels[0].label, "Mystery Item");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_rake_labels_single_item_text() {
        let phrases = RakeExtractor::default()
            .ranked_phrases("Greek Yogurt Plain")
            .unwrap();
        assert!(!phrases.is_empty());
    }
}
