// Composition tests: the whole pipeline from diary text to coefficient table.
//
// These tests exercise the data flow between modules:
//   reader -> extract -> observation -> significance -> LSQR
//          -> normalize -> embed -> k-means -> clustered -> dense QR -> labels
// using the hashing embedder, so no model files or network are needed.

use std::collections::BTreeSet;

use approx::assert_relative_eq;

use satiety::clustering::embeddings::HashingEmbedder;
use satiety::clustering::kmeans::KMeans;
use satiety::clustering::labels::RakeExtractor;
use satiety::config::{Config, EmbedderBackend, KMeansConfig};
use satiety::diary::reader::read_entries;
use satiety::error::Warning;
use satiety::matrix::clustered::ClusteredMatrix;
use satiety::matrix::significance::OTHER_LABEL;
use satiety::output::table::{write_json, write_tsv};
use satiety::pipeline::{self, prepare, Collaborators};

const MENU: &[(&str, u32)] = &[
    ("Oatmeal, Rolled Oats", 150),
    ("Steel Cut Oatmeal", 170),
    ("Banana, Medium", 105),
    ("Bananas", 120),
    ("Chicken Breast, Grilled", 280),
    ("Grilled Chicken Thighs", 310),
    ("Brown Rice, Cooked", 215),
    ("White Rice", 205),
    ("Broccoli, Steamed", 55),
    ("Cheddar Cheese", 115),
    ("Chocolate Chip Cookie", 220),
    ("Greek Yogurt, Plain", 130),
    ("Pickle Spear", 4),
];

fn diary_text(days: usize) -> String {
    (0..days)
        .map(|day| {
            let dishes: Vec<String> = MENU
                .iter()
                .enumerate()
                .filter(|(i, _)| (day * 5 + i * 3) % 4 != 0)
                .map(|(i, &(name, cal))| {
                    let cal = cal + ((day * 13 + i * 7) % 50) as u32;
                    format!(
                        r#"{{"name":"{name}","nutritions":[{{"name":"Calories","value":"{cal}"}}]}}"#
                    )
                })
                .collect();
            let goal = 1400 + (day * 37) % 900;
            format!(
                "{person}\t2014-09-{date:02}\t[{{\"meal\":\"Breakfast\",\"sequence\":1,\"dishes\":[{dishes}]}}]\t{{\"total\":[],\"goal\":[{{\"name\":\"Calories\",\"value\":\"{goal}\"}}]}}",
                person = day % 7,
                date = day % 28 + 1,
                dishes = dishes.join(","),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn config() -> Config {
    Config {
        threshold: 1500.0,
        clusters: 4,
        embedder: EmbedderBackend::Hashing,
        hash_dim: 128,
        ..Config::default()
    }
}

fn collaborators(config: &Config) -> Collaborators {
    Collaborators {
        embedder: Box::new(HashingEmbedder::new(config.hash_dim)),
        clusterer: Box::new(KMeans::new(config.kmeans.clone())),
        keywords: Box::new(RakeExtractor::default()),
    }
}

// ============================================================
// Chain: diary text -> prepared matrices
// ============================================================

#[test]
fn prepared_stats_describe_the_dataset() {
    let entries = read_entries(diary_text(30).as_bytes()).unwrap();
    let prepared = prepare(&entries, &config()).unwrap();

    assert_eq!(prepared.stats.days, 30);
    assert_eq!(prepared.stats.skipped, 0);
    assert_eq!(prepared.stats.people, 7);
    assert_eq!(prepared.stats.distinct_foods, MENU.len());
    assert!(prepared.stats.significant_foods > 0);
    assert!(prepared.stats.significant_foods < MENU.len());
    assert!(prepared.stats.retained_fraction > 0.5 && prepared.stats.retained_fraction < 1.0);
    assert_eq!(prepared.goals.len(), prepared.augmented.matrix.nrows());

    let observed = prepared.observations.matrix.row_sums();
    for (a, o) in prepared.augmented.matrix.row_sums().iter().zip(&observed) {
        assert_relative_eq!(*a, *o);
    }
}

#[test]
fn bad_lines_are_skipped_without_breaking_alignment() {
    let mut text = diary_text(10);
    text.push_str("\nnot\ta\tvalid line");
    text.push_str("\n99\t2014-10-01\t[]\t{\"goal\":[]}");
    let entries = read_entries(text.as_bytes()).unwrap();
    let prepared = prepare(&entries, &config()).unwrap();

    assert_eq!(prepared.stats.lines_read, 12);
    assert_eq!(prepared.stats.days, 10);
    assert_eq!(prepared.stats.skipped, 2);
    assert_eq!(prepared.goals.len(), prepared.observations.nrows());
}

// ============================================================
// Chain: full two-pass run
// ============================================================

#[tokio::test]
async fn full_run_produces_labelled_cluster_table() {
    let entries = read_entries(diary_text(40).as_bytes()).unwrap();
    let config = config();
    let collaborators = collaborators(&config);
    let report = pipeline::run(&entries, &config, Some(&collaborators)).await.unwrap();

    // First pass: one coefficient per significant food plus Other.
    assert_eq!(report.first_pass.rows.len(), report.stats.significant_foods + 1);
    assert_eq!(report.first_pass.rows.last().unwrap().label, OTHER_LABEL);

    // Second pass: one row per non-empty cluster plus Other.
    let second = report.second_pass.as_ref().unwrap();
    let k = config.clusters.min(report.stats.significant_foods);
    let cluster_ids: BTreeSet<usize> = second.rows.iter().filter_map(|r| r.cluster).collect();
    assert_eq!(cluster_ids.len(), second.rows.len() - 1);
    assert!(cluster_ids.iter().all(|&c| c < k));
    assert!(second.get(OTHER_LABEL).is_some());

    // Every significant food lands in exactly one cluster row.
    let mut members: Vec<&str> = second
        .rows
        .iter()
        .flat_map(|r| r.members.iter().map(String::as_str))
        .collect();
    members.sort_unstable();
    let prepared = prepare(&entries, &config).unwrap();
    let mut significant: Vec<&str> = prepared
        .augmented
        .food_names()
        .iter()
        .map(String::as_str)
        .collect();
    significant.sort_unstable();
    assert_eq!(members, significant);

    assert!(second.rows.iter().all(|r| r.coefficient.is_finite()));
    assert_eq!(report.final_table().stage, "second_pass");
}

#[tokio::test]
async fn rerun_with_same_seed_is_identical() {
    let entries = read_entries(diary_text(40).as_bytes()).unwrap();
    let config = config();
    let collaborators = collaborators(&config);

    let a = pipeline::run(&entries, &config, Some(&collaborators)).await.unwrap();
    let b = pipeline::run(&entries, &config, Some(&collaborators)).await.unwrap();

    let sa = a.second_pass.unwrap();
    let sb = b.second_pass.unwrap();
    assert_eq!(sa.rows.len(), sb.rows.len());
    for (ra, rb) in sa.rows.iter().zip(&sb.rows) {
        assert_eq!(ra.cluster, rb.cluster);
        assert_eq!(ra.members, rb.members);
        assert_relative_eq!(ra.coefficient, rb.coefficient, max_relative = 1e-9);
    }
    for (ra, rb) in a.first_pass.rows.iter().zip(&b.first_pass.rows) {
        assert_relative_eq!(ra.coefficient, rb.coefficient, max_relative = 1e-9);
    }
}

#[test]
fn clustered_matrix_conserves_row_sums_for_real_assignment() {
    let entries = read_entries(diary_text(25).as_bytes()).unwrap();
    let config = config();
    let prepared = prepare(&entries, &config).unwrap();

    let names = prepared.augmented.food_names();
    let k = config.clusters.min(names.len());
    let assignment = satiety::clustering::kmeans::fit(
        &ndarray::Array2::from_shape_fn((names.len(), 2), |(i, j)| (i * (j + 1)) as f64),
        k,
        &KMeansConfig::default(),
    )
    .unwrap();
    let clustered = ClusteredMatrix::build(&prepared.augmented, &assignment.assignments, k).unwrap();

    let augmented_sums = prepared.augmented.matrix.row_sums();
    for (row, expected) in clustered.data.rows().into_iter().zip(&augmented_sums) {
        assert_relative_eq!(row.sum(), *expected);
    }
}

#[tokio::test]
async fn too_many_clusters_are_clamped_with_warning() {
    let entries = read_entries(diary_text(20).as_bytes()).unwrap();
    let config = Config {
        clusters: 500,
        ..config()
    };
    let collaborators = collaborators(&config);
    let report = pipeline::run(&entries, &config, Some(&collaborators)).await.unwrap();

    let second = report.second_pass.unwrap();
    assert_eq!(second.rows.len(), report.stats.significant_foods + 1);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        Warning::DegenerateInput { stage, .. } if stage == "clustering"
    )));
}

#[tokio::test]
async fn threshold_above_every_food_still_solves() {
    let entries = read_entries(diary_text(10).as_bytes()).unwrap();
    let config = Config {
        threshold: 1e9,
        ..config()
    };
    let collaborators = collaborators(&config);
    let report = pipeline::run(&entries, &config, Some(&collaborators)).await.unwrap();

    assert_eq!(report.first_pass.rows.len(), 1);
    let second = report.second_pass.unwrap();
    assert_eq!(second.rows.len(), 1);
    assert_eq!(second.rows[0].label, OTHER_LABEL);
    assert!(second.rows[0].coefficient > 0.0);
}

// ============================================================
// Chain: report -> serialized output
// ============================================================

#[tokio::test]
async fn first_pass_only_run_serializes() {
    let entries = read_entries(diary_text(15).as_bytes()).unwrap();
    let report = pipeline::run(&entries, &config(), None).await.unwrap();
    assert!(report.second_pass.is_none());
    assert_eq!(report.final_table().stage, "first_pass");

    let mut tsv = Vec::new();
    write_tsv(report.final_table(), &mut tsv).unwrap();
    let tsv = String::from_utf8(tsv).unwrap();
    assert_eq!(tsv.lines().count(), report.first_pass.rows.len() + 1);
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        let row = report.first_pass.get(fields[0]).unwrap();
        assert_eq!(fields[1].parse::<f64>().unwrap(), row.coefficient);
    }

    let mut json = Vec::new();
    write_json(&report, &mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["stats"]["days"], 15);
    assert!(value.get("second_pass").is_none());
    assert!(value["first_pass"]["diagnostics"]["converged"].is_boolean());
    assert!(value["first_pass"]["diagnostics"]["condition_estimate"].is_number());
}
