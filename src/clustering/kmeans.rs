// Seeded k-means over embedding vectors.
//
// k-means++ initialisation from a fixed seed, then Lloyd iterations until the
// total squared centroid shift drops under `tol` scaled by the mean per-feature
// variance of the data. The assignment step runs in parallel; ties go to the
// lowest cluster id so results do not depend on thread scheduling.
//
// A cluster left empty after an assignment step is reseeded with the point
// farthest from its own centroid, taken from a cluster that can spare it.

use anyhow::Result;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::KMeansConfig;
use crate::error::Warning;

/// Centroid clustering collaborator: points in, one cluster id per row out.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, points: &Array2<f64>, k: usize) -> Result<ClusterAssignment>;
}

/// Result of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// Cluster id in [0, k) for each input row
    pub assignments: Vec<usize>,
    pub k: usize,
    pub centroids: Array2<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Sum of squared distances from each point to its centroid
    pub inertia: f64,
    /// Number of empty-cluster reseeds performed
    pub reseeded: usize,
}

impl ClusterAssignment {
    /// Row indices belonging to each cluster id.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.k];
        for (row, &c) in self.assignments.iter().enumerate() {
            members[c].push(row);
        }
        members
    }

    pub fn warning(&self) -> Option<Warning> {
        (!self.converged).then(|| Warning::Convergence {
            stage: "k-means".to_string(),
            iterations: self.iterations,
            reason: "centroid shift stayed above tolerance".to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct KMeans {
    pub config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }
}

impl Clusterer for KMeans {
    fn cluster(&self, points: &Array2<f64>, k: usize) -> Result<ClusterAssignment> {
        fit(points, k, &self.config)
    }
}

/// Partition the rows of `points` into exactly `k` clusters.
pub fn fit(points: &Array2<f64>, k: usize, config: &KMeansConfig) -> Result<ClusterAssignment> {
    let (n, dim) = points.dim();
    if k == 0 {
        anyhow::bail!("k-means needs at least one cluster");
    }
    if n < k {
        anyhow::bail!("k-means asked for {k} clusters from {n} points");
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut centroids = init_plus_plus(points, k, &mut rng);
    let tol = config.tol * mean_variance(points);

    let mut assignments = vec![0; n];
    let mut iterations = 0;
    let mut converged = false;
    let mut reseeded = 0;

    while iterations < config.max_iter.max(1) {
        iterations += 1;

        let nearest = assign(points, &centroids);
        let mut distances: Vec<f64> = nearest.iter().map(|&(_, d)| d).collect();
        assignments = nearest.into_iter().map(|(c, _)| c).collect();
        reseeded += reseed_empty(&mut assignments, &mut distances, k);

        let updated = update_centroids(points, &assignments, k, dim);
        let shift: f64 = (&updated - &centroids).mapv(|v| v * v).sum();
        centroids = updated;

        debug!(iteration = iterations, shift, "k-means step");
        if shift <= tol {
            converged = true;
            break;
        }
    }

    let inertia = assignments
        .iter()
        .enumerate()
        .map(|(row, &c)| sq_dist(points.row(row), centroids.row(c)))
        .sum();

    info!(
        points = n,
        clusters = k,
        iterations,
        converged,
        inertia,
        reseeded,
        "k-means finished"
    );

    Ok(ClusterAssignment {
        assignments,
        k,
        centroids,
        iterations,
        converged,
        inertia,
        reseeded,
    })
}

fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean_variance(points: &Array2<f64>) -> f64 {
    match points.var_axis(Axis(0), 0.0).mean() {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// k-means++: each new centre is drawn with probability proportional to its
/// squared distance from the nearest centre chosen so far.
fn init_plus_plus(points: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = points.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..n));

    let mut d2: Vec<f64> = (0..n)
        .map(|i| sq_dist(points.row(i), points.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = None;
            for (i, &w) in d2.iter().enumerate() {
                acc += w;
                if w > 0.0 && acc > target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave `acc` a hair under `target`.
            pick.or_else(|| d2.iter().rposition(|&w| w > 0.0))
        } else {
            None
        };
        // Every remaining point coincides with a centre.
        let next = next
            .or_else(|| (0..n).find(|i| !chosen.contains(i)))
            .unwrap_or(0);

        chosen.push(next);
        for (i, d) in d2.iter_mut().enumerate() {
            *d = d.min(sq_dist(points.row(i), points.row(next)));
        }
    }

    let mut centroids = Array2::zeros((k, points.ncols()));
    for (c, &row) in chosen.iter().enumerate() {
        centroids.row_mut(c).assign(&points.row(row));
    }
    centroids
}

/// Nearest centroid and squared distance for every point.
fn assign(points: &Array2<f64>, centroids: &Array2<f64>) -> Vec<(usize, f64)> {
    points
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|p| {
            centroids
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(c, centroid)| (c, sq_dist(p, centroid)))
                .fold((0, f64::INFINITY), |best, cur| {
                    if cur.1 < best.1 {
                        cur
                    } else {
                        best
                    }
                })
        })
        .collect()
}

/// Give each empty cluster the farthest point from a cluster with more than
/// one member. Returns how many clusters were reseeded.
fn reseed_empty(assignments: &mut [usize], distances: &mut [f64], k: usize) -> usize {
    let mut counts = vec![0usize; k];
    for &c in assignments.iter() {
        counts[c] += 1;
    }

    let mut reseeded = 0;
    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = distances
            .iter()
            .enumerate()
            .filter(|&(row, _)| counts[assignments[row]] > 1)
            .fold(None, |best: Option<(usize, f64)>, (row, &d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((row, d)),
            });
        let Some((row, _)) = donor else {
            break;
        };
        counts[assignments[row]] -= 1;
        counts[empty] += 1;
        assignments[row] = empty;
        distances[row] = 0.0;
        reseeded += 1;
    }
    reseeded
}

fn update_centroids(points: &Array2<f64>, assignments: &[usize], k: usize, dim: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, dim));
    let mut counts = Array1::<f64>::zeros(k);
    for (row, &c) in assignments.iter().enumerate() {
        let mut target = sums.row_mut(c);
        target += &points.row(row);
        counts[c] += 1.0;
    }
    for (c, mut centroid) in sums.axis_iter_mut(Axis(0)).enumerate() {
        if counts[c] > 0.0 {
            centroid /= counts[c];
        }
    }
    sums
}
