use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

/// What to do when the same food name appears twice in one day's diary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Later dishes replace earlier ones (as-observed behavior)
    #[default]
    Overwrite,
    /// Calories of repeated dishes are added together
    Sum,
}

impl FromStr for DuplicatePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "sum" => Ok(Self::Sum),
            other => anyhow::bail!("unknown duplicate policy '{other}' (expected overwrite|sum)"),
        }
    }
}

/// What to do when a diary record fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorPolicy {
    /// Drop the record (and its goal) and keep going
    #[default]
    Skip,
    /// Fail the whole run on the first bad record
    Abort,
}

impl FromStr for ParseErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => anyhow::bail!("unknown parse error policy '{other}' (expected skip|abort)"),
        }
    }
}

/// Which embedding backend to use for the semantic clustering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderBackend {
    /// Local ONNX sentence transformer (default)
    #[default]
    Onnx,
    /// Deterministic character-trigram hashing; no model files needed
    Hashing,
}

impl FromStr for EmbedderBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "hashing" => Ok(Self::Hashing),
            other => anyhow::bail!("unknown embedder '{other}' (expected onnx|hashing)"),
        }
    }
}

/// Token normalization settings for food names.
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    /// Tokens with this many characters or fewer are dropped
    pub min_token_len: usize,
    /// Added on top of the built-in English + domain stopword lists
    pub extra_stopwords: Vec<String>,
    /// Substituted (twice) when a name normalizes to nothing
    pub placeholder: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_token_len: 3,
            extra_stopwords: Vec::new(),
            placeholder: "food".to_string(),
        }
    }
}

/// LSQR settings for the sparse first pass.
#[derive(Debug, Clone)]
pub struct LsqrConfig {
    /// Iteration cap; 0 means twice the column count
    pub max_iter: usize,
    pub atol: f64,
    pub btol: f64,
    /// Stop when the estimated condition number exceeds this
    pub conlim: f64,
}

impl Default for LsqrConfig {
    fn default() -> Self {
        Self {
            max_iter: 0,
            atol: 1e-8,
            btol: 1e-8,
            conlim: 1e8,
        }
    }
}

/// Dense QR settings for the clustered second pass.
#[derive(Debug, Clone)]
pub struct DenseConfig {
    /// Iterative refinement sweeps after the initial QR solve
    pub max_refinements: usize,
    /// Refinement stops once the correction is this small relative to x
    pub tol: f64,
    /// Relative threshold on |R_kk| for rank detection; 0 means max(m, n) * eps
    pub rcond: f64,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            max_refinements: 5,
            tol: 1e-12,
            rcond: 0.0,
        }
    }
}

/// K-means settings.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    pub max_iter: usize,
    /// Stop when the total squared centroid shift falls below this times
    /// the mean feature variance
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// Central configuration, passed explicitly into every stage.
///
/// Loaded from environment variables (the .env file is read at startup
/// via dotenvy); CLI flags override individual fields afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum total calories across the dataset for a food to keep its own column
    pub threshold: f64,
    /// Number of semantic clusters for the second pass
    pub clusters: usize,
    pub normalize: NormalizeConfig,
    pub duplicates: DuplicatePolicy,
    pub on_parse_error: ParseErrorPolicy,
    pub lsqr: LsqrConfig,
    pub dense: DenseConfig,
    pub kmeans: KMeansConfig,
    pub embedder: EmbedderBackend,
    /// Food names per embedding call
    pub embed_batch_size: usize,
    /// Output dimension of the hashing embedder
    pub hash_dim: usize,
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 1000.0,
            clusters: 300,
            normalize: NormalizeConfig::default(),
            duplicates: DuplicatePolicy::default(),
            on_parse_error: ParseErrorPolicy::default(),
            lsqr: LsqrConfig::default(),
            dense: DenseConfig::default(),
            kmeans: KMeansConfig::default(),
            embedder: EmbedderBackend::default(),
            embed_batch_size: 256,
            hash_dim: 256,
            model_dir: crate::download::default_model_dir(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// A variable that is set but malformed is an error rather than being
    /// silently replaced by the default.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let extra_stopwords = env::var("SATIETY_EXTRA_STOPWORDS")
            .map(|s| {
                s.split(',')
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            threshold: env_or("SATIETY_THRESHOLD", defaults.threshold)?,
            clusters: env_or("SATIETY_CLUSTERS", defaults.clusters)?,
            normalize: NormalizeConfig {
                min_token_len: env_or("SATIETY_MIN_TOKEN_LEN", defaults.normalize.min_token_len)?,
                extra_stopwords,
                placeholder: env::var("SATIETY_PLACEHOLDER_TOKEN")
                    .unwrap_or(defaults.normalize.placeholder),
            },
            duplicates: env_or("SATIETY_DUPLICATES", defaults.duplicates)?,
            on_parse_error: env_or("SATIETY_ON_PARSE_ERROR", defaults.on_parse_error)?,
            lsqr: LsqrConfig {
                max_iter: env_or("SATIETY_LSQR_MAX_ITER", defaults.lsqr.max_iter)?,
                atol: env_or("SATIETY_LSQR_ATOL", defaults.lsqr.atol)?,
                btol: env_or("SATIETY_LSQR_BTOL", defaults.lsqr.btol)?,
                conlim: env_or("SATIETY_LSQR_CONLIM", defaults.lsqr.conlim)?,
            },
            dense: DenseConfig {
                max_refinements: env_or("SATIETY_DENSE_MAX_REFINE", defaults.dense.max_refinements)?,
                tol: env_or("SATIETY_DENSE_TOL", defaults.dense.tol)?,
                rcond: env_or("SATIETY_DENSE_RCOND", defaults.dense.rcond)?,
            },
            kmeans: KMeansConfig {
                max_iter: env_or("SATIETY_KMEANS_MAX_ITER", defaults.kmeans.max_iter)?,
                tol: env_or("SATIETY_KMEANS_TOL", defaults.kmeans.tol)?,
                seed: env_or("SATIETY_SEED", defaults.kmeans.seed)?,
            },
            embedder: env_or("SATIETY_EMBEDDER", defaults.embedder)?,
            embed_batch_size: env_or("SATIETY_EMBED_BATCH", defaults.embed_batch_size)?,
            hash_dim: env_or("SATIETY_HASH_DIM", defaults.hash_dim)?,
            model_dir: env::var("SATIETY_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
        })
    }

    /// Reject settings no stage can run with.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            anyhow::bail!("threshold must be a non-negative number, got {}", self.threshold);
        }
        if self.clusters == 0 {
            anyhow::bail!("cluster count must be at least 1");
        }
        if self.embed_batch_size == 0 {
            anyhow::bail!("embedding batch size must be at least 1");
        }
        if self.hash_dim == 0 {
            anyhow::bail!("hashing embedder dimension must be at least 1");
        }
        Ok(())
    }
}

/// Read and parse an env var, or return `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
