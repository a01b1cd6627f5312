// Embedding collaborators for food-name token sequences.
//
// The pipeline only sees the `Embedder` trait: a batch of token sequences in,
// one fixed-length vector per sequence out, same order. Two implementations:
//
// - `SentenceEmbedder`: all-MiniLM-L6-v2 via ONNX, mean-pooled and
//   L2-normalized (384 dimensions). Tokens are joined with spaces.
// - `HashingEmbedder`: signed feature hashing of character trigrams. No model
//   files, fully deterministic; used in tests and as the offline fallback.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::normalize::TokenSequence;

/// Embedding dimension for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Batch-in, batch-out, order-preserving embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every returned vector.
    fn dimension(&self) -> usize;

    /// Embed a batch of token sequences, one vector per sequence, in order.
    async fn embed_batch(&self, batch: &[TokenSequence]) -> Result<Vec<Vec<f64>>>;
}

/// Embed every sequence in fixed-size batches and stack the results as rows.
///
/// Any batch failure is fatal. A batch returning the wrong number of
/// vectors, or vectors of the wrong length, is treated the same way.
pub async fn embed_all(
    embedder: &dyn Embedder,
    sequences: &[TokenSequence],
    batch_size: usize,
) -> Result<Array2<f64>> {
    let dim = embedder.dimension();
    let mut out = Array2::zeros((sequences.len(), dim));
    if sequences.is_empty() {
        return Ok(out);
    }

    let pb = ProgressBar::new(sequences.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Embedding [{bar:30}] {pos}/{len} ({eta})")
            .expect("valid template"),
    );

    let mut row = 0;
    for (batch_no, batch) in sequences.chunks(batch_size.max(1)).enumerate() {
        let vectors = embedder
            .embed_batch(batch)
            .await
            .with_context(|| format!("Embedding batch {batch_no} failed"))?;

        if vectors.len() != batch.len() {
            anyhow::bail!(
                "Embedding batch {batch_no} returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            );
        }
        for vector in vectors {
            if vector.len() != dim {
                anyhow::bail!(
                    "Embedding batch {batch_no} returned a {}-dim vector, expected {dim}",
                    vector.len()
                );
            }
            out.row_mut(row)
                .iter_mut()
                .zip(vector)
                .for_each(|(slot, v)| *slot = v);
            row += 1;
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    info!(count = sequences.len(), dim, "Embedded food names");
    Ok(out)
}

/// Sentence embedder using a local ONNX model.
///
/// Arc<Mutex<Session>> for thread safety, Arc<Tokenizer> for shared
/// ownership across spawn_blocking.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl SentenceEmbedder {
    /// Load the sentence embedding model and tokenizer from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nRun `satiety download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nRun `satiety download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;

        debug!(
            "Loaded sentence embedding model from {}",
            model_dir.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl Embedder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    /// CPU-bound inference is offloaded to spawn_blocking.
    async fn embed_batch(&self, batch: &[TokenSequence]) -> Result<Vec<Vec<f64>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts: Vec<String> = batch.iter().map(|tokens| tokens.join(" ")).collect();

        tokio::task::spawn_blocking(move || embed_sync(&session, &tokenizer, &texts))
            .await
            .context("spawn_blocking panicked")?
    }
}

/// Tokenize, run the model, mean-pool over the attention mask, L2-normalize.
fn embed_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    if max_len == 0 {
        anyhow::bail!("Tokenizer produced no tokens for any of {batch_size} inputs");
    }

    // BERT inputs, padded to max_len with pad id 0 and mask 0.
    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut token_type_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let pad_len = max_len - ids.len();

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, ids.len()));

        input_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    // last_hidden_state: [batch, seq_len, 384]
    let hidden_states = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    let mut embeddings = Vec::with_capacity(batch_size);
    for i in 0..batch_size {
        let mut sum = vec![0.0_f64; EMBEDDING_DIM];
        let mut mask_sum = 0.0_f64;

        for j in 0..max_len {
            let mask_val = attention_mask_flat[i * max_len + j] as f64;
            if mask_val > 0.0 {
                mask_sum += mask_val;
                let offset = (i * max_len + j) * EMBEDDING_DIM;
                for (k, slot) in sum.iter_mut().enumerate() {
                    *slot += hidden_states[offset + k] as f64 * mask_val;
                }
            }
        }

        if mask_sum > 0.0 {
            for val in &mut sum {
                *val /= mask_sum;
            }
        }
        l2_normalize(&mut sum);
        embeddings.push(sum);
    }

    debug!(batch_size, dim = EMBEDDING_DIM, "Computed sentence embeddings");

    Ok(embeddings)
}

/// Feature-hashing embedder over character trigrams of each token.
///
/// Each trigram of `^token$` lands in one of `dim` buckets with a ±1 sign
/// taken from the hash, so similar spellings ("strawberry", "strawberries")
/// share most of their mass. Vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_one(&self, tokens: &[String]) -> Vec<f64> {
        let mut v = vec![0.0; self.dim];
        for token in tokens {
            let padded: Vec<char> = std::iter::once('^')
                .chain(token.chars())
                .chain(std::iter::once('$'))
                .collect();
            for gram in padded.windows(3) {
                let h = fnv1a(gram);
                let bucket = (h % self.dim as u64) as usize;
                let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
                v[bucket] += sign;
            }
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, batch: &[TokenSequence]) -> Result<Vec<Vec<f64>>> {
        Ok(batch.iter().map(|tokens| self.embed_one(tokens)).collect())
    }
}

/// 64-bit FNV-1a over the UTF-8 bytes of a char window.
fn fnv1a(chars: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut buf = [0u8; 4];
    for c in chars {
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
