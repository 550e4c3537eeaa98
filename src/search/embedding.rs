//! Embedding provider.
//!
//! The default provider is a deterministic harmonic token projection: each
//! token is encoded as an integer, reduced modulo a set of coprime moduli,
//! and projected onto the unit circle per modulus. No model files, no
//! network, identical output for identical input, multilingual by virtue of
//! operating on Unicode code points.

use std::f64::consts::PI;

use crate::core::error::{Result, RetrievalError};

/// Output dimension of every provider (two values per modulus).
pub const EMBEDDING_DIM: usize = 384;

const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Tokens longer than this are truncated before integer encoding.
const MAX_TOKEN_CHARS: usize = 64;

/// One vector from a batch call, tagged with the index of the input text
/// that produced it. Batches carry no ordering guarantee.
#[derive(Debug, Clone)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Converts text into fixed-dimension vectors, singly or batched.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts. Results are tagged with input indices and may
    /// arrive in any order; pass them through [`into_input_order`] before
    /// pairing them back with their texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<IndexedEmbedding>>;
}

/// Restore a tagged batch to the caller's input order.
///
/// Rejects batches with missing, duplicate, or out-of-range indices so a
/// misbehaving provider cannot cross-wire texts and vectors.
pub fn into_input_order(batch: Vec<IndexedEmbedding>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if batch.len() != expected {
        return Err(RetrievalError::EmbeddingUnavailable(format!(
            "batch returned {} vectors, expected {}",
            batch.len(),
            expected
        )));
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in batch {
        let slot = ordered.get_mut(item.index).ok_or_else(|| {
            RetrievalError::EmbeddingUnavailable(format!(
                "batch index {} out of range",
                item.index
            ))
        })?;
        if slot.is_some() {
            return Err(RetrievalError::EmbeddingUnavailable(format!(
                "duplicate batch index {}",
                item.index
            )));
        }
        *slot = Some(item.vector);
    }

    // Lengths matched and indices were unique, so every slot is filled.
    Ok(ordered.into_iter().flatten().collect())
}

/// Deterministic local embedder based on harmonic token projection.
pub struct HarmonicEmbedder {
    moduli: Vec<u64>,
}

impl HarmonicEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: coprime_moduli(NUM_MODULI),
        }
    }

    /// Project one token: encode as an integer N, then for each modulus m
    /// map the residue N mod m onto the unit circle as (sin, cos).
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let n = token_integer(token);
        let mut out = Vec::with_capacity(EMBEDDING_DIM);
        for &m in &self.moduli {
            let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
            out.push(theta.sin());
            out.push(theta.cos());
        }
        out
    }
}

impl Default for HarmonicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for HarmonicEmbedder {
    /// Mean-pooled token projections, L2-normalized. Text with no tokens
    /// yields the zero vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(vec![0.0; EMBEDDING_DIM]);
        }

        let mut sum = vec![0.0f64; EMBEDDING_DIM];
        for token in &tokens {
            for (acc, val) in sum.iter_mut().zip(self.embed_token(token)) {
                *acc += val;
            }
        }

        let count = tokens.len() as f64;
        for val in &mut sum {
            *val /= count;
        }

        let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            Ok(sum.into_iter().map(|x| (x / norm) as f32).collect())
        } else {
            Ok(sum.into_iter().map(|x| x as f32).collect())
        }
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<IndexedEmbedding>> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                Ok(IndexedEmbedding {
                    index,
                    vector: self.embed(text)?,
                })
            })
            .collect()
    }
}

/// First `count` primes; pairwise coprime by construction.
fn coprime_moduli(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate: u64 = 2;
    while primes.len() < count {
        if primes.iter().all(|&p| candidate % p != 0) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// Base-2^16 positional encoding of the token's code points, wrapping on
/// overflow for long tokens.
fn token_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_CHARS)
        .fold(0u64, |acc, c| acc.wrapping_mul(65536).wrapping_add(c as u64))
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Cosine similarity; zero when either vector has zero norm or the lengths
/// differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Distance used for semantic ranking. Lower is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
