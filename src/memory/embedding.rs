use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Turns text into a fixed-length vector
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&mut self, text: &str) -> Vec<f32>;
}

/// Deterministic pseudo-embedding
///
/// The SHA-256 of the text seeds a `StdRng` that fills the vector with
/// values in [-1, 1]; the result is L2-normalised. Identical text always
/// maps to the same vector, different text to nearly orthogonal ones.
/// Vectors are cached until the cache is full, at which point it is emptied.
pub struct HashEmbedding {
    dimension: usize,
    cache_size: usize,
    cache: HashMap<String, Vec<f32>>,
}

impl HashEmbedding {
    pub fn new(dimension: usize, cache_size: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            cache_size,
            cache: HashMap::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn compute(&self, text: &str) -> Vec<f32> {
        let seed: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        let mut rng = StdRng::from_seed(seed);
        let raw: Vec<f32> = (0..self.dimension)
            .map(|_| rng.gen_range(-1.0f32..=1.0))
            .collect();
        normalize(raw)
    }
}

impl EmbeddingProvider for HashEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&mut self, text: &str) -> Vec<f32> {
        if let Some(hit) = self.cache.get(text) {
            return hit.clone();
        }

        let vector = self.compute(text);
        if self.cache_size > 0 {
            if self.cache.len() >= self.cache_size {
                self.cache.clear();
            }
            self.cache.insert(text.to_string(), vector.clone());
        }
        vector
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Cosine similarity; 0 when either vector has no length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic_unit_vectors() {
        let mut embedder = HashEmbedding::new(64, 10);
        let a = embedder.embed("user login flow");
        let b = HashEmbedding::new(64, 0).embed("user login flow");

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn identical_text_is_fully_similar() {
        let mut embedder = HashEmbedding::new(128, 10);
        let a = embedder.embed("payments");
        let b = embedder.embed("payments");
        let c = embedder.embed("something else entirely");

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&a, &c) < 0.7);
    }

    #[test]
    fn cache_is_cleared_when_full() {
        let mut embedder = HashEmbedding::new(8, 2);
        embedder.embed("a");
        embedder.embed("b");
        assert_eq!(embedder.cached(), 2);
        embedder.embed("c");
        assert_eq!(embedder.cached(), 1);
    }

    #[test]
    fn zero_vector_similarity_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
