//! Text embeddings for similarity scoring.
//!
//! The default [`HashEmbedder`] is a deterministic token-hash projection:
//! no model weights, no network, stable across runs. It captures lexical
//! overlap, which is what the drift and mirroring detectors compare.

/// Produces fixed-width embedding vectors for text.
pub trait Embedder: Send + Sync {
    /// Embed one text into a vector of `dims()` components.
    fn embed(&self, text: &str) -> Vec<f64>;

    /// Output dimensionality.
    fn dims(&self) -> usize;
}

/// FNV-1a token-hash embedder. Each token increments the bucket its hash
/// lands in; the result is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0_f64; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(token) as usize) % self.dims;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity between two vectors. Zero for mismatched lengths or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed("hello world"), embedder.embed("hello world"));
    }

    #[test]
    fn test_embed_is_normalized() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("some text with several tokens");
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_identical_texts_have_unit_similarity() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("the dragon is real");
        let b = embedder.embed("the dragon is real");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_texts_have_low_similarity() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("quarterly revenue spreadsheet");
        let b = embedder.embed("sourdough hydration ratio");
        assert!(cosine_similarity(&a, &b) < 0.3);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
