//! Feature-hashed bag-of-words embeddings.
//!
//! Each lowercase token is hashed with xxHash64 into one of `dimension`
//! buckets; a second hash bit picks the sign so unrelated tokens tend to
//! cancel instead of piling up. Vectors are L2-normalized, so the cosine of
//! two embeddings is their dot product.
use async_trait::async_trait;
use deepread_game::Embedder;
use std::convert::Infallible;
use twox_hash::XxHash64;

pub const DEFAULT_DIMENSION: usize = 256;
const BUCKET_SEED: u64 = 0x0dee_97ea_d000_0001;
const SIGN_SEED: u64 = 0x0dee_97ea_d000_0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashedEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed without going through the async trait.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokens(text) {
            let bytes = token.as_bytes();
            let bucket = XxHash64::oneshot(BUCKET_SEED, bytes) % self.dimension as u64;
            let sign = if XxHash64::oneshot(SIGN_SEED, bytes) & 1 == 0 {
                1.0
            } else {
                -1.0
            };
            // bucket < dimension, which is a usize
            #[allow(clippy::cast_possible_truncation)]
            let slot = bucket as usize;
            vector[slot] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashedEmbedder {
    type Error = Infallible;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Self::Error> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepread_game::cosine_similarity;

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashedEmbedder::default();
        let vector = embedder.embed_sync("Reading is a complex activity");
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero() {
        let vector = HashedEmbedder::new(8).embed_sync("  ...  ");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let embedder = HashedEmbedder::default();
        assert_eq!(
            embedder.embed_sync("Active Reading!"),
            embedder.embed_sync("active, reading")
        );
    }

    #[test]
    fn shared_words_raise_similarity() {
        let embedder = HashedEmbedder::default();
        let base = embedder.embed_sync("the author states the problem of the book");
        let close = embedder.embed_sync("the author states the problem");
        let far = embedder.embed_sync("mitochondria synthesize adenosine");
        let near_score = cosine_similarity(&base, &close).unwrap();
        let far_score = cosine_similarity(&base, &far).unwrap();
        assert!(near_score > 0.6, "{near_score}");
        assert!(near_score > far_score);
    }

    #[test]
    fn trait_embedding_matches_sync() {
        let embedder = HashedEmbedder::new(32);
        let text = "inspectional reading";
        let vector = tokio_test::block_on(embedder.embed(text)).unwrap();
        assert_eq!(vector, embedder.embed_sync(text));
    }
}
