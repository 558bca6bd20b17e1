//! Per-language pattern profiles
//!
//! A profile is a bucketed trigram frequency vector plus a
//! character-class histogram, accumulated from every confidently
//! detected sample of a language. Similarity between an input's feature
//! vector and a profile drives the pattern cache.

use crate::cache::fingerprint;
use crate::detect::script::{self, SCRIPT_COUNT};

/// Trigram hash buckets per vector.
pub const NGRAM_BUCKETS: usize = 512;
/// Script classes plus one bucket for unclassified letters.
pub const CHAR_CLASSES: usize = SCRIPT_COUNT + 1;

const NGRAM_SIZE: usize = 3;

/// L2-normalized features of one text or one language profile.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    ngrams: Vec<f32>,
    classes: [f32; CHAR_CLASSES],
}

impl FeatureVector {
    fn zeroed() -> Self {
        Self {
            ngrams: vec![0.0; NGRAM_BUCKETS],
            classes: [0.0; CHAR_CLASSES],
        }
    }

    /// Extract features from text: sliding character trigrams hashed
    /// into fixed buckets, and per-script character counts.
    pub fn extract(text: &str) -> Self {
        let mut vector = Self::zeroed();
        let chars: Vec<char> = text
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();

        if chars.len() >= NGRAM_SIZE {
            let mut buf = String::with_capacity(NGRAM_SIZE * 4);
            for window in chars.windows(NGRAM_SIZE) {
                buf.clear();
                buf.extend(window.iter());
                let bucket = fingerprint::fnv1a_32(buf.as_bytes()) as usize % NGRAM_BUCKETS;
                vector.ngrams[bucket] += 1.0;
            }
        }

        for &ch in &chars {
            match script::script_of(ch) {
                Some(s) => vector.classes[s.index()] += 1.0,
                None if ch.is_alphabetic() => vector.classes[CHAR_CLASSES - 1] += 1.0,
                None => {}
            }
        }

        vector.normalize();
        vector
    }

    fn normalize(&mut self) {
        normalize_slice(&mut self.ngrams);
        normalize_slice(&mut self.classes);
    }

    /// Cosine similarity in [0, 1], weighting trigram shape over the
    /// coarser character-class shape.
    pub fn similarity(&self, other: &FeatureVector) -> f32 {
        let ngram_sim = dot(&self.ngrams, &other.ngrams);
        let class_sim = dot(&self.classes, &other.classes);
        (0.7 * ngram_sim + 0.3 * class_sim).clamp(0.0, 1.0)
    }
}

fn normalize_slice(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Accumulated feature profile for one language.
#[derive(Debug, Clone)]
pub struct PatternProfile {
    pub language: String,
    vector: FeatureVector,
    samples: u32,
}

impl PatternProfile {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            vector: FeatureVector::zeroed(),
            samples: 0,
        }
    }

    /// Fold a confidently detected sample into the running profile.
    pub fn absorb(&mut self, features: &FeatureVector) {
        let n = self.samples as f32;
        for (acc, new) in self.vector.ngrams.iter_mut().zip(&features.ngrams) {
            *acc = (*acc * n + new) / (n + 1.0);
        }
        for (acc, new) in self.vector.classes.iter_mut().zip(&features.classes) {
            *acc = (*acc * n + new) / (n + 1.0);
        }
        self.vector.normalize();
        self.samples += 1;
    }

    pub fn similarity(&self, features: &FeatureVector) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        self.vector.similarity(features)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_maximal_similarity() {
        let a = FeatureVector::extract("the quick brown fox jumps over the lazy dog");
        let sim = a.similarity(&a);
        assert!(sim > 0.99, "self-similarity {} should be ~1", sim);
    }

    #[test]
    fn same_language_beats_different_language() {
        let mut english = PatternProfile::new("eng");
        english.absorb(&FeatureVector::extract(
            "the weather is lovely today and the birds are singing",
        ));
        english.absorb(&FeatureVector::extract(
            "this is another english sentence with common words and the usual shapes",
        ));

        let english_input = FeatureVector::extract("the cat is sitting on the warm windowsill");
        let russian_input = FeatureVector::extract("кошка сидит на тёплом подоконнике");

        assert!(english.similarity(&english_input) > english.similarity(&russian_input));
    }

    #[test]
    fn empty_profile_matches_nothing() {
        let profile = PatternProfile::new("eng");
        let input = FeatureVector::extract("hello world");
        assert_eq!(profile.similarity(&input), 0.0);
    }

    #[test]
    fn short_text_still_produces_class_features() {
        let v = FeatureVector::extract("hi");
        // Below trigram length: the class histogram still carries signal.
        assert!(v.classes.iter().any(|c| *c > 0.0));
    }
}
