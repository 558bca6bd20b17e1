//! Two-level detection cache
//!
//! L1 is an exact-match cache addressed by text hash with the body
//! compared on hit; eviction orders entries by frequency-weighted
//! recency. L2 is a per-language pattern store that answers near-miss
//! lookups by feature similarity when the exact level has nothing.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::fingerprint;
use crate::detect::profile::{FeatureVector, PatternProfile};
use crate::detect::{DetectionResult, DetectionSource};

/// Detection cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionCacheConfig {
    /// Exact-level capacity in entries.
    pub l1_capacity: usize,
    /// Exact-level entry lifetime.
    pub l1_ttl_ms: u64,
    /// Weight of one recorded access in eviction ordering, in ms of
    /// simulated recency.
    pub frequency_weight_ms: u64,
    /// Results below this confidence are never cached.
    pub min_confidence_for_cache: f32,
    /// Minimum similarity for a pattern-level answer.
    pub pattern_match_threshold: f32,
    /// Inputs shorter than this never match at the pattern level.
    pub min_text_length_for_pattern_match: usize,
}

impl Default for DetectionCacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 256,
            l1_ttl_ms: 60 * 60 * 1000,
            frequency_weight_ms: 30_000,
            min_confidence_for_cache: 0.7,
            pattern_match_threshold: 0.6,
            min_text_length_for_pattern_match: 12,
        }
    }
}

#[derive(Debug, Clone)]
struct ExactEntry {
    text: String,
    result: DetectionResult,
    inserted_ms: u64,
    last_access_ms: u64,
    access_count: u64,
}

impl ExactEntry {
    /// Eviction key: recency pushed forward by access frequency, so a
    /// hot entry outlives a recent one-shot.
    fn adjusted_time(&self, weight_ms: u64) -> u64 {
        self.last_access_ms
            .saturating_add(self.access_count.saturating_mul(weight_ms))
    }
}

/// Counter snapshot for the detection cache.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DetectionCacheStats {
    pub exact_hits: u64,
    pub pattern_hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub exact_entries: usize,
    pub pattern_languages: usize,
}

/// L1 exact + L2 pattern cache.
#[derive(Debug, Default)]
pub struct DetectionCache {
    config: DetectionCacheConfig,
    exact: DashMap<u64, ExactEntry>,
    patterns: DashMap<String, PatternProfile>,
    exact_hits: AtomicU64,
    pattern_hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
}

impl DetectionCache {
    pub fn new(config: DetectionCacheConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn text_hash(text: &str) -> u64 {
        fingerprint::fnv1a_32(text.as_bytes()) as u64
    }

    /// Exact-level lookup: hash-addressed, body-compared, lazily
    /// expired. A hit refreshes recency and frequency.
    pub fn lookup_exact(&self, text: &str, now_ms: u64) -> Option<DetectionResult> {
        let hash = Self::text_hash(text);
        let mut hit = None;
        let mut expired = false;
        if let Some(mut entry) = self.exact.get_mut(&hash) {
            if now_ms.saturating_sub(entry.inserted_ms) > self.config.l1_ttl_ms {
                expired = true;
            } else if entry.text == text {
                entry.access_count += 1;
                entry.last_access_ms = now_ms;
                let mut result = entry.result.clone();
                result.source = DetectionSource::CacheExact;
                hit = Some(result);
            }
        }
        if expired {
            self.exact.remove(&hash);
        }
        match hit {
            Some(result) => {
                self.exact_hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pattern-level lookup: similarity against every language profile.
    /// Answers only above the threshold and only for inputs long enough
    /// to carry a pattern; confidence is the similarity, capped at 0.8.
    pub fn lookup_pattern(&self, text: &str, now_ms: u64) -> Option<DetectionResult> {
        if text.chars().count() < self.config.min_text_length_for_pattern_match {
            return None;
        }
        let features = FeatureVector::extract(text);
        let mut best: Option<(String, f32)> = None;
        for profile in self.patterns.iter() {
            let similarity = profile.similarity(&features);
            if best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true) {
                best = Some((profile.language.clone(), similarity));
            }
        }
        let (language, similarity) = best?;
        if similarity < self.config.pattern_match_threshold {
            return None;
        }
        self.pattern_hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            "pattern cache matched {} at similarity {:.3}",
            language, similarity
        );
        Some(DetectionResult {
            language,
            confidence: similarity.min(0.8),
            source: DetectionSource::CachePattern,
            timestamp_ms: now_ms,
            alternatives: Vec::new(),
        })
    }

    /// Insert a detection outcome. Low-confidence results are never
    /// cached; confident ones feed both levels.
    pub fn insert(&self, text: &str, result: &DetectionResult, now_ms: u64) {
        if result.confidence < self.config.min_confidence_for_cache {
            return;
        }
        self.insertions.fetch_add(1, Ordering::Relaxed);

        let hash = Self::text_hash(text);
        self.exact.insert(
            hash,
            ExactEntry {
                text: text.to_string(),
                result: result.clone(),
                inserted_ms: now_ms,
                last_access_ms: now_ms,
                access_count: 1,
            },
        );
        self.evict_exact_overflow();

        self.patterns
            .entry(result.language.clone())
            .or_insert_with(|| PatternProfile::new(result.language.clone()))
            .absorb(&FeatureVector::extract(text));
    }

    fn evict_exact_overflow(&self) {
        let weight = self.config.frequency_weight_ms;
        while self.exact.len() > self.config.l1_capacity {
            let victim = self
                .exact
                .iter()
                .min_by_key(|e| e.adjusted_time(weight))
                .map(|e| *e.key());
            match victim {
                Some(key) => {
                    self.exact.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        self.exact.clear();
        self.patterns.clear();
    }

    pub fn stats(&self) -> DetectionCacheStats {
        DetectionCacheStats {
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            exact_entries: self.exact.len(),
            pattern_languages: self.patterns.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(lang: &str, confidence: f32) -> DetectionResult {
        DetectionResult {
            language: lang.to_string(),
            confidence,
            source: DetectionSource::Primary,
            timestamp_ms: 0,
            alternatives: Vec::new(),
        }
    }

    fn cache() -> DetectionCache {
        DetectionCache::new(DetectionCacheConfig::default())
    }

    #[test]
    fn exact_hit_round_trips_and_counts_accesses() {
        let cache = cache();
        cache.insert("hello world", &result("eng", 0.9), 1_000);
        let hit = cache.lookup_exact("hello world", 2_000).expect("hit");
        assert_eq!(hit.language, "eng");
        assert_eq!(hit.source, DetectionSource::CacheExact);
        assert_eq!(cache.stats().exact_hits, 1);
    }

    #[test]
    fn low_confidence_results_are_not_cached() {
        let cache = cache();
        cache.insert("maybe english", &result("eng", 0.4), 0);
        assert!(cache.lookup_exact("maybe english", 1).is_none());
        assert_eq!(cache.stats().insertions, 0);
    }

    #[test]
    fn expired_exact_entries_are_purged_on_access() {
        let cache = DetectionCache::new(DetectionCacheConfig {
            l1_ttl_ms: 100,
            ..DetectionCacheConfig::default()
        });
        cache.insert("short lived", &result("eng", 0.9), 1_000);
        assert!(cache.lookup_exact("short lived", 1_200).is_none());
        assert_eq!(cache.stats().exact_entries, 0);
    }

    #[test]
    fn hash_collision_with_different_body_is_a_miss() {
        let cache = cache();
        cache.insert("first text", &result("eng", 0.9), 0);
        // Different body, same lookup path: only exact body matches.
        assert!(cache.lookup_exact("second text", 1).is_none());
    }

    #[test]
    fn frequency_weight_protects_hot_entries_from_eviction() {
        let cache = DetectionCache::new(DetectionCacheConfig {
            l1_capacity: 2,
            frequency_weight_ms: 10_000,
            ..DetectionCacheConfig::default()
        });
        cache.insert("hot entry text", &result("eng", 0.9), 0);
        cache.insert("cold entry text", &result("eng", 0.9), 1);
        for i in 0..5 {
            cache.lookup_exact("hot entry text", 10 + i);
        }
        // Overflow: the cold entry has the smallest adjusted time.
        cache.insert("newest entry text", &result("eng", 0.9), 20);
        assert!(cache.lookup_exact("hot entry text", 30).is_some());
        assert!(cache.lookup_exact("cold entry text", 30).is_none());
    }

    #[test]
    fn pattern_level_answers_similar_text_of_known_language() {
        let cache = DetectionCache::new(DetectionCacheConfig {
            pattern_match_threshold: 0.2,
            ..DetectionCacheConfig::default()
        });
        cache.insert(
            "the quick brown fox jumps over the lazy dog",
            &result("eng", 0.95),
            0,
        );
        cache.insert(
            "the rain in spain stays mainly on the plain",
            &result("eng", 0.95),
            0,
        );
        let hit = cache
            .lookup_pattern("the dog sleeps in the warm rain", 10)
            .expect("pattern hit");
        assert_eq!(hit.language, "eng");
        assert_eq!(hit.source, DetectionSource::CachePattern);
        assert!(hit.confidence <= 0.8);
    }

    #[test]
    fn pattern_level_ignores_short_inputs() {
        let cache = DetectionCache::new(DetectionCacheConfig {
            pattern_match_threshold: 0.0,
            min_text_length_for_pattern_match: 12,
            ..DetectionCacheConfig::default()
        });
        cache.insert("the quick brown fox jumps over it", &result("eng", 0.95), 0);
        assert!(cache.lookup_pattern("short", 1).is_none());
    }

    #[test]
    fn dissimilar_language_stays_below_threshold() {
        let cache = cache();
        cache.insert(
            "the quick brown fox jumps over the lazy dog",
            &result("eng", 0.95),
            0,
        );
        assert!(cache
            .lookup_pattern("съешь же ещё этих мягких французских булок", 1)
            .is_none());
    }
}
