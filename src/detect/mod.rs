//! Language detection engine
//!
//! Two-tier detection: a statistical primary detector with a confidence
//! model, and a script-range fallback for inputs the primary cannot
//! score confidently. Both feed a two-level detection cache (exact L1,
//! pattern L2) consulted before any detection work.

pub mod cache;
pub mod primary;
pub mod profile;
pub mod script;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::atomic::AtomicCell;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::error::CacheError;
use crate::cache::ttl;

pub use cache::{DetectionCache, DetectionCacheConfig, DetectionCacheStats};
pub use primary::PrimaryDetector;

/// Languages the engine is tuned for, as ISO 639-3 codes.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "eng", "cmn", "jpn", "kor", "fra", "deu", "spa", "rus", "por", "ita", "ara", "hin", "tur",
    "vie", "tha", "nld", "pol", "ukr",
];

/// Where a detection answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    Primary,
    Fallback,
    CacheExact,
    CachePattern,
}

/// A detection answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// ISO 639-3 language code.
    pub language: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub source: DetectionSource,
    pub timestamp_ms: u64,
    /// Secondary candidates as `(language, confidence)` pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<(String, f32)>,
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    /// Overrides the engine's configured threshold when set.
    pub min_confidence: Option<f32>,
    /// Restrict primary detection to these ISO 639-3 codes.
    pub preferred_languages: Vec<String>,
    /// Normalize whitespace and case before scoring.
    pub preprocess: bool,
}

/// Which detection paths are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Primary first, fallback on low confidence (default).
    #[default]
    Auto,
    /// Never fall back; low confidence surfaces as an error.
    PrimaryOnly,
    /// Script classification only, e.g. when models must stay cold.
    FallbackOnly,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub mode: DetectionMode,
    /// Acceptance threshold for primary results.
    pub min_confidence: f32,
    /// Inputs shorter than this skip the primary detector.
    pub min_text_length: usize,
    pub enable_caching: bool,
    pub cache: DetectionCacheConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Auto,
            min_confidence: 0.6,
            min_text_length: 3,
            enable_caching: true,
            cache: DetectionCacheConfig::default(),
        }
    }
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DetectionStats {
    pub primary_detections: u64,
    pub fallback_detections: u64,
    pub avg_detection_time_us: u64,
    pub avg_confidence: f32,
    pub cache: DetectionCacheStats,
}

#[derive(Debug, Default)]
struct StatsInner {
    primary_detections: AtomicU64,
    fallback_detections: AtomicU64,
    total_time_us: AtomicU64,
    samples: AtomicU64,
    confidence_milli_sum: AtomicU64,
}

/// Two-tier language detector with a bounded cache.
#[derive(Debug)]
pub struct LanguageDetector {
    config: DetectorConfig,
    mode: AtomicCell<DetectionMode>,
    primary: PrimaryDetector,
    cache: DetectionCache,
    stats: StatsInner,
}

impl LanguageDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            mode: AtomicCell::new(config.mode),
            cache: DetectionCache::new(config.cache.clone()),
            primary: PrimaryDetector::new(),
            stats: StatsInner::default(),
            config,
        }
    }

    pub fn builder() -> LanguageDetectorBuilder {
        LanguageDetectorBuilder::default()
    }

    /// Detect with default options.
    pub fn detect(&self, text: &str) -> Result<DetectionResult, CacheError> {
        self.detect_with(text, &DetectOptions::default())
    }

    /// Full detection flow: exact cache, pattern cache, primary,
    /// fallback — in that order, as permitted by the active mode.
    pub fn detect_with(
        &self,
        text: &str,
        options: &DetectOptions,
    ) -> Result<DetectionResult, CacheError> {
        if text.trim().is_empty() {
            return Err(CacheError::invalid_input("text is empty"));
        }
        let threshold = options.min_confidence.unwrap_or(self.config.min_confidence);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CacheError::invalid_input(
                "min_confidence must be within [0, 1]",
            ));
        }

        let started = Instant::now();
        let now = ttl::now_ms();
        let mode = self.mode.load();

        if self.config.enable_caching {
            if let Some(hit) = self.cache.lookup_exact(text, now) {
                return Ok(hit);
            }
            if let Some(hit) = self.cache.lookup_pattern(text, now) {
                if hit.confidence >= threshold {
                    return Ok(hit);
                }
            }
        }

        let long_enough = text.chars().count() >= self.config.min_text_length;
        let primary_error = if mode != DetectionMode::FallbackOnly && long_enough {
            match self.primary.detect(text, options, threshold, now) {
                Ok(result) => {
                    self.stats.primary_detections.fetch_add(1, Ordering::Relaxed);
                    return self.finish(text, result, started, now);
                }
                Err(err @ CacheError::InvalidInput(_)) => return Err(err),
                Err(err) => Some(err),
            }
        } else {
            None
        };

        if mode == DetectionMode::PrimaryOnly {
            return Err(primary_error.unwrap_or(CacheError::LowConfidence {
                confidence: 0.0,
                threshold,
            }));
        }

        if let Some(err) = &primary_error {
            debug!("primary unavailable ({}), using script fallback", err);
        }
        let result = script::classify(text, now)?;
        self.stats.fallback_detections.fetch_add(1, Ordering::Relaxed);
        self.finish(text, result, started, now)
    }

    fn finish(
        &self,
        text: &str,
        result: DetectionResult,
        started: Instant,
        now: u64,
    ) -> Result<DetectionResult, CacheError> {
        if self.config.enable_caching {
            self.cache.insert(text, &result, now);
        }
        self.stats
            .total_time_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.stats.samples.fetch_add(1, Ordering::Relaxed);
        self.stats
            .confidence_milli_sum
            .fetch_add((result.confidence * 1000.0) as u64, Ordering::Relaxed);
        Ok(result)
    }

    /// Switch detection mode at runtime, e.g. forcing fallback-only
    /// operation when the statistical models must stay unloaded.
    pub fn set_mode(&self, mode: DetectionMode) {
        self.mode.store(mode);
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode.load()
    }

    pub fn supported_languages(&self) -> &'static [&'static str] {
        SUPPORTED_LANGUAGES
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> DetectionStats {
        let samples = self.stats.samples.load(Ordering::Relaxed);
        DetectionStats {
            primary_detections: self.stats.primary_detections.load(Ordering::Relaxed),
            fallback_detections: self.stats.fallback_detections.load(Ordering::Relaxed),
            avg_detection_time_us: if samples > 0 {
                self.stats.total_time_us.load(Ordering::Relaxed) / samples
            } else {
                0
            },
            avg_confidence: if samples > 0 {
                self.stats.confidence_milli_sum.load(Ordering::Relaxed) as f32
                    / 1000.0
                    / samples as f32
            } else {
                0.0
            },
            cache: self.cache.stats(),
        }
    }
}

/// Fluent builder for the detector.
#[derive(Debug, Default)]
pub struct LanguageDetectorBuilder {
    config: DetectorConfig,
}

impl LanguageDetectorBuilder {
    pub fn mode(mut self, mode: DetectionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f32) -> Self {
        self.config.min_confidence = min_confidence;
        self
    }

    pub fn min_text_length(mut self, chars: usize) -> Self {
        self.config.min_text_length = chars;
        self
    }

    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.config.enable_caching = enabled;
        self
    }

    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.config.cache.l1_capacity = entries;
        self
    }

    pub fn pattern_match_threshold(mut self, threshold: f32) -> Self {
        self.config.cache.pattern_match_threshold = threshold;
        self
    }

    pub fn build(self) -> LanguageDetector {
        LanguageDetector::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> LanguageDetector {
        LanguageDetector::builder().build()
    }

    #[test]
    fn english_sample_detects_with_primary() {
        let result = detector()
            .detect("This is a sample English text for testing purposes.")
            .unwrap();
        assert_eq!(result.language, "eng");
        assert!(result.confidence > 0.5);
        assert_eq!(result.source, DetectionSource::Primary);
    }

    #[test]
    fn japanese_detects_on_both_paths() {
        let text = "これは日本語のテストです。";
        let primary = detector().detect(text).unwrap();
        assert_eq!(primary.language, "jpn");
        assert!(primary.confidence > 0.5);

        let fallback_only = LanguageDetector::builder()
            .mode(DetectionMode::FallbackOnly)
            .build();
        let fallback = fallback_only.detect(text).unwrap();
        assert_eq!(fallback.language, "jpn");
        assert!(fallback.confidence >= 0.3);
        assert_eq!(fallback.source, DetectionSource::Fallback);
    }

    #[test]
    fn strict_threshold_on_mixed_text_falls_back() {
        let options = DetectOptions {
            min_confidence: Some(0.9),
            ..DetectOptions::default()
        };
        let result = detector()
            .detect_with("漢字とEnglishの Mixed Text", &options)
            .unwrap();
        assert_eq!(result.source, DetectionSource::Fallback);
        assert!(result.confidence <= 0.8);
    }

    #[test]
    fn primary_only_mode_surfaces_low_confidence() {
        let detector = LanguageDetector::builder()
            .mode(DetectionMode::PrimaryOnly)
            .build();
        let options = DetectOptions {
            min_confidence: Some(0.99),
            ..DetectOptions::default()
        };
        assert!(matches!(
            detector.detect_with("hi", &options),
            Err(CacheError::LowConfidence { .. })
        ));
    }

    #[test]
    fn second_lookup_hits_the_exact_cache() {
        let detector = detector();
        let text = "The weather is lovely today and the birds are singing.";
        let first = detector.detect(text).unwrap();
        assert_eq!(first.source, DetectionSource::Primary);
        let second = detector.detect(text).unwrap();
        assert_eq!(second.source, DetectionSource::CacheExact);
        assert_eq!(second.language, first.language);
        assert_eq!(detector.stats().cache.exact_hits, 1);
    }

    #[test]
    fn empty_and_out_of_range_inputs_are_invalid() {
        let detector = detector();
        assert!(matches!(
            detector.detect("   "),
            Err(CacheError::InvalidInput(_))
        ));
        let options = DetectOptions {
            min_confidence: Some(1.5),
            ..DetectOptions::default()
        };
        assert!(matches!(
            detector.detect_with("hello", &options),
            Err(CacheError::InvalidInput(_))
        ));
    }

    #[test]
    fn mode_switches_at_runtime() {
        let detector = detector();
        assert_eq!(detector.mode(), DetectionMode::Auto);
        detector.set_mode(DetectionMode::FallbackOnly);
        let result = detector.detect("some english words here").unwrap();
        assert_eq!(result.source, DetectionSource::Fallback);
    }

    #[test]
    fn stats_track_detection_paths() {
        let detector = LanguageDetector::builder().enable_caching(false).build();
        detector
            .detect("This is a long enough English sentence for detection.")
            .unwrap();
        detector.detect("12345 !!!").unwrap();
        let stats = detector.stats();
        assert_eq!(stats.primary_detections + stats.fallback_detections, 2);
        assert!(stats.fallback_detections >= 1);
        assert!(stats.avg_confidence > 0.0);
    }

    #[test]
    fn digits_only_input_returns_english_default() {
        let result = detector().detect("42 + 17 = 59").unwrap();
        assert_eq!(result.language, "eng");
        assert!(result.confidence <= 0.5);
    }
}
