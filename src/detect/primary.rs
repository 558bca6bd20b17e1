//! Primary statistical detector
//!
//! Candidate scoring rides on whatlang's trigram models; the confidence
//! reported to callers is this module's own model, combining a
//! length-based base, a script agreement factor and a short-text
//! penalty.

use log::debug;
use whatlang::{Detector, Lang};

use crate::cache::error::CacheError;
use crate::cache::fingerprint;
use crate::detect::script::{self, ScriptHistogram};
use crate::detect::{DetectOptions, DetectionResult, DetectionSource};

/// Statistical detector with confidence scoring.
#[derive(Debug, Default)]
pub struct PrimaryDetector;

impl PrimaryDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the language of `text`.
    ///
    /// `min_confidence` is the resolved acceptance threshold; results
    /// scoring below it return `LowConfidence` so the caller can fall
    /// back.
    pub fn detect(
        &self,
        text: &str,
        options: &DetectOptions,
        min_confidence: f32,
        now_ms: u64,
    ) -> Result<DetectionResult, CacheError> {
        if text.trim().is_empty() {
            return Err(CacheError::invalid_input("text is empty"));
        }

        let processed;
        let body = if options.preprocess {
            processed = fingerprint::normalize(text);
            processed.as_str()
        } else {
            text
        };

        let info = match self.run_detector(body, &options.preferred_languages) {
            Some(info) => info,
            None => {
                return Err(CacheError::LowConfidence {
                    confidence: 0.0,
                    threshold: min_confidence,
                })
            }
        };
        let lang_code = info.lang().code();

        let char_count = body.chars().filter(|c| !c.is_whitespace()).count();
        let hist = ScriptHistogram::analyze(body);

        let base = base_confidence(char_count);
        let script_factor = script_factor(lang_code, &hist);
        let penalty = length_penalty(char_count);
        let confidence = (base * script_factor * (1.0 - penalty)).min(0.99);

        debug!(
            "primary scored {} at {:.3} (base {:.2}, script {:.2}, penalty {:.2})",
            lang_code, confidence, base, script_factor, penalty
        );

        if confidence < min_confidence {
            return Err(CacheError::LowConfidence {
                confidence,
                threshold: min_confidence,
            });
        }

        let alternatives = if hist.is_mixed() {
            hist.secondary_candidate()
                .filter(|(lang, _)| *lang != lang_code)
                .map(|(lang, conf)| vec![(lang.to_string(), conf)])
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(DetectionResult {
            language: lang_code.to_string(),
            confidence,
            source: DetectionSource::Primary,
            timestamp_ms: now_ms,
            alternatives,
        })
    }

    fn run_detector(&self, body: &str, preferred: &[String]) -> Option<whatlang::Info> {
        let allowlist: Vec<Lang> = preferred
            .iter()
            .filter_map(|code| Lang::from_code(code))
            .collect();
        if allowlist.is_empty() {
            whatlang::detect(body)
        } else {
            Detector::with_allowlist(allowlist).detect(body)
        }
    }
}

/// Base confidence by text length, stepped at 5/10/20/50/100 chars.
fn base_confidence(char_count: usize) -> f32 {
    match char_count {
        0..=4 => 0.60,
        5..=9 => 0.65,
        10..=19 => 0.75,
        20..=49 => 0.85,
        50..=99 => 0.90,
        _ => 0.95,
    }
}

/// Script agreement: full marks when the dominant script matches the
/// detected language, reduced when it does not, lowest for mixed input.
fn script_factor(lang_code: &str, hist: &ScriptHistogram) -> f32 {
    if hist.is_mixed() {
        return 0.7;
    }
    let dominant = hist.dominant().map(|(s, _)| s);
    match (script::expected_script(lang_code), dominant) {
        (Some(expected), Some(found)) if expected == found => 1.0,
        // Japanese mixes kana with ideographs; either dominance agrees.
        (Some(script::Script::Kana), Some(script::Script::Cjk)) if lang_code == "jpn" => 1.0,
        _ => 0.8,
    }
}

fn length_penalty(char_count: usize) -> f32 {
    match char_count {
        0..=4 => 0.3,
        5..=9 => 0.2,
        _ => 0.0,
    }
}
