//! Script-range fallback classifier
//!
//! Classifies text by its dominant Unicode range. Used directly as the
//! fallback detector and shared with the primary detector's script
//! confidence factor and the pattern cache's character-class features.

use crate::cache::error::CacheError;
use crate::detect::{DetectionResult, DetectionSource};

/// Scripts the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    /// Hiragana and Katakana.
    Kana,
    Hangul,
    /// CJK Unified Ideographs.
    Cjk,
    Arabic,
    Devanagari,
    Thai,
}

pub const SCRIPT_COUNT: usize = 8;

const ALL_SCRIPTS: [Script; SCRIPT_COUNT] = [
    Script::Latin,
    Script::Cyrillic,
    Script::Kana,
    Script::Hangul,
    Script::Cjk,
    Script::Arabic,
    Script::Devanagari,
    Script::Thai,
];

impl Script {
    pub fn index(self) -> usize {
        match self {
            Script::Latin => 0,
            Script::Cyrillic => 1,
            Script::Kana => 2,
            Script::Hangul => 3,
            Script::Cjk => 4,
            Script::Arabic => 5,
            Script::Devanagari => 6,
            Script::Thai => 7,
        }
    }

    /// Default ISO 639-3 language for a dominant script.
    pub fn default_language(self) -> &'static str {
        match self {
            Script::Latin => "eng",
            Script::Cyrillic => "rus",
            Script::Kana => "jpn",
            Script::Hangul => "kor",
            Script::Cjk => "cmn",
            Script::Arabic => "ara",
            Script::Devanagari => "hin",
            Script::Thai => "tha",
        }
    }
}

/// Script of a single character, when it falls in a classified range.
pub fn script_of(ch: char) -> Option<Script> {
    match ch as u32 {
        // A-Z and a-z only; the punctuation between them (0x5B-0x60)
        // must not count as Latin letters.
        0x0041..=0x005A | 0x0061..=0x007A => Some(Script::Latin),
        0x0400..=0x04FF => Some(Script::Cyrillic),
        0x3040..=0x30FF => Some(Script::Kana),
        0xAC00..=0xD7AF => Some(Script::Hangul),
        0x4E00..=0x9FFF => Some(Script::Cjk),
        0x0600..=0x06FF => Some(Script::Arabic),
        0x0900..=0x097F => Some(Script::Devanagari),
        0x0E00..=0x0E7F => Some(Script::Thai),
        _ => None,
    }
}

/// Expected script for a detected language, where one is known.
pub fn expected_script(lang_code: &str) -> Option<Script> {
    match lang_code {
        "eng" | "fra" | "deu" | "spa" | "por" | "ita" | "nld" | "pol" | "tur" | "vie" | "ind"
        | "swe" | "dan" | "fin" | "ces" | "ron" | "hun" => Some(Script::Latin),
        "rus" | "ukr" | "bul" | "srp" | "bel" => Some(Script::Cyrillic),
        "jpn" => Some(Script::Kana),
        "kor" => Some(Script::Hangul),
        "cmn" | "zho" => Some(Script::Cjk),
        "ara" | "urd" | "pes" => Some(Script::Arabic),
        "hin" | "mar" | "nep" => Some(Script::Devanagari),
        "tha" => Some(Script::Thai),
        _ => None,
    }
}

/// Per-script character counts over one input.
#[derive(Debug, Clone, Default)]
pub struct ScriptHistogram {
    counts: [u32; SCRIPT_COUNT],
    /// Letters outside every classified range.
    pub other_letters: u32,
}

impl ScriptHistogram {
    pub fn analyze(text: &str) -> Self {
        let mut hist = Self::default();
        for ch in text.chars() {
            match script_of(ch) {
                Some(script) => hist.counts[script.index()] += 1,
                None if ch.is_alphabetic() => hist.other_letters += 1,
                None => {}
            }
        }
        hist
    }

    pub fn count(&self, script: Script) -> u32 {
        self.counts[script.index()]
    }

    /// Letters considered for dominance: classified plus unclassified.
    pub fn total_letters(&self) -> u32 {
        self.counts.iter().sum::<u32>() + self.other_letters
    }

    /// The script with the highest count, if any character classified.
    pub fn dominant(&self) -> Option<(Script, u32)> {
        ALL_SCRIPTS
            .iter()
            .map(|s| (*s, self.counts[s.index()]))
            .max_by_key(|(_, n)| *n)
            .filter(|(_, n)| *n > 0)
    }

    fn second(&self) -> Option<(Script, u32)> {
        let (dominant, _) = self.dominant()?;
        ALL_SCRIPTS
            .iter()
            .filter(|s| **s != dominant)
            .map(|s| (*s, self.counts[s.index()]))
            .max_by_key(|(_, n)| *n)
            .filter(|(_, n)| *n > 0)
    }

    /// More than one script carries real weight. Kana and CJK together
    /// are ordinary Japanese and do not count as mixed.
    pub fn is_mixed(&self) -> bool {
        let Some((dominant, _)) = self.dominant() else {
            return false;
        };
        let Some((second, second_count)) = self.second() else {
            return false;
        };
        let japanese_pair = matches!(
            (dominant, second),
            (Script::Kana, Script::Cjk) | (Script::Cjk, Script::Kana)
        );
        if japanese_pair {
            // A third script still makes the input mixed.
            return ALL_SCRIPTS
                .iter()
                .filter(|s| **s != dominant && **s != second)
                .any(|s| self.counts[s.index()] >= 2);
        }
        let threshold = ((self.total_letters() as f32) * 0.1).max(2.0) as u32;
        second_count >= threshold
    }

    /// Secondary language candidate from the second-heaviest script.
    pub fn secondary_candidate(&self) -> Option<(&'static str, f32)> {
        let (script, count) = self.second()?;
        let total = self.total_letters().max(1);
        Some((
            script.default_language(),
            (count as f32 / total as f32) * 0.5,
        ))
    }
}

/// Classify text by dominant Unicode range.
///
/// Digits/punctuation-only input defaults to English at low confidence.
pub fn classify(text: &str, now_ms: u64) -> Result<DetectionResult, CacheError> {
    if text.trim().is_empty() {
        return Err(CacheError::invalid_input("text is empty"));
    }
    let hist = ScriptHistogram::analyze(text);

    let Some((dominant, count)) = hist.dominant() else {
        // No classified characters at all: digits, punctuation or an
        // unranged script. English is the configured default.
        return Ok(DetectionResult {
            language: "eng".to_string(),
            confidence: if hist.other_letters > 0 { 0.3 } else { 0.4 },
            source: DetectionSource::Fallback,
            timestamp_ms: now_ms,
            alternatives: Vec::new(),
        });
    };

    let total = hist.total_letters().max(1);
    let ratio = count as f32 / total as f32;
    let mixed = hist.is_mixed();
    let length_factor = if mixed {
        (0.4 + 0.03 * count as f32).min(0.80)
    } else {
        (0.5 + 0.05 * count as f32).min(0.95)
    };
    let confidence = (ratio * length_factor).clamp(0.0, 0.95);

    let alternatives = if mixed {
        hist.secondary_candidate()
            .map(|(lang, conf)| vec![(lang.to_string(), conf)])
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(DetectionResult {
        language: dominant.default_language().to_string(),
        confidence,
        source: DetectionSource::Fallback,
        timestamp_ms: now_ms,
        alternatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_scripts_map_to_default_languages() {
        let cases = [
            ("hello world sample", "eng"),
            ("привет мир", "rus"),
            ("これはにほんごのテスト", "jpn"),
            ("안녕하세요 세계", "kor"),
            ("你好世界真好", "cmn"),
            ("مرحبا بالعالم", "ara"),
            ("नमस्ते दुनिया", "hin"),
            ("สวัสดีชาวโลก", "tha"),
        ];
        for (text, expected) in cases {
            let result = classify(text, 0).unwrap();
            assert_eq!(result.language, expected, "text {:?}", text);
            assert!(
                result.confidence >= 0.3,
                "confidence {} too low for {:?}",
                result.confidence,
                text
            );
        }
    }

    #[test]
    fn japanese_with_kanji_is_still_japanese() {
        let result = classify("これは日本語のテストです。", 0).unwrap();
        assert_eq!(result.language, "jpn");
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn mixed_scripts_cap_confidence() {
        let result = classify("漢字とEnglishの Mixed Text", 0).unwrap();
        assert!(result.confidence <= 0.8);
        assert!(!result.alternatives.is_empty());
    }

    #[test]
    fn digits_and_punctuation_default_to_english() {
        let result = classify("12345 !!! ??? 67.89", 0).unwrap();
        assert_eq!(result.language, "eng");
        assert!(result.confidence <= 0.5);
    }

    #[test]
    fn ascii_symbols_are_not_latin_letters() {
        for ch in ['[', '\\', ']', '^', '_', '`'] {
            assert_eq!(script_of(ch), None, "{:?} must not classify", ch);
        }
        let hist = ScriptHistogram::analyze("a_b [c]");
        assert_eq!(hist.count(Script::Latin), 3);
        assert_eq!(hist.total_letters(), 3);
        // Symbol-only input takes the punctuation default, not Latin.
        let result = classify("___ [[[ ]]] ```", 0).unwrap();
        assert_eq!(result.language, "eng");
        assert!(result.confidence <= 0.5);
    }

    #[test]
    fn empty_text_is_invalid() {
        assert!(classify("   ", 0).is_err());
    }

    #[test]
    fn long_pure_text_approaches_cap() {
        let text = "сорок пять слов на русском языке для проверки уверенности";
        let result = classify(text, 0).unwrap();
        assert_eq!(result.language, "rus");
        assert!(result.confidence > 0.85);
    }
}
