//! Request fingerprinting
//!
//! Derives the stable cache key for a translation request from the
//! normalized source text and the language pair. The key is an external
//! format shared with the remote and durable tiers, so hashing uses
//! seedless FNV-1a and the layout is fixed:
//!
//! ```text
//! <source_lang>:<target_lang>:<hex-digest>[:<timestamp_ms>]
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache::config::types::{FingerprintConfig, HashFunction};
use crate::cache::error::CacheError;

/// Upper bound on generated key length in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// BCP-47-shaped language codes: primary subtag plus optional script and
/// region. Colons never match, which keeps the key format parseable.
static LANG_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(-[A-Z][a-z]{3})?(-[A-Z]{2})?$").unwrap());

const FNV32_OFFSET: u32 = 0x811c9dc5;
const FNV32_PRIME: u32 = 16777619;
const FNV128_OFFSET: u128 = 0x6c62272e07bb014262b821756295c58d;
const FNV128_PRIME: u128 = 0x0000000001000000000000000000013b;

/// A translation lookup/insert request before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Optional translation domain, folded into the hash when present.
    pub domain: Option<String>,
}

impl TranslationRequest {
    pub fn new(
        source_text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Trim, collapse internal whitespace runs to a single space, lowercase.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

pub(crate) fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

fn fnv1a_128(bytes: &[u8]) -> u128 {
    let mut hash = FNV128_OFFSET;
    for &b in bytes {
        hash ^= b as u128;
        hash = hash.wrapping_mul(FNV128_PRIME);
    }
    hash
}

/// Validate a language code against the accepted shape.
pub fn validate_lang_code(code: &str) -> Result<(), CacheError> {
    if LANG_CODE.is_match(code) {
        Ok(())
    } else {
        Err(CacheError::invalid_input(format!(
            "invalid language code: {:?}",
            code
        )))
    }
}

/// Generate the cache key for a request.
///
/// `now_ms` is consulted only when the config opts into timestamp
/// suffixes. Passing the same request twice always yields the same key
/// otherwise.
pub fn generate_key(
    request: &TranslationRequest,
    config: &FingerprintConfig,
    now_ms: u64,
) -> Result<String, CacheError> {
    if request.source_text.is_empty() {
        return Err(CacheError::invalid_input("source text is empty"));
    }
    validate_lang_code(&request.source_lang)?;
    validate_lang_code(&request.target_lang)?;

    let body = hash_body(request, config);
    let digest = match config.hash_function {
        HashFunction::Fnv1a => format!("{:08x}", fnv1a_32(body.as_bytes())),
        HashFunction::Fnv1a128 => format!("{:032x}", fnv1a_128(body.as_bytes())),
    };

    let key = if config.include_timestamp {
        format!(
            "{}:{}:{}:{}",
            request.source_lang, request.target_lang, digest, now_ms
        )
    } else {
        format!("{}:{}:{}", request.source_lang, request.target_lang, digest)
    };

    if key.len() > MAX_KEY_LEN {
        return Err(CacheError::invalid_input("generated key exceeds 512 bytes"));
    }
    Ok(key)
}

/// The exact byte sequence fed to the hash for a request. Exposed so the
/// store can re-derive it for collision disambiguation.
pub fn hash_body(request: &TranslationRequest, config: &FingerprintConfig) -> String {
    let text = if config.normalize_text {
        normalize(&request.source_text)
    } else {
        request.source_text.clone()
    };
    match &request.domain {
        // Unit separator keeps "ab" + "c" distinct from "a" + "bc".
        Some(domain) => format!("{}\u{1f}{}", text, domain),
        None => text,
    }
}
