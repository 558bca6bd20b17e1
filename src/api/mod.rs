//! Typed contracts for the enclosing translation service
//!
//! The cache core does not speak HTTP; transports live outside. These
//! are the request/response bodies of the service's `/api/v1` surface
//! plus the error-to-status mapping and process exit codes, so every
//! embedding agrees on the wire shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::error::CacheError;

/// POST /translation/text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateTextRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<String>,
    pub target_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateTextResponse {
    pub translated_text: String,
    pub detected_language: String,
    pub confidence: f32,
    /// Whether the answer came from the cache rather than a model.
    pub cached: bool,
    pub model_used: String,
    pub processing_time_ms: u64,
}

/// POST /translation/batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateBatchRequest {
    pub texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<String>,
    pub target_lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateBatchResponse {
    pub results: Vec<TranslateTextResponse>,
}

/// POST /language/detect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub detected_language: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<LanguageCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageCandidate {
    pub language: String,
    pub confidence: f32,
}

/// GET /language/supported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedLanguagesResponse {
    pub languages: Vec<String>,
}

/// POST /cache/preload — accepted with a job handle (202).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePreloadRequest {
    pub source_lang: String,
    pub target_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit_kb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePreloadAccepted {
    pub job_id: String,
}

impl CachePreloadAccepted {
    pub fn new_job() -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
        }
    }
}

/// GET /cache/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatusResponse {
    pub size_kb: u64,
    pub count: u64,
    pub hit_rate: f64,
    pub per_pair: Vec<PairStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairStatus {
    pub source_lang: String,
    pub target_lang: String,
    pub count: u64,
}

/// DELETE /cache query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearParams {
    pub scope: ClearScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    All,
    Pair,
}

/// Error body returned alongside the mapped status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&CacheError> for ErrorBody {
    fn from(err: &CacheError) -> Self {
        let kind = match err {
            CacheError::InvalidInput(_) => "invalid_input",
            CacheError::NotFound => "not_found",
            CacheError::AlreadyInitialized => "already_initialized",
            CacheError::NotInitialized => "not_initialized",
            CacheError::Full => "full",
            CacheError::Timeout => "timeout",
            CacheError::RemoteUnavailable(_) => "remote_unavailable",
            CacheError::StorageError(_) => "storage_error",
            CacheError::InvalidFormat(_) => "invalid_format",
            CacheError::SchemaTooNew { .. } => "schema_too_new",
            CacheError::LowConfidence { .. } => "low_confidence",
            CacheError::Internal(_) => "internal",
        };
        Self {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

/// Process exit codes of the hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Clean shutdown.
    Clean = 0,
    /// Fatal startup: invalid config or schema-too-new.
    FatalStartup = 1,
    /// Unrecoverable runtime error after grace shutdown.
    RuntimeFailure = 2,
}
