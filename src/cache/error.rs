//! Error types for cache and detection operations
//!
//! A single crate-level error enum covers both subsystems so that the
//! coordinator can degrade across tiers without translating error kinds
//! at every boundary.

/// Cache operation error kinds with per-kind context messages.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Missing text, invalid language code, out-of-range confidence.
    InvalidInput(String),
    /// Entry absent or expired; also the outcome of a cache miss on
    /// direct lookup paths.
    NotFound,
    /// Lifecycle misuse: init called twice.
    AlreadyInitialized,
    /// Lifecycle misuse: operation before init.
    NotInitialized,
    /// Memory tier at capacity and eviction could not make room.
    Full,
    /// Deadline exceeded at any tier.
    Timeout,
    /// Connection pool exhausted or all connections retired.
    RemoteUnavailable(String),
    /// Disk I/O failure in the durable tier.
    StorageError(String),
    /// Magic/version/length mismatch in a batch file or wire envelope.
    InvalidFormat(String),
    /// Durable store carries a schema version newer than this build.
    SchemaTooNew { stored: u32, supported: u32 },
    /// Detection result below the requested confidence threshold.
    LowConfidence { confidence: f32, threshold: f32 },
    /// Unexpected internal failure.
    Internal(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CacheError::NotFound => write!(f, "entry not found"),
            CacheError::AlreadyInitialized => write!(f, "already initialized"),
            CacheError::NotInitialized => write!(f, "not initialized"),
            CacheError::Full => write!(f, "cache full"),
            CacheError::Timeout => write!(f, "operation timed out"),
            CacheError::RemoteUnavailable(msg) => write!(f, "remote cache unavailable: {}", msg),
            CacheError::StorageError(msg) => write!(f, "storage error: {}", msg),
            CacheError::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            CacheError::SchemaTooNew { stored, supported } => write!(
                f,
                "stored schema version {} is newer than supported version {}",
                stored, supported
            ),
            CacheError::LowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "detection confidence {:.2} below threshold {:.2}",
                confidence, threshold
            ),
            CacheError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Create an invalid-input error.
    #[inline]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a storage error.
    #[inline]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create an invalid-format error.
    #[inline]
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a remote-unavailable error.
    #[inline]
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    /// Whether the coordinator may absorb this error on a read path and
    /// fall through to the next tier.
    pub fn degradable(&self) -> bool {
        matches!(
            self,
            CacheError::NotFound
                | CacheError::Timeout
                | CacheError::RemoteUnavailable(_)
                | CacheError::StorageError(_)
                | CacheError::InvalidFormat(_)
        )
    }

    /// HTTP status for the enclosing service's error mapping.
    pub fn http_status(&self) -> u16 {
        match self {
            CacheError::InvalidInput(_) | CacheError::LowConfidence { .. } => 400,
            CacheError::NotFound => 404,
            CacheError::Timeout | CacheError::RemoteUnavailable(_) => 503,
            CacheError::StorageError(_)
            | CacheError::InvalidFormat(_)
            | CacheError::SchemaTooNew { .. }
            | CacheError::Internal(_)
            | CacheError::Full => 500,
            CacheError::AlreadyInitialized | CacheError::NotInitialized => 500,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StorageError(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::RemoteUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_mapping_follows_service_contract() {
        assert_eq!(CacheError::invalid_input("x").http_status(), 400);
        assert_eq!(CacheError::NotFound.http_status(), 404);
        assert_eq!(CacheError::Timeout.http_status(), 503);
        assert_eq!(CacheError::remote("down").http_status(), 503);
        assert_eq!(CacheError::storage("disk").http_status(), 500);
    }

    #[test]
    fn read_path_degradation() {
        assert!(CacheError::Timeout.degradable());
        assert!(CacheError::remote("pool exhausted").degradable());
        assert!(!CacheError::invalid_input("bad code").degradable());
        assert!(!CacheError::SchemaTooNew {
            stored: 9,
            supported: 2
        }
        .degradable());
    }
}
