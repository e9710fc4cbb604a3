//! Error types / 错误类型

use thiserror::Error;

/// Errors surfaced to callers of a search provider / 调用方可见的错误
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search mode '{mode}'; valid modes: {}", .valid.join(", "))]
    InvalidMode { mode: String, valid: Vec<String> },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Search term must be at least {min} characters")]
    TermTooShort { min: usize },

    #[error("Provider {0} is not enabled")]
    ProviderDisabled(String),

    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Not found: {0}")]
    NoContent(String),
}

impl SearchError {
    /// Caller-side problems (bad mode, pattern, provider or term)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SearchError::InvalidMode { .. }
                | SearchError::InvalidPattern(_)
                | SearchError::UnknownProvider(_)
                | SearchError::TermTooShort { .. }
        )
    }
}

/// Errors raised inside a query executor / 执行层错误
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out")]
    Timeout,

    #[error("query rejected: {0}")]
    Query(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Connection failures and timeouts may succeed on retry; malformed queries never do
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Connection(_) | BackendError::Timeout)
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => BackendError::Connection(e.to_string()),
            sqlx::Error::Database(_) => BackendError::Query(e.to_string()),
            _ => BackendError::Decode(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() || e.is_request() {
            BackendError::Connection(e.to_string())
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Query(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mode_message_lists_modes() {
        let e = SearchError::InvalidMode {
            mode: "nonexistent".to_string(),
            valid: vec!["exact".to_string(), "any".to_string()],
        };
        assert_eq!(e.to_string(), "Invalid search mode 'nonexistent'; valid modes: exact, any");
        assert!(e.is_client_error());
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout.is_transient());
        assert!(BackendError::Connection("refused".into()).is_transient());
        assert!(!BackendError::Query("syntax".into()).is_transient());
        assert!(!BackendError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_transient() {
        let e: BackendError = sqlx::Error::PoolTimedOut.into();
        assert!(e.is_transient());
        let e: BackendError = sqlx::Error::RowNotFound.into();
        assert!(!e.is_transient());
    }
}
