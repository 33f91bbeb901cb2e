//! Error types for the upstream completion provider.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`LlmError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the provider failed before a response arrived.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response broke off mid-way.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Tool call could not be parsed or executed.
    pub const TOOL_FAILED: &str = "TOOL_FAILED";

    /// Request timed out.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// Provider answered with a non-2xx status.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced while talking to the completion provider.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Provider rejected the credentials (401/403).
    #[error("[{}] HTTP {status}: {body}", error_codes::AUTH_FAILED)]
    AuthError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Request could not be delivered.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Streaming response encountered an error.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// Tool call arguments were malformed or the call could not run.
    #[error("[{}] {}", error_codes::TOOL_FAILED, .0)]
    ToolError(String),

    /// Request or operation timed out.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    TimeoutError(String),

    /// Provider answered with a non-2xx status. `body` is the raw text body.
    #[error("[{}] HTTP {status}: {body}", error_codes::PROVIDER_ERROR)]
    ProviderError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Raw response body.
        body: String,
    },
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthError { .. } => error_codes::AUTH_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::ToolError(_) => error_codes::TOOL_FAILED,
            Self::TimeoutError(_) => error_codes::TIMEOUT_ERROR,
            Self::ProviderError { .. } => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::ToolError(m)
            | Self::TimeoutError(m) => m,
            Self::AuthError { body, .. } | Self::ProviderError { body, .. } => body,
        }
    }

    /// HTTP status to surface to the endpoint's caller for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthError { status, .. } | Self::ProviderError { status, .. } => *status,
            Self::TimeoutError(_) => 504,
            Self::ConfigError(_) => 500,
            Self::RequestError(_) | Self::StreamError(_) | Self::ToolError(_) => 502,
        }
    }

    /// Whether a user-triggered regenerate is likely to succeed.
    ///
    /// Nothing in the relay retries automatically; this only informs the UI.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigError(_) | Self::AuthError { .. } | Self::ToolError(_) => false,
            Self::RequestError(_) | Self::StreamError(_) | Self::TimeoutError(_) => true,
            Self::ProviderError { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Convenience alias for provider results.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_prefix() {
        let err = LlmError::ConfigError("missing model".into());
        let display = format!("{err}");
        assert!(display.starts_with("[CONFIG_INVALID]"));
        assert!(display.contains("missing model"));
    }

    #[test]
    fn provider_error_keeps_status_and_body() {
        let err = LlmError::ProviderError {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.code(), "PROVIDER_ERROR");
        assert_eq!(err.message(), "overloaded");
        assert_eq!(err.http_status(), 503);
        assert_eq!(err.to_string(), "[PROVIDER_ERROR] HTTP 503: overloaded");
    }

    #[test]
    fn auth_error_keeps_upstream_status() {
        let err = LlmError::AuthError {
            status: 403,
            body: "key revoked".into(),
        };
        assert_eq!(err.code(), "AUTH_FAILED");
        assert_eq!(err.message(), "key revoked");
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.to_string(), "[AUTH_FAILED] HTTP 403: key revoked");
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors = [
            LlmError::ConfigError("x".into()),
            LlmError::AuthError {
                status: 401,
                body: "x".into(),
            },
            LlmError::RequestError("x".into()),
            LlmError::StreamError("x".into()),
            LlmError::ToolError("x".into()),
            LlmError::TimeoutError("x".into()),
            LlmError::ProviderError {
                status: 500,
                body: "x".into(),
            },
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(
            !LlmError::AuthError {
                status: 403,
                body: "k".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::ToolError("bad args".into()).is_retryable());
        assert!(LlmError::StreamError("eof".into()).is_retryable());
        assert!(
            LlmError::ProviderError {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ProviderError {
                status: 400,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmError>();
    }
}
