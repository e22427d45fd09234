//! Unified application error model.
//! Every screen operation funnels its failures through `AppError`; screens turn them into
//! inline messages, so nothing here ever escapes past the component that raised it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::ProviderError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Bad email/password; the provider's message is shown verbatim.
    Credential { code: String, message: String },
    /// Right credentials, wrong audience. Always paired with a forced sign-out.
    Authorization { code: String, message: String },
    /// Rejected locally before (or instead of) a backend call.
    Validation { code: String, message: String },
    Io { code: String, message: String },
    NotFound { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Credential { code, .. }
            | AppError::Authorization { code, .. }
            | AppError::Validation { code, .. }
            | AppError::Io { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Credential { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::Validation { message, .. }
            | AppError::Io { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn credential<S: Into<String>>(code: S, msg: S) -> Self { AppError::Credential { code: code.into(), message: msg.into() } }
    pub fn authorization<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authorization { code: code.into(), message: msg.into() } }
    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Short taxonomy label used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Credential { .. } => "credential",
            AppError::Authorization { .. } => "authorization",
            AppError::Validation { .. } => "validation",
            AppError::Io { .. } => "io",
            AppError::NotFound { .. } => "not_found",
            AppError::Internal { .. } => "internal",
        }
    }

    /// Whether the failure was decided locally without the backend being involved.
    pub fn is_local(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            // provider auth messages are user-facing as-is
            ProviderError::Auth { message } => AppError::Credential { code: "auth_error".into(), message },
            ProviderError::NoSession => AppError::Credential { code: "no_session".into(), message: err.to_string() },
            ProviderError::NotSingle(_) => AppError::NotFound { code: "row_not_found".into(), message: err.to_string() },
            ProviderError::Http { .. } | ProviderError::Transport(_) | ProviderError::Decode(_) => {
                AppError::Io { code: "backend_io".into(), message: err.to_string() }
            }
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
