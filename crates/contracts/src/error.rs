//! Layered error definitions
//!
//! Categorized by source: pipeline run / composition / config / user code

use thiserror::Error;

use crate::Value;

/// Unified error type
#[derive(Debug, Error)]
pub enum PipeError {
    // ===== Run Errors =====
    /// A terminal pipe closed without any value reaching it
    #[error("no result: the pipeline terminated without producing a value")]
    NoResult,

    /// Operation on a frozen sink that was already thawed
    #[error("frozen sink was already thawed")]
    AlreadyThawed,

    /// Arithmetic or ordering between incompatible values
    #[error("unsupported operand types for {op}: '{left}' and '{right}'")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    // ===== Composition Errors =====
    /// Invalid operator parameter or invalid composition
    #[error("invalid parameter '{param}' = {value}: {message}")]
    InvalidParam {
        param: String,
        value: String,
        message: String,
    },

    // ===== User Code Errors =====
    /// Error raised inside a user-supplied transform or predicate
    #[error(transparent)]
    User(#[from] anyhow::Error),

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeError {
    /// Create invalid parameter error
    pub fn invalid_param(
        param: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            param: param.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    /// Create invalid composition error for `left | right`
    pub fn invalid_composition(left: &str, right: &str, message: impl Into<String>) -> Self {
        Self::invalid_param("composition", format!("{left} | {right}"), message)
    }

    /// Create type mismatch error
    pub fn type_mismatch(op: impl Into<String>, left: &Value, right: &Value) -> Self {
        Self::TypeMismatch {
            op: op.into(),
            left: left.type_name(),
            right: right.type_name(),
        }
    }

    /// Wrap a user-code error message
    pub fn user(message: impl std::fmt::Display) -> Self {
        Self::User(anyhow::anyhow!("{message}"))
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult)
    }
}

/// Result alias used across all pipeline crates
pub type PipeResult<T> = std::result::Result<T, PipeError>;
