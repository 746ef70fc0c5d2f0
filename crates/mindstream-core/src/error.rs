//! Error types for mindstream

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {field} - {message}")]
    Config { field: String, message: String },

    #[error("unknown placeholder {{{placeholder}}} in template {template:?} of component {component}")]
    UnknownPlaceholder {
        component: String,
        template: String,
        placeholder: String,
    },

    #[error("invalid template {template:?} in component {component}: {reason}")]
    InvalidTemplate {
        component: String,
        template: String,
        reason: String,
    },

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_placeholder(
        component: impl Into<String>,
        template: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> Self {
        Self::UnknownPlaceholder {
            component: component.into(),
            template: template.into(),
            placeholder: placeholder.into(),
        }
    }

    pub fn invalid_template(
        component: impl Into<String>,
        template: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTemplate {
            component: component.into(),
            template: template.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for every error that can only come out of configuration validation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::UnknownPlaceholder { .. } | Self::InvalidTemplate { .. }
        )
    }
}
