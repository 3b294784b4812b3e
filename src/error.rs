use thiserror::Error;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Raised while loading service definitions; a catalog that fails here is never served.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown service \"{0}\"")]
    UnknownService(String),
    #[error("service \"{service}\": duplicate field \"{field}\"")]
    DuplicateField { service: String, field: String },
    #[error("service \"{service}\": field \"{field}\" needs at least one option")]
    MissingOptions { service: String, field: String },
    #[error("service \"{service}\": default value of field \"{field}\" does not match its kind")]
    DefaultMismatch { service: String, field: String },
    #[error("service \"{service}\": field \"{field}\": {reason}")]
    MisplacedConstraint { service: String, field: String, reason: &'static str },
    #[error("service \"{service}\": role {role} is declared more than once")]
    DuplicateRole { service: String, role: &'static str },
    #[error("service \"{0}\" is declared more than once")]
    DuplicateService(String),
    #[error("catalog io: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown field \"{0}\"")]
    UnknownField(String),
    #[error("field \"{0}\" is not a checkbox group")]
    NotToggleable(String),
}

/// Failure reported by a generation capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or(UNKNOWN_ERROR_MESSAGE))]
pub struct ProviderError {
    pub message: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { message: (!message.trim().is_empty()).then_some(message) }
    }

    pub fn unknown() -> Self {
        Self { message: None }
    }
}

/// Terminal failure of a generation attempt. `Display` is the user-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("{message}")]
    Validation { field: String, message: String },
    #[error("{0}")]
    Provider(String),
    #[error("{}", UNKNOWN_ERROR_MESSAGE)]
    Unknown,
}

impl GenerationError {
    pub fn required(field: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: format!("The field \"{field}\" is required."),
        }
    }

    pub fn invalid(field: &str, detail: impl std::fmt::Display) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: format!("The field \"{field}\" is invalid: {detail}."),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::Unknown => ErrorKind::UnknownError,
        }
    }
}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        match err.message {
            Some(message) => Self::Provider(message),
            None => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    ValidationError,
    ProviderError,
    UnknownError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn provider_error_without_message_becomes_unknown() {
        let err: GenerationError = ProviderError::new("   ").into();
        assert_eq!(err, GenerationError::Unknown);
        assert_eq!(err.to_string(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::UnknownError);
    }

    #[test]
    fn provider_message_passes_through() {
        let err: GenerationError = ProviderError::new("quota exceeded").into();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(err.kind(), ErrorKind::ProviderError);
    }

    #[test]
    fn required_message_names_field() {
        let err = GenerationError::required("Image de référence");
        assert_eq!(err.to_string(), "The field \"Image de référence\" is required.");
    }
}
