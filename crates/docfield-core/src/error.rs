use thiserror::Error;

/// Request-level failures.
///
/// Anything that reaches the caller as an error lives here. Per-field problems
/// are [`SkipReason`]s instead and never abort a request.
#[derive(Error, Debug)]
pub enum DocFieldError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Failures reported by the OCR engine, Q&A model, document parser or rasterizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Backend could not be reached at all. Fails the whole request.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// Backend answered but this particular call failed.
    #[error("{service} call failed: {message}")]
    Failed {
        service: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn failed(service: &'static str, message: impl Into<String>) -> Self {
        CollaboratorError::Failed {
            service,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CollaboratorError::Unavailable { .. })
    }
}

/// Vendor template storage errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Invalid vendor name: {0}")]
    InvalidName(String),

    #[error("Template storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Why a single field request produced no output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("answer confidence {score:.3} below threshold {threshold:.3}")]
    LowConfidence { score: f64, threshold: f64 },

    #[error("no answer returned")]
    NoAnswer,

    #[error("no pattern matched")]
    NoMatch,

    #[error("model call failed: {0}")]
    ModelFailed(String),
}
