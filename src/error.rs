use crate::error_code::ErrorClass;
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Parameter or configuration key that caused the error (e.g., "params.access_token", "max_batch_size")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "packer", "batcher", "credential_pool")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Whole-call rejection reported in the envelope's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote error {code} ({class}): {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    pub class: ErrorClass,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let class = ErrorClass::classify(code, &message);
        Self {
            code,
            message,
            class,
        }
    }
}

/// Failure of a single call inside a composite script.
///
/// `request_params` echoes the operation's own parameters (formatted, credential
/// excluded) so the failing call can be identified from logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} failed with code {code}: {message}")]
pub struct SubRequestError {
    pub method: String,
    pub code: i64,
    pub message: String,
    pub request_params: Vec<(String, String)>,
}

/// Unified error type for the packer runtime.
///
/// `Clone` because a batch-level failure is delivered to every member of the batch.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    SubRequest(#[from] SubRequestError),

    #[error("No response received for {method} ({request_id})")]
    MissingResponse { request_id: String, method: String },

    #[error("Precondition failed: {message}{}", format_context(.context))]
    Precondition {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode {
            message: e.to_string(),
        }
    }
}

impl Error {
    pub fn precondition_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Precondition {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode {
            message: msg.into(),
        }
    }

    /// Remote error class, for whole-call provider errors only.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Error::Provider(p) => Some(p.class),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.class().map(|c| c.retryable()).unwrap_or(false)
    }

    pub fn is_oversize(&self) -> bool {
        self.class().map(|c| c.splittable()).unwrap_or(false)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Precondition { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}
