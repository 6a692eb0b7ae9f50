use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("{tool} is not installed")]
    ToolMissing { tool: String },

    /// `output` carries the captured stdout/stderr with temp paths redacted.
    #[error("{tool} failed: {reason}")]
    ToolExecutionFailed {
        tool: String,
        reason: String,
        output: String,
    },

    #[error("temporary file error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    Decode,
    Encode,
    ToolMissing,
    ToolExecutionFailed,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Decode => "decode",
            ErrorKind::Encode => "encode",
            ErrorKind::ToolMissing => "tool_missing",
            ErrorKind::ToolExecutionFailed => "tool_execution_failed",
            ErrorKind::Io => "io",
        }
    }
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ProcessingError::Decode(_) => ErrorKind::Decode,
            ProcessingError::Encode(_) => ErrorKind::Encode,
            ProcessingError::ToolMissing { .. } => ErrorKind::ToolMissing,
            ProcessingError::ToolExecutionFailed { .. } => ErrorKind::ToolExecutionFailed,
            ProcessingError::Io(_) => ErrorKind::Io,
        }
    }

    /// Reason safe to show to end users: no captured tool output, no paths.
    pub fn public_reason(&self) -> String {
        match self {
            ProcessingError::ToolMissing { tool } => {
                format!("{tool} is not installed on the server")
            }
            ProcessingError::Io(_) => "could not use temporary storage".to_string(),
            other => other.to_string(),
        }
    }

    /// Internal detail for logs.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ProcessingError::ToolExecutionFailed { output, .. } if !output.is_empty() => {
                Some(output)
            }
            _ => None,
        }
    }
}

/// Failure surfaced by [`crate::engine::ConversionEngine`].
///
/// `message` is the only text meant for end users; the underlying
/// [`ProcessingError`] stays available through `source` for logging.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConversionFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: ProcessingError,
}

impl From<ProcessingError> for ConversionFailure {
    fn from(source: ProcessingError) -> Self {
        Self {
            kind: source.kind(),
            message: format!("Processing failed: {}", source.public_reason()),
            source,
        }
    }
}
