//! Error types for filechat.
//!
//! Only conditions that escape an orchestration call are represented here.  Malformed stream
//! frames are recovered inside the frame decoder, user cancellation is reported through
//! [`crate::StreamEnd`], and an empty discovery result is a regular
//! [`crate::DiscoveryOutcome`].

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The main error type for filechat.
#[derive(Clone, Debug)]
pub enum Error {
    /// The session is not set up to talk to a model (e.g. no model selected).
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// The completion API could not be reached or answered with a non-success status.
    Transport {
        /// HTTP status code, when the server answered at all.
        status_code: Option<u16>,
        /// Error type string reported by the server, if any.
        error_type: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Seconds the server asked us to wait before retrying.
        retry_after: Option<u64>,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The per-stream deadline elapsed before the stream finished.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The model replied, but not in the shape the pipeline asked for.
    MalformedModelOutput {
        /// Human-readable error message.
        message: String,
        /// The offending model output.
        output: String,
    },

    /// A collaborator could not produce a file's content.
    FileAccess {
        /// The requested path.
        path: String,
        /// Human-readable error message.
        message: String,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A caller supplied an argument the operation cannot honor.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },
}

impl Error {
    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Creates a transport error for a response with the given status.
    pub fn status(
        status_code: u16,
        error_type: Option<String>,
        message: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        Error::Transport {
            status_code: Some(status_code),
            error_type,
            message: message.into(),
            retry_after,
            source: None,
        }
    }

    /// Creates a transport error for a request that never produced a status.
    pub fn transport(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Transport {
            status_code: None,
            error_type: None,
            message: message.into(),
            retry_after: None,
            source: source.map(Arc::from),
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new malformed-model-output error.
    pub fn malformed_model_output(message: impl Into<String>, output: impl Into<String>) -> Self {
        Error::MalformedModelOutput {
            message: message.into(),
            output: output.into(),
        }
    }

    /// Creates a new file-access error.
    pub fn file_access(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::FileAccess {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if this error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns true if this error came from the network or the remote API.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the model answered in an unexpected shape.
    pub fn is_malformed_model_output(&self) -> bool {
        matches!(self, Error::MalformedModelOutput { .. })
    }

    /// Returns true if this error is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns true if repeating the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport {
                status_code: Some(code),
                ..
            } => matches!(code, 408 | 409 | 429 | 500..=599),
            Error::Transport {
                status_code: None, ..
            } => true,
            Error::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Transport { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration { message } => write!(f, "Configuration error: {message}"),
            Error::Transport {
                status_code,
                error_type,
                message,
                retry_after,
                ..
            } => {
                write!(f, "Transport error")?;
                if let Some(status_code) = status_code {
                    write!(f, " ({status_code})")?;
                }
                if let Some(error_type) = error_type {
                    write!(f, " {error_type}")?;
                }
                write!(f, ": {message}")?;
                if let Some(retry_after) = retry_after {
                    write!(f, " (retry after {retry_after} seconds)")?;
                }
                Ok(())
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::MalformedModelOutput { message, .. } => {
                write!(f, "Malformed model output: {message}")
            }
            Error::FileAccess { path, message } => {
                write!(f, "File access error: {path}: {message}")
            }
            Error::Serialization { message, .. } => write!(f, "Serialization error: {message}"),
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Url { message, .. } => write!(f, "URL error: {message}"),
            Error::Io { message, .. } => write!(f, "I/O error: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Transport { source, .. }
            | Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// A specialized Result type for filechat operations.
pub type Result<T> = std::result::Result<T, Error>;
