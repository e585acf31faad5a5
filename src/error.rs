use thiserror::Error;

/// Error types for the harvesting pipeline
#[derive(Error, Debug)]
pub enum HarvestError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    // Render collaborator errors
    #[error("Page load failed: {url} - {message}")]
    PageLoad { url: String, message: String },

    #[error("Page load failed: {url} - HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Render session error: {message}")]
    Render { message: String },

    #[error("Timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("No page is open in this session")]
    NoPageOpen,

    // Export errors
    #[error("Export error: {message}")]
    Export { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HarvestError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a page load error
    pub fn page_load(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PageLoad { url: url.into(), message: message.into() }
    }

    /// Create an error for a response with a non-success status
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus { url: url.into(), status }
    }

    /// Create a render session error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render { message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis: duration.as_millis() as u64,
        }
    }

    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector { selector: selector.into(), message: message.into() }
    }

    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into(), message: message.into() }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if error is recoverable by retrying the same unit of work
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PageLoad { .. } | Self::Render { .. } | Self::Timeout { .. } => true,

            // Server errors and throttling may clear up; other client errors will not
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,

            Self::Configuration { .. }
            | Self::InvalidSelector { .. }
            | Self::InvalidUrl { .. }
            | Self::NoPageOpen => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidSelector { .. } | Self::InvalidUrl { .. } => {
                "configuration"
            }
            Self::PageLoad { .. }
            | Self::HttpStatus { .. }
            | Self::Render { .. }
            | Self::NoPageOpen => "render",
            Self::Timeout { .. } => "timeout",
            Self::Export { .. } | Self::Io(_) => "export",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for the harvesting pipeline
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

impl From<url::ParseError> for HarvestError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl { url: String::new(), message: err.to_string() }
    }
}

impl From<csv::Error> for HarvestError {
    fn from(err: csv::Error) -> Self {
        Self::Export { message: err.to_string() }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Export { message: err.to_string() }
    }
}
