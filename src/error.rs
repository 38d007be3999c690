//! Error types for report generation

use thiserror::Error;

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single HTTP exchange with the dashboard API failed
#[derive(Error, Debug)]
pub enum FetchFailure {
    /// The server answered with a non-2xx status
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    /// The request never produced a usable response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors that can occur while building a report
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the browser or HTTP client
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Dashboard metadata could not be fetched. Never retried.
    #[error("Failed to fetch dashboard {uid}: {source}")]
    DashboardFetch {
        uid: String,
        #[source]
        source: FetchFailure,
    },

    /// A panel image could not be fetched within the retry budget
    #[error("Failed to fetch panel {panel_id} after {attempts} attempts: {source}")]
    PanelFetch {
        panel_id: String,
        attempts: usize,
        #[source]
        source: FetchFailure,
    },

    /// Dashboard JSON was malformed
    #[error("Failed to parse dashboard JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Browser navigation, lifecycle wait or PDF capture failed
    #[error("Rendering failed during {stage}: {reason}")]
    Render { stage: &'static str, reason: String },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline elapsed
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration or request
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn render(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        Error::Render {
            stage,
            reason: reason.to_string(),
        }
    }

    /// True when the operation stopped because of the caller's cancellation
    /// signal or deadline rather than a remote failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::Timeout(10).is_cancellation());
        assert!(!Error::render("navigate", "boom").is_cancellation());
    }

    #[test]
    fn render_error_names_stage() {
        let err = Error::render("capture", "printToPDF failed");
        assert_eq!(
            err.to_string(),
            "Rendering failed during capture: printToPDF failed"
        );
    }
}
