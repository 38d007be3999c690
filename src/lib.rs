//! dashreport
//!
//! Turns a Grafana dashboard into a paginated PDF report made of rendered
//! panel images.
//!
//! # Overview
//!
//! - **API client** ([`client`]): fetches dashboard JSON and rasterizes single
//!   panels through the `/render/d-solo` endpoint, retrying transient failures
//! - **Dashboard model** ([`dashboard`]): reconciles the declared layout with
//!   browser-measured geometry and applies include/exclude panel filters
//! - **Document renderer** ([`browser`]): drives headless Chrome over CDP to
//!   print composed HTML to PDF once the page is network-idle
//!
//! # Example
//!
//! ```no_run
//! use dashreport::{Browser, Deadline, GrafanaClient, ReportConfig, ReportRequest, TimeRange};
//!
//! # async fn run() -> dashreport::Result<()> {
//! let config = ReportConfig {
//!     url: "http://localhost:3000".to_string(),
//!     ..Default::default()
//! };
//! let request = ReportRequest {
//!     uid: "rYy7Paekz".to_string(),
//!     time_range: TimeRange::new("now-6h", "now"),
//!     ..Default::default()
//! };
//!
//! let http = GrafanaClient::http_client(&config)?;
//! let client = GrafanaClient::new(http, &config.url, "", &request.variables, config.layout)?;
//! let browser = Browser::launch(&config).await?;
//! let deadline = Deadline::never().with_timeout(config.render_timeout());
//!
//! let pdf = dashreport::generate_report(&client, &browser, &config, &request, &deadline).await?;
//! std::fs::write("report.pdf", pdf).ok();
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub mod error;
pub use error::{Error, FetchFailure, Result};

pub mod deadline;
pub use deadline::Deadline;

pub mod client;
pub use client::{GrafanaClient, RetryPolicy};

pub mod dashboard;
pub use dashboard::{build_dashboard, Dashboard, GridPos, Panel, PanelBox, PanelType};

// Blocking CDP steps executed on a single tab
pub mod cdp;

// Async browser facade backed by a worker thread that owns Chrome
pub mod browser;
pub use browser::{Browser, PdfOptions};

pub mod report;
pub use report::{generate_report, ReportRequest};

/// Query parameters forwarded by the host, keyed by parameter name
pub type QueryValues = BTreeMap<String, Vec<String>>;

/// Time range expressions, passed verbatim to the render endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl TimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::new("now-1h", "now")
    }
}

/// How panel images are sized and placed in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Fixed image sizes by panel type, one panel per row
    #[default]
    Simple,
    /// Images sized and placed after the dashboard grid
    Grid,
}

/// Page orientation of the printed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Which panels of the dashboard JSON take part in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DashboardMode {
    /// Top-level panels only
    #[default]
    Default,
    /// Also expand panels nested in collapsed rows
    Full,
}

/// Configuration for report generation
///
/// Field names follow the host's plugin settings JSON (camelCase), so the
/// settings blob can be deserialized directly with [`ReportConfig::from_json`].
/// Defaults are conservative:
/// - portrait pages, `simple` layout, `default` dashboard mode
/// - two concurrent panel fetches and two concurrent browser sessions
/// - three fetch attempts five seconds apart, a 30 second render timeout
///
/// # Examples
///
/// ```
/// let cfg = dashreport::ReportConfig::default();
/// assert_eq!(cfg.max_render_workers, 2);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportConfig {
    /// Base URL of the visualization platform
    #[serde(alias = "appURL")]
    pub url: String,
    /// Accept invalid TLS certificates from the platform
    pub tls_skip_verify: bool,
    /// Page orientation
    pub orientation: Orientation,
    /// Panel layout mode
    pub layout: Layout,
    /// Panel selection mode
    pub dashboard_mode: DashboardMode,
    /// Base64 encoded logo shown in the page header
    pub logo: Option<String>,
    /// Maximum number of concurrent panel image fetches
    pub max_render_workers: usize,
    /// Maximum number of documents printed by the shared browser at once
    pub max_browser_workers: usize,
    /// IANA time zone for report times; the server's zone when unset
    pub time_zone: Option<String>,
    /// Websocket URL of a running Chrome to connect to instead of launching one
    #[serde(alias = "remoteChromeURL")]
    pub remote_chrome_url: Option<String>,
    /// Panel IDs (or clone base IDs) to keep
    #[serde(rename = "includePanelIDs", alias = "includePanelIds")]
    pub include_panel_ids: Vec<String>,
    /// Panel IDs (or clone base IDs) to drop
    #[serde(rename = "excludePanelIDs", alias = "excludePanelIds")]
    pub exclude_panel_ids: Vec<String>,
    /// Attempts per panel image request, including the first one
    pub retry_attempts: usize,
    /// Fixed sleep between panel image attempts in milliseconds
    pub retry_interval_ms: u64,
    /// Timeout for a whole report in milliseconds
    pub render_timeout_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            tls_skip_verify: false,
            orientation: Orientation::default(),
            layout: Layout::default(),
            dashboard_mode: DashboardMode::default(),
            logo: None,
            max_render_workers: 2,
            max_browser_workers: 2,
            time_zone: None,
            remote_chrome_url: None,
            include_panel_ids: Vec::new(),
            exclude_panel_ids: Vec::new(),
            retry_attempts: 3,
            retry_interval_ms: 5000,
            render_timeout_ms: 30000,
        }
    }
}

impl ReportConfig {
    /// Parse host settings JSON. Missing fields keep their defaults.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(raw)
            .map_err(|e| Error::ConfigError(format!("Failed to parse settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::ConfigError("url must not be empty".into()));
        }
        if self.max_render_workers == 0 {
            return Err(Error::ConfigError("maxRenderWorkers must be at least 1".into()));
        }
        if self.max_browser_workers == 0 {
            return Err(Error::ConfigError("maxBrowserWorkers must be at least 1".into()));
        }
        if self.retry_attempts == 0 {
            return Err(Error::ConfigError("retryAttempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Configured time zone, if a non-blank one is set
    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReportConfig::default();
        assert_eq!(config.layout, Layout::Simple);
        assert_eq!(config.orientation, Orientation::Portrait);
        assert_eq!(config.retry_policy().attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_host_settings() {
        let raw = br#"{
            "appURL": "https://grafana.example.org",
            "orientation": "landscape",
            "layout": "grid",
            "dashboardMode": "full",
            "maxRenderWorkers": 4,
            "maxBrowserWorkers": 3,
            "timeZone": "Europe/Berlin",
            "includePanelIDs": ["panel-1", "4"],
            "unknownField": true
        }"#;
        let config = ReportConfig::from_json(raw).unwrap();
        assert_eq!(config.url, "https://grafana.example.org");
        assert_eq!(config.orientation, Orientation::Landscape);
        assert_eq!(config.layout, Layout::Grid);
        assert_eq!(config.dashboard_mode, DashboardMode::Full);
        assert_eq!(config.max_render_workers, 4);
        assert_eq!(config.max_browser_workers, 3);
        assert_eq!(config.time_zone(), Some("Europe/Berlin"));
        assert_eq!(config.include_panel_ids, vec!["panel-1", "4"]);
        assert!(config.exclude_panel_ids.is_empty());
        assert_eq!(config.render_timeout_ms, 30000);
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let err = ReportConfig::from_json(br#"{"maxRenderWorkers": 0}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_config_browser_worker_defaults() {
        let config = ReportConfig::from_json(br#"{"timeZone": "  "}"#).unwrap();
        assert_eq!(config.max_browser_workers, 2);
        assert_eq!(config.time_zone(), None);

        let err = ReportConfig::from_json(br#"{"maxBrowserWorkers": 0}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_time_range_default() {
        let tr = TimeRange::default();
        assert_eq!(tr.from, "now-1h");
        assert_eq!(tr.to, "now");
    }
}
