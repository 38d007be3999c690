//! HTTP client for the dashboard and panel render APIs.
//!
//! The client knows two endpoints of the visualization platform:
//!
//! - `GET /api/dashboards/uid/{uid}` for dashboard JSON, fetched once and
//!   never retried
//! - `GET /render/d-solo/{slug}/_` for single-panel PNGs, retried with a
//!   fixed interval
//!
//! A client is cheap to build per report: the pooled `reqwest::Client` is
//! shared, only the cookie and template variables are request specific.

use crate::dashboard::{panel_size, Panel};
use crate::{Deadline, Error, FetchFailure, Layout, QueryValues, ReportConfig, Result, TimeRange};
use log::{debug, warn};
use reqwest::header::COOKIE;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use url::Url;

/// How panel image requests are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: usize,
    /// Fixed sleep between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(5),
        }
    }
}

/// Client for one report's worth of requests against the platform
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: Url,
    cookie: String,
    variables: Vec<(String, String)>,
    layout: Layout,
    time_zone: Option<String>,
    retry: RetryPolicy,
}

impl GrafanaClient {
    /// Build the shared HTTP client for `config`
    pub fn http_client(config: &ReportConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .timeout(config.render_timeout())
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))
    }

    /// Create a client. Only `var-*` entries of `variables` are forwarded to
    /// the render endpoint; an empty `cookie` sends no `Cookie` header.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        cookie: impl Into<String>,
        variables: &QueryValues,
        layout: Layout,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::ConfigError(format!("Invalid base URL '{}'", base_url)));
        }

        let variables = variables
            .iter()
            .filter(|(k, _)| k.starts_with("var-"))
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect();

        Ok(Self {
            http,
            base_url,
            cookie: cookie.into(),
            variables,
            layout,
            time_zone: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Render panels in `time_zone` (IANA name) instead of the server's zone
    pub fn with_time_zone(mut self, time_zone: Option<&str>) -> Self {
        self.time_zone = time_zone.map(str::to_string);
        self
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL of the dashboard-by-UID endpoint
    pub fn dashboard_url(&self, uid: &str) -> Url {
        self.endpoint(&["api", "dashboards", "uid", uid])
    }

    /// URL of the single-panel render endpoint for `panel`
    pub fn panel_url(&self, panel: &Panel, slug: &str, time_range: &TimeRange) -> Url {
        let (width, height) = panel_size(panel, self.layout);
        let mut url = self.endpoint(&["render", "d-solo", slug, "_"]);
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("panelId", &panel.id)
                .append_pair("from", &time_range.from)
                .append_pair("to", &time_range.to);
            for (k, v) in &self.variables {
                q.append_pair(k, v);
            }
            if let Some(tz) = &self.time_zone {
                q.append_pair("tz", tz);
            }
            q.append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string());
        }
        url
    }

    async fn get(&self, url: Url) -> std::result::Result<Vec<u8>, FetchFailure> {
        let mut req = self.http.get(url);
        if !self.cookie.is_empty() {
            req = req.header(COOKIE, &self.cookie);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch raw dashboard JSON by UID. Failures are fatal for the report.
    pub async fn fetch_dashboard(&self, uid: &str, deadline: &Deadline) -> Result<Vec<u8>> {
        let url = self.dashboard_url(uid);
        debug!("Fetching dashboard {}", url);
        deadline
            .run(async {
                self.get(url).await.map_err(|source| Error::DashboardFetch {
                    uid: uid.to_string(),
                    source,
                })
            })
            .await
    }

    /// Fetch the PNG of one panel, retrying transient failures.
    pub async fn fetch_panel_image(
        &self,
        panel: &Panel,
        slug: &str,
        time_range: &TimeRange,
        deadline: &Deadline,
    ) -> Result<Vec<u8>> {
        if panel.is_row() {
            return Err(Error::ConfigError(format!(
                "Panel {} is a row and cannot be rendered",
                panel.id
            )));
        }

        let url = self.panel_url(panel, slug, time_range);
        let attempts = self.retry.attempts.max(1);
        let strategy = FixedInterval::new(self.retry.interval).take(attempts - 1);

        let mut attempt = 0;
        let action = || {
            attempt += 1;
            let n = attempt;
            let url = url.clone();
            async move {
                debug!("Fetching panel {} (attempt {}/{}): {}", panel.id, n, attempts, url);
                self.get(url).await.map_err(|e| {
                    warn!("Panel {} attempt {}/{} failed: {}", panel.id, n, attempts, e);
                    e
                })
            }
        };

        deadline
            .run(async {
                Retry::spawn(strategy, action)
                    .await
                    .map_err(|source| Error::PanelFetch {
                        panel_id: panel.id.clone(),
                        attempts,
                        source,
                    })
            })
            .await
    }
}
