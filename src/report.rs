//! Report assembly: dashboard model, panel images and the composed document.
//!
//! Panel images are fetched concurrently but joined back in discovery order.
//! A panel whose retries are exhausted fails the whole report; remaining
//! in-flight fetches are dropped with it.

use crate::browser::{Browser, PdfOptions};
use crate::dashboard::{build_dashboard, Dashboard, Panel};
use crate::{Deadline, GrafanaClient, Layout, QueryValues, ReportConfig, Result, TimeRange};
use base64::Engine as Base64Engine;
use futures::{stream, StreamExt, TryStreamExt};
use htmlize::{escape_attribute, escape_text};
use log::info;
use std::fmt::Write;

/// What the host asks a report for
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    /// Dashboard UID
    pub uid: String,
    pub time_range: TimeRange,
    /// Host query parameters; `var-*` entries are template variables
    pub variables: QueryValues,
    /// Panel geometry measured by the host in a live browser session
    pub panel_boxes: Vec<serde_json::Value>,
}

/// A panel together with its rendered PNG
#[derive(Debug, Clone)]
pub struct PanelImage {
    pub panel: Panel,
    pub png: Vec<u8>,
}

/// Fetch every renderable panel of `dashboard`, at most `workers` at a time.
///
/// Results keep the dashboard's panel order regardless of completion order.
pub async fn fetch_panel_images(
    client: &GrafanaClient,
    dashboard: &Dashboard,
    time_range: &TimeRange,
    workers: usize,
    deadline: &Deadline,
) -> Result<Vec<PanelImage>> {
    stream::iter(dashboard.panels.iter().filter(|p| !p.is_row()))
        .map(|panel| async move {
            let png = client
                .fetch_panel_image(panel, &dashboard.slug, time_range, deadline)
                .await?;
            Ok::<_, crate::Error>(PanelImage {
                panel: panel.clone(),
                png,
            })
        })
        .buffered(workers.max(1))
        .try_collect()
        .await
}

const BODY_STYLE: &str = "\
@page { size: A4; }
body { margin: 0; font-family: sans-serif; }
.panel { margin: 0 0 12px 0; page-break-inside: avoid; break-inside: avoid; }
.panel img { display: block; width: 100%; height: 100%; object-fit: contain; }
.layout-simple .panel img { height: auto; }
.layout-grid { display: grid; grid-template-columns: repeat(24, 1fr); grid-auto-rows: calc(100vw / 24); gap: 4px; }
.layout-grid .panel { margin: 0; }";

fn png_data_uri(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

const GRID_COLUMNS: f64 = 24.0;

/// Right edge of the widest measured row, in pixels
fn measured_extent(images: &[PanelImage]) -> f64 {
    images
        .iter()
        .filter_map(|i| i.panel.measured.as_ref())
        .map(|b| b.x + b.width)
        .fold(0.0, f64::max)
}

/// CSS grid placement of a panel. Measured boxes are scaled onto the 24
/// column grid using `extent` as the full dashboard width; otherwise the
/// declared grid position is used.
fn grid_placement(panel: &Panel, extent: f64) -> String {
    let (x, y, w, h) = match &panel.measured {
        Some(b) if extent > 0.0 && b.width > 0.0 && b.height > 0.0 => {
            let unit = extent / GRID_COLUMNS;
            (b.x / unit, b.y / unit, b.width / unit, b.height / unit)
        }
        _ => {
            let g = &panel.grid_pos;
            (g.x, g.y, g.w, g.h)
        }
    };
    if w <= 0.0 || h <= 0.0 {
        return "grid-column: 1 / -1;".to_string();
    }

    let columns = GRID_COLUMNS as i64;
    let column = (x.round() as i64).clamp(0, columns - 1);
    let span = (w.round() as i64).clamp(1, columns - column);
    format!(
        "grid-column: {} / span {}; grid-row: {} / span {};",
        column + 1,
        span,
        (y.round() as i64).max(0) + 1,
        (h.round() as i64).max(1)
    )
}

/// Compose the header, body and footer of the report document
pub fn compose_document(
    dashboard: &Dashboard,
    images: &[PanelImage],
    time_range: &TimeRange,
    config: &ReportConfig,
) -> PdfOptions {
    let title = escape_text(dashboard.title.as_str());
    let layout = match config.layout {
        Layout::Simple => "layout-simple",
        Layout::Grid => "layout-grid",
    };

    let extent = measured_extent(images);
    let mut body = String::new();
    let _ = write!(
        body,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head><body><div class=\"panels {}\">",
        title, BODY_STYLE, layout
    );
    for image in images {
        let style = match config.layout {
            Layout::Simple => String::new(),
            Layout::Grid => grid_placement(&image.panel, extent),
        };
        let _ = write!(
            body,
            "<figure class=\"panel\" id=\"panel-{}\" style=\"{}\"><img src=\"{}\" alt=\"{}\"></figure>",
            escape_attribute(image.panel.id.as_str()),
            style,
            png_data_uri(&image.png),
            escape_attribute(image.panel.title.as_str()),
        );
    }
    body.push_str("</div></body></html>");

    // Chrome renders header/footer templates with a zero font size unless set
    let mut header = String::from(
        "<div style=\"font-size:9px;width:100%;margin:0 1cm;display:flex;justify-content:space-between;align-items:center;\"><span>",
    );
    if let Some(logo) = config.logo.as_deref().filter(|l| !l.is_empty()) {
        let _ = write!(
            header,
            "<img src=\"data:image/png;base64,{}\" style=\"height:18px;vertical-align:middle;margin-right:6px;\">",
            escape_attribute(logo)
        );
    }
    let _ = write!(
        header,
        "<span>{}</span></span><span>{} to {}",
        title,
        escape_text(time_range.from.as_str()),
        escape_text(time_range.to.as_str()),
    );
    if let Some(tz) = config.time_zone() {
        let _ = write!(header, " ({})", escape_text(tz));
    }
    if !dashboard.variable_values.is_empty() {
        let _ = write!(header, " | {}", escape_text(dashboard.variable_values.as_str()));
    }
    header.push_str("</span></div>");

    let footer = String::from(
        "<div style=\"font-size:9px;width:100%;text-align:center;\"><span class=\"pageNumber\"></span> / <span class=\"totalPages\"></span></div>",
    );

    PdfOptions {
        header,
        body,
        footer,
        orientation: config.orientation,
        extra_headers: Default::default(),
    }
}

/// Produce the PDF report for `request`.
///
/// The dashboard fetch is fatal on failure, panel fetches are retried per the
/// client's policy and the first exhausted panel aborts the report.
pub async fn generate_report(
    client: &GrafanaClient,
    browser: &Browser,
    config: &ReportConfig,
    request: &ReportRequest,
    deadline: &Deadline,
) -> Result<Vec<u8>> {
    let raw = client.fetch_dashboard(&request.uid, deadline).await?;
    let dashboard = build_dashboard(&raw, &request.panel_boxes, &request.variables, config)?;
    info!(
        "Generating report for dashboard '{}' ({} panels)",
        dashboard.title,
        dashboard.panels.len()
    );

    let images = fetch_panel_images(
        client,
        &dashboard,
        &request.time_range,
        config.max_render_workers,
        deadline,
    )
    .await?;

    let mut doc = compose_document(&dashboard, &images, &request.time_range, config);
    if !client.cookie().is_empty() {
        doc.extra_headers
            .insert("Cookie".to_string(), client.cookie().to_string());
    }

    let pdf = browser.render_document(&doc, deadline).await?;
    info!("Report for '{}' rendered ({} bytes)", dashboard.title, pdf.len());
    Ok(pdf)
}
