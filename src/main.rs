use anyhow::Context;
use clap::Parser;
use dashreport::{
    Browser, DashboardMode, Deadline, GrafanaClient, Layout, Orientation, QueryValues,
    ReportConfig, ReportRequest, TimeRange,
};
use std::path::PathBuf;

/// Render a Grafana dashboard into a PDF report
#[derive(Parser, Debug)]
#[command(name = "dashreport", version, about)]
struct Args {
    /// UID of the dashboard to render
    uid: String,

    /// Settings JSON in the plugin's format; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the Grafana instance
    #[arg(long)]
    url: Option<String>,

    #[arg(long, default_value = "now-1h")]
    from: String,

    #[arg(long, default_value = "now")]
    to: String,

    /// Template variable, repeatable
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Cookie header forwarded to Grafana
    #[arg(long, default_value = "")]
    cookie: String,

    #[arg(long, value_enum)]
    layout: Option<Layout>,

    #[arg(long, value_enum)]
    orientation: Option<Orientation>,

    #[arg(long, value_enum)]
    dashboard_mode: Option<DashboardMode>,

    /// Panel ID to keep (clones of the ID included), repeatable
    #[arg(long = "include-panel", value_name = "ID")]
    include_panels: Vec<String>,

    /// Panel ID to drop (clones of the ID included), repeatable
    #[arg(long = "exclude-panel", value_name = "ID")]
    exclude_panels: Vec<String>,

    /// JSON array of panel boxes measured in a browser
    #[arg(long)]
    panel_boxes: Option<PathBuf>,

    /// IANA time zone for report times, e.g. Europe/Berlin
    #[arg(long)]
    time_zone: Option<String>,

    /// Websocket URL of a running Chrome instead of launching one
    #[arg(long)]
    remote_chrome_url: Option<String>,

    #[arg(short, long, default_value = "report.pdf")]
    output: PathBuf,
}

fn parse_vars(vars: &[String]) -> anyhow::Result<QueryValues> {
    let mut out = QueryValues::new();
    for v in vars {
        let (name, value) = v
            .split_once('=')
            .with_context(|| format!("variable '{}' is not NAME=VALUE", v))?;
        let key = if name.starts_with("var-") {
            name.to_string()
        } else {
            format!("var-{}", name)
        };
        out.entry(key).or_default().push(value.to_string());
    }
    Ok(out)
}

fn load_config(args: &Args) -> anyhow::Result<ReportConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ReportConfig::from_json(&raw)?
        }
        None => ReportConfig::default(),
    };

    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(layout) = args.layout {
        config.layout = layout;
    }
    if let Some(orientation) = args.orientation {
        config.orientation = orientation;
    }
    if let Some(mode) = args.dashboard_mode {
        config.dashboard_mode = mode;
    }
    if !args.include_panels.is_empty() {
        config.include_panel_ids = args.include_panels.clone();
    }
    if !args.exclude_panels.is_empty() {
        config.exclude_panel_ids = args.exclude_panels.clone();
    }
    if args.time_zone.is_some() {
        config.time_zone = args.time_zone.clone();
    }
    if args.remote_chrome_url.is_some() {
        config.remote_chrome_url = args.remote_chrome_url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let panel_boxes = match &args.panel_boxes {
        Some(path) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&raw).context("panel boxes must be a JSON array")?
        }
        None => Vec::new(),
    };

    let request = ReportRequest {
        uid: args.uid.clone(),
        time_range: TimeRange::new(args.from.clone(), args.to.clone()),
        variables: parse_vars(&args.vars)?,
        panel_boxes,
    };

    let http = GrafanaClient::http_client(&config)?;
    let client = GrafanaClient::new(http, &config.url, args.cookie.clone(), &request.variables, config.layout)?
        .with_retry(config.retry_policy())
        .with_time_zone(config.time_zone());
    let browser = Browser::launch(&config).await?;

    let deadline = Deadline::never().with_timeout(config.render_timeout());
    let on_interrupt = deadline.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let res = dashreport::generate_report(&client, &browser, &config, &request, &deadline).await;
    browser.close().await?;
    let pdf = res?;

    std::fs::write(&args.output, &pdf)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("Wrote {} ({} bytes)", args.output.display(), pdf.len());
    Ok(())
}
