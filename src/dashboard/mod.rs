//! Dashboard model: panels, geometry and the builder that reconciles the
//! declared layout with geometry measured in a live browser session.

pub mod filter;
pub mod sizing;

pub use filter::{filter_panels, id_matches};
pub use sizing::panel_size;

use crate::{DashboardMode, QueryValues, ReportConfig, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashSet;

/// Panel type tag from the dashboard JSON
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PanelType {
    SingleStat,
    Text,
    Graph,
    Table,
    /// Structural divider, never rendered
    Row,
    Other(String),
}

impl From<String> for PanelType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "singlestat" => PanelType::SingleStat,
            "text" => PanelType::Text,
            "graph" => PanelType::Graph,
            "table" => PanelType::Table,
            "row" => PanelType::Row,
            _ => PanelType::Other(s),
        }
    }
}

impl Default for PanelType {
    fn default() -> Self {
        PanelType::Other(String::new())
    }
}

impl PanelType {
    pub fn as_str(&self) -> &str {
        match self {
            PanelType::SingleStat => "singlestat",
            PanelType::Text => "text",
            PanelType::Graph => "graph",
            PanelType::Table => "table",
            PanelType::Row => "row",
            PanelType::Other(s) => s,
        }
    }
}

/// Declared grid geometry in logical units
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridPos {
    #[serde(alias = "H")]
    pub h: f64,
    #[serde(alias = "W")]
    pub w: f64,
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Y")]
    pub y: f64,
}

/// Pixel bounding box of a panel measured in a browser
#[derive(Debug, Clone, PartialEq)]
pub struct PanelBox {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
}

impl PanelBox {
    /// Decode one geometry record captured by the host. Records carrying CSS
    /// strings instead of numbers (`"940px"`) are rejected.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let raw = RawPanelBox::deserialize(value)?;
        Ok(Self {
            id: raw.id.into_string(),
            width: raw.width,
            height: raw.height,
            x: raw.x,
            y: raw.y,
        })
    }
}

/// A single panel of the report
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub id: String,
    pub kind: PanelType,
    pub title: String,
    pub grid_pos: GridPos,
    /// Browser-measured geometry, when the host captured it
    pub measured: Option<PanelBox>,
}

impl Panel {
    pub fn new(id: impl Into<String>, kind: PanelType) -> Self {
        Self {
            id: id.into(),
            kind,
            title: String::new(),
            grid_pos: GridPos::default(),
            measured: None,
        }
    }

    pub fn is_row(&self) -> bool {
        self.kind == PanelType::Row
    }
}

/// Dashboard metadata and the ordered, filtered panel list
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub title: String,
    pub slug: String,
    pub panels: Vec<Panel>,
    /// All template variable values, comma separated
    pub variable_values: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PanelId {
    Number(serde_json::Number),
    Text(String),
}

impl PanelId {
    fn into_string(self) -> String {
        match self {
            PanelId::Number(n) => n.to_string(),
            PanelId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPanelBox {
    id: PanelId,
    width: f64,
    height: f64,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    dashboard: RawDashboard,
    #[serde(default, alias = "Meta")]
    meta: RawMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDashboard {
    title: Option<String>,
    panels: Vec<RawPanel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMeta {
    #[serde(alias = "Slug")]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPanel {
    #[serde(default)]
    id: Option<PanelId>,
    #[serde(default, rename = "type")]
    kind: Option<PanelType>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "gridPos")]
    grid_pos: Option<GridPos>,
    #[serde(default)]
    collapsed: bool,
    #[serde(default)]
    panels: Vec<RawPanel>,
}

impl RawPanel {
    fn declared_id(&self) -> Option<String> {
        match &self.id {
            Some(PanelId::Number(n)) => Some(n.to_string()),
            Some(PanelId::Text(s)) => Some(s.clone()),
            None => None,
        }
    }

    fn to_panel(&self, id: String) -> Panel {
        Panel {
            id,
            kind: self.kind.clone().unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            grid_pos: self.grid_pos.unwrap_or_default(),
            measured: None,
        }
    }
}

/// Hands out numeric IDs for panels that declare none, skipping every ID
/// declared anywhere in the dashboard.
struct IdAllocator {
    taken: HashSet<String>,
    next: usize,
}

impl IdAllocator {
    fn new(raw: &[RawPanel]) -> Self {
        let taken = raw
            .iter()
            .flat_map(|p| std::iter::once(p).chain(p.panels.iter()))
            .filter_map(RawPanel::declared_id)
            .collect();
        Self { taken, next: 0 }
    }

    fn id_for(&mut self, panel: &RawPanel) -> String {
        if let Some(id) = panel.declared_id() {
            return id;
        }
        loop {
            let candidate = self.next.to_string();
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Flatten the JSON panel list in source order. Children of collapsed rows
/// are only expanded in `Full` mode.
///
/// IDs are assigned over the whole tree whatever the mode, so a panel keeps
/// the same ID in both modes.
fn declared_panels(raw: &[RawPanel], mode: DashboardMode) -> Vec<Panel> {
    let mut ids = IdAllocator::new(raw);
    let mut out = Vec::with_capacity(raw.len());
    for p in raw {
        out.push(p.to_panel(ids.id_for(p)));
        for child in &p.panels {
            let child_panel = child.to_panel(ids.id_for(child));
            if mode == DashboardMode::Full && p.collapsed {
                out.push(child_panel);
            }
        }
    }
    out
}

fn measured_boxes(values: &[serde_json::Value]) -> Option<Vec<PanelBox>> {
    if values.is_empty() {
        return None;
    }
    match values.iter().map(PanelBox::from_value).collect::<Result<Vec<_>>>() {
        Ok(boxes) => Some(boxes),
        Err(e) => {
            warn!("Ignoring unusable measured panel geometry: {}", e);
            None
        }
    }
}

fn variable_values(variables: &QueryValues) -> String {
    variables
        .iter()
        .filter(|(k, _)| k.starts_with("var-"))
        .flat_map(|(_, vs)| vs.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the report's dashboard model.
///
/// When `measured` holds usable geometry the panel set is the measured list,
/// in measured order, enriched with type and title from the JSON panel of the
/// same ID. Otherwise it is the JSON panel list without rows. Include and
/// exclude filters from `config` are applied last.
pub fn build_dashboard(
    raw_json: &[u8],
    measured: &[serde_json::Value],
    variables: &QueryValues,
    config: &ReportConfig,
) -> Result<Dashboard> {
    let doc: RawDocument = serde_json::from_slice(raw_json)?;

    let declared = declared_panels(&doc.dashboard.panels, config.dashboard_mode);

    let panels = match measured_boxes(measured) {
        Some(boxes) => {
            // Boxes may belong to children of collapsed rows
            let all = declared_panels(&doc.dashboard.panels, DashboardMode::Full);
            boxes
                .into_iter()
                .map(|b| {
                    let mut panel = all
                        .iter()
                        .find(|p| p.id == b.id)
                        .cloned()
                        .unwrap_or_else(|| Panel::new(b.id.clone(), PanelType::default()));
                    panel.measured = Some(b);
                    panel
                })
                .collect::<Vec<_>>()
        }
        None => declared.into_iter().filter(|p| !p.is_row()).collect(),
    };

    let panels = filter_panels(panels, &config.include_panel_ids, &config.exclude_panel_ids);
    debug!("Dashboard model has {} panels", panels.len());

    Ok(Dashboard {
        title: doc.dashboard.title.unwrap_or_default(),
        slug: doc.meta.slug.unwrap_or_default(),
        panels,
        variable_values: variable_values(variables),
    })
}
