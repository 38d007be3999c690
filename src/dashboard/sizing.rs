//! Pixel dimensions for panel images

use super::{Panel, PanelType};
use crate::Layout;

/// Pixels per logical grid unit in `grid` layout
pub const GRID_UNIT_PX: f64 = 40.0;

/// Width and height, in pixels, at which `panel` is rasterized.
///
/// In `grid` layout measured browser geometry wins over the declared grid
/// position.
pub fn panel_size(panel: &Panel, layout: Layout) -> (u32, u32) {
    match layout {
        Layout::Simple => match panel.kind {
            PanelType::SingleStat => (300, 150),
            PanelType::Text => (1000, 100),
            _ => (1000, 500),
        },
        Layout::Grid => match &panel.measured {
            Some(b) => (to_px(b.width), to_px(b.height)),
            None => (
                to_px(panel.grid_pos.w * GRID_UNIT_PX),
                to_px(panel.grid_pos.h * GRID_UNIT_PX),
            ),
        },
    }
}

fn to_px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{GridPos, PanelBox};

    fn panel(kind: PanelType, grid_pos: GridPos) -> Panel {
        Panel {
            id: "44".into(),
            kind,
            title: "title".into(),
            grid_pos,
            measured: None,
        }
    }

    #[test]
    fn simple_sizes_by_type() {
        let g = GridPos::default();
        assert_eq!(panel_size(&panel(PanelType::SingleStat, g), Layout::Simple), (300, 150));
        assert_eq!(panel_size(&panel(PanelType::Text, g), Layout::Simple), (1000, 100));
        assert_eq!(panel_size(&panel(PanelType::Graph, g), Layout::Simple), (1000, 500));
        assert_eq!(panel_size(&panel(PanelType::Table, g), Layout::Simple), (1000, 500));
        assert_eq!(
            panel_size(&panel(PanelType::Other("piechart".into()), g), Layout::Simple),
            (1000, 500)
        );
    }

    #[test]
    fn simple_ignores_grid_geometry() {
        let g = GridPos { h: 6.0, w: 24.0, x: 0.0, y: 0.0 };
        assert_eq!(panel_size(&panel(PanelType::Graph, g), Layout::Simple), (1000, 500));
    }

    #[test]
    fn grid_scales_forty_pixels_per_unit() {
        let full = GridPos { h: 6.0, w: 24.0, x: 0.0, y: 0.0 };
        let half = GridPos { h: 3.0, w: 12.0, x: 0.0, y: 0.0 };
        assert_eq!(panel_size(&panel(PanelType::Graph, full), Layout::Grid), (960, 240));
        assert_eq!(panel_size(&panel(PanelType::Graph, half), Layout::Grid), (480, 120));
    }

    #[test]
    fn grid_rounds_fractional_units() {
        let g = GridPos { h: 6.5, w: 20.5, x: 0.0, y: 0.0 };
        assert_eq!(panel_size(&panel(PanelType::Text, g), Layout::Grid), (820, 260));
    }

    #[test]
    fn grid_prefers_measured_geometry() {
        let mut p = panel(PanelType::Graph, GridPos { h: 6.0, w: 24.0, x: 0.0, y: 0.0 });
        p.measured = Some(PanelBox {
            id: "44".into(),
            width: 940.4,
            height: 258.0,
            x: 0.0,
            y: 0.0,
        });
        assert_eq!(panel_size(&p, Layout::Grid), (940, 258));
    }
}
