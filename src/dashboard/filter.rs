//! Include/exclude filtering over panel IDs.
//!
//! Repeated panels are cloned with IDs such as `panel-1-clone-0`, so a filter
//! key matches a panel when it equals the ID or is the ID's base followed by
//! the `-` separator. `panel-1` therefore selects every clone of `panel-1`
//! but not `panel-15`.

use super::Panel;
use std::collections::HashSet;

const SEPARATOR: char = '-';

/// Whether `key` selects the panel with ID `id`
pub fn id_matches(id: &str, key: &str) -> bool {
    match id.strip_prefix(key) {
        Some("") => true,
        Some(rest) => !key.is_empty() && rest.starts_with(SEPARATOR),
        None => false,
    }
}

fn matches_any(id: &str, keys: &[String]) -> bool {
    keys.iter().any(|k| id_matches(id, k))
}

/// Apply include/exclude keys to `panels`, keeping their relative order.
///
/// With both lists set the result is everything not excluded plus everything
/// included, so an ID named in both lists is kept.
pub fn filter_panels(panels: Vec<Panel>, include: &[String], exclude: &[String]) -> Vec<Panel> {
    match (include.is_empty(), exclude.is_empty()) {
        (true, true) => panels,
        (false, true) => panels
            .into_iter()
            .filter(|p| matches_any(&p.id, include))
            .collect(),
        (true, false) => panels
            .into_iter()
            .filter(|p| !matches_any(&p.id, exclude))
            .collect(),
        (false, false) => {
            let mut seen = HashSet::new();
            panels
                .into_iter()
                .filter(|p| !matches_any(&p.id, exclude) || matches_any(&p.id, include))
                .filter(|p| seen.insert(p.id.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::PanelType;

    fn panels(ids: &[&str]) -> Vec<Panel> {
        ids.iter().map(|id| Panel::new(*id, PanelType::Graph)).collect()
    }

    fn keys(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn ids(panels: &[Panel]) -> Vec<&str> {
        panels.iter().map(|p| p.id.as_str()).collect()
    }

    const NUMERIC: &[&str] = &["1", "2", "3", "4", "15", "26", "37"];
    const CLONED: &[&str] = &[
        "panel-1-clone-0",
        "panel-1-clone-1",
        "panel-3",
        "panel-4",
        "panel-5",
        "panel-6",
        "panel-7",
    ];

    #[test]
    fn id_matching_respects_separator() {
        assert!(id_matches("panel-1", "panel-1"));
        assert!(id_matches("panel-1-clone-0", "panel-1"));
        assert!(!id_matches("panel-15", "panel-1"));
        assert!(!id_matches("15", "1"));
        assert!(!id_matches("panel-1", "panel-1-clone-0"));
        assert!(!id_matches("panel-1", ""));
    }

    #[test]
    fn no_keys_passes_everything() {
        let out = filter_panels(panels(NUMERIC), &[], &[]);
        assert_eq!(ids(&out), NUMERIC);
    }

    #[test]
    fn include_numeric() {
        let out = filter_panels(panels(NUMERIC), &keys(&["1", "4", "3"]), &[]);
        assert_eq!(ids(&out), vec!["1", "3", "4"]);
    }

    #[test]
    fn exclude_numeric() {
        let out = filter_panels(panels(NUMERIC), &[], &keys(&["2", "4", "3"]));
        assert_eq!(ids(&out), vec!["1", "15", "26", "37"]);
    }

    #[test]
    fn include_and_exclude_numeric() {
        let out = filter_panels(
            panels(NUMERIC),
            &keys(&["1", "4", "6"]),
            &keys(&["2", "4", "3"]),
        );
        assert_eq!(ids(&out), vec!["1", "4", "15", "26", "37"]);
    }

    #[test]
    fn include_cloned() {
        let out = filter_panels(
            panels(CLONED),
            &keys(&["panel-1", "panel-4", "panel-6"]),
            &[],
        );
        assert_eq!(
            ids(&out),
            vec!["panel-1-clone-0", "panel-1-clone-1", "panel-4", "panel-6"]
        );
    }

    #[test]
    fn exclude_cloned() {
        let out = filter_panels(
            panels(CLONED),
            &[],
            &keys(&["panel-1", "panel-4", "panel-3"]),
        );
        assert_eq!(ids(&out), vec!["panel-5", "panel-6", "panel-7"]);
    }

    #[test]
    fn include_and_exclude_cloned() {
        let out = filter_panels(
            panels(CLONED),
            &keys(&["panel-1", "panel-4", "panel-6"]),
            &keys(&["panel-2", "panel-4", "panel-3"]),
        );
        assert_eq!(
            ids(&out),
            vec![
                "panel-1-clone-0",
                "panel-1-clone-1",
                "panel-4",
                "panel-5",
                "panel-6",
                "panel-7"
            ]
        );
    }

    #[test]
    fn combined_filter_collapses_duplicates() {
        let out = filter_panels(panels(&["1", "2", "1", "3"]), &keys(&["1"]), &keys(&["3"]));
        assert_eq!(ids(&out), vec!["1", "2"]);
    }
}
