//! Per-table element filters.
//!
//! A filter sees the element tags, the key that selected the table, and
//! whether the element is closed. All filters of a chain must pass.

use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use super::values::split_tag_values;
use crate::config::ANY;
use crate::element::Tags;

/// `type` values a polygon table accepts from relations by default.
pub const DEFAULT_RELATION_TYPES: [&str; 3] = ["multipolygon", "boundary", "land_area"];

const NIL: &str = "__nil__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Pass only if the key is present and matches.
    Require,
    /// Pass unless the key is present and matches.
    Reject,
}

impl FilterMode {
    fn pass(self, matched: bool) -> bool {
        match self {
            FilterMode::Require => matched,
            FilterMode::Reject => !matched,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSet {
    /// `__any__`: the key only needs to be present.
    Present,
    One(String),
    Many(HashSet<String>),
}

impl ValueSet {
    pub fn from_values(table: &str, key: &str, values: &[String]) -> Self {
        if values.iter().any(|v| v == NIL) {
            tracing::warn!(table, key, "filter value '__nil__' is not supported");
        }
        if values.iter().any(|v| v == ANY) {
            if values.len() > 1 {
                tracing::warn!(
                    table,
                    key,
                    "filter values next to '__any__' are ignored"
                );
            }
            return ValueSet::Present;
        }
        match values {
            [value] => ValueSet::One(value.clone()),
            _ => ValueSet::Many(values.iter().cloned().collect()),
        }
    }

    fn contains(&self, value: &str) -> bool {
        match self {
            ValueSet::Present => true,
            ValueSet::One(expected) => expected == value,
            ValueSet::Many(values) => values.contains(value),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ElementFilter {
    Values {
        key: String,
        values: ValueSet,
        split: bool,
        mode: FilterMode,
    },
    Regex {
        key: String,
        regex: Regex,
        split: bool,
        mode: FilterMode,
    },
    /// Closed ways tagged as areas do not belong in a linestring table.
    AreaTags(Arc<HashSet<String>>),
    /// Linear features do not belong in a polygon table.
    LinearTags(Arc<HashSet<String>>),
    /// The relation `type` tag must be one of these.
    RelationTypes(Vec<String>),
}

impl ElementFilter {
    pub fn passes(&self, tags: &Tags, key: &str, closed: bool) -> bool {
        match self {
            ElementFilter::Values {
                key: filter_key,
                values,
                split,
                mode,
            } => {
                let matched = tags.get(filter_key).is_some_and(|value| {
                    if let ValueSet::Present = values {
                        true
                    } else if *split {
                        split_tag_values(value).into_iter().any(|v| values.contains(v))
                    } else {
                        values.contains(value)
                    }
                });
                mode.pass(matched)
            }
            ElementFilter::Regex {
                key: filter_key,
                regex,
                split,
                mode,
            } => {
                let matched = tags.get(filter_key).is_some_and(|value| {
                    if *split {
                        split_tag_values(value).into_iter().any(|v| regex.is_match(v))
                    } else {
                        regex.is_match(value)
                    }
                });
                mode.pass(matched)
            }
            ElementFilter::AreaTags(area_tags) => {
                if !closed {
                    return true;
                }
                match tags.get("area").map(String::as_str) {
                    Some("yes") => false,
                    Some("no") => true,
                    _ => !area_tags.contains(key),
                }
            }
            ElementFilter::LinearTags(linear_tags) => {
                let area = tags.get("area").map(String::as_str);
                if closed && area == Some("no") {
                    return false;
                }
                area == Some("yes") || !linear_tags.contains(key)
            }
            ElementFilter::RelationTypes(types) => tags
                .get("type")
                .is_some_and(|t| types.iter().any(|allowed| allowed == t)),
        }
    }

    pub fn default_relation_types() -> Self {
        ElementFilter::RelationTypes(DEFAULT_RELATION_TYPES.iter().map(|t| t.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::build_tag_map;

    fn values(key: &str, list: &[&str], split: bool, mode: FilterMode) -> ElementFilter {
        let list: Vec<String> = list.iter().map(|v| v.to_string()).collect();
        ElementFilter::Values {
            key: key.to_string(),
            values: ValueSet::from_values("t", key, &list),
            split,
            mode,
        }
    }

    #[test]
    fn require_needs_present_matching_key() {
        let filter = values("access", &["yes", "public"], false, FilterMode::Require);
        assert!(filter.passes(&build_tag_map([("access", "public")]), "amenity", false));
        assert!(!filter.passes(&build_tag_map([("access", "private")]), "amenity", false));
        assert!(!filter.passes(&build_tag_map([]), "amenity", false));
    }

    #[test]
    fn reject_passes_when_absent() {
        let filter = values("access", &["private"], false, FilterMode::Reject);
        assert!(filter.passes(&build_tag_map([]), "amenity", false));
        assert!(!filter.passes(&build_tag_map([("access", "private")]), "amenity", false));
    }

    #[test]
    fn any_tests_presence() {
        let filter = values("name", &["__any__"], false, FilterMode::Require);
        assert!(filter.passes(&build_tag_map([("name", "")]), "amenity", false));
        assert!(!filter.passes(&build_tag_map([]), "amenity", false));
    }

    #[test]
    fn split_values_match_any_part() {
        let tags = build_tag_map([("route", "bus;tram")]);
        assert!(values("route", &["tram"], true, FilterMode::Require).passes(&tags, "k", false));
        assert!(!values("route", &["tram"], false, FilterMode::Require).passes(&tags, "k", false));
    }

    #[test]
    fn regex_is_unanchored() {
        let filter = ElementFilter::Regex {
            key: "name".to_string(),
            regex: Regex::new("Straße").unwrap(),
            split: false,
            mode: FilterMode::Reject,
        };
        assert!(!filter.passes(&build_tag_map([("name", "Lange Straße 5")]), "k", false));
        assert!(filter.passes(&build_tag_map([("name", "Weg")]), "k", false));
    }

    #[test]
    fn area_tags_reject_closed_areas() {
        let filter = ElementFilter::AreaTags(Arc::new(["building".to_string()].into()));
        let building = build_tag_map([("building", "yes")]);
        assert!(!filter.passes(&building, "building", true));
        assert!(filter.passes(&building, "building", false));
        let explicit = build_tag_map([("building", "yes"), ("area", "no")]);
        assert!(filter.passes(&explicit, "building", true));
        let highway = build_tag_map([("highway", "pedestrian"), ("area", "yes")]);
        assert!(!filter.passes(&highway, "highway", true));
    }

    #[test]
    fn linear_tags_reject_linear_keys() {
        let filter = ElementFilter::LinearTags(Arc::new(["highway".to_string()].into()));
        assert!(!filter.passes(&build_tag_map([("highway", "primary")]), "highway", true));
        assert!(filter.passes(
            &build_tag_map([("highway", "pedestrian"), ("area", "yes")]),
            "highway",
            true
        ));
        assert!(!filter.passes(
            &build_tag_map([("landuse", "grass"), ("area", "no")]),
            "landuse",
            true
        ));
        assert!(filter.passes(&build_tag_map([("landuse", "grass")]), "landuse", true));
    }

    #[test]
    fn relation_types() {
        let filter = ElementFilter::default_relation_types();
        assert!(filter.passes(&build_tag_map([("type", "boundary")]), "k", true));
        assert!(!filter.passes(&build_tag_map([("type", "route")]), "k", true));
        assert!(!filter.passes(&build_tag_map([]), "k", true));
    }
}
