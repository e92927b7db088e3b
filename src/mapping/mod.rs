//! Tag mapping: classification of elements into destination tables.
//!
//! A [`Mapping`] is compiled once from a [`MappingConfig`] and then shared
//! read-only by all workers. It hands out one [`TagMatcher`] per element
//! class and one [`TagFilter`] per element type.

mod compiler;
mod filters;
mod matcher;
mod row;
mod tag_filter;
mod values;

pub use filters::{DEFAULT_RELATION_TYPES, ElementFilter, FilterMode, ValueSet};
pub use matcher::{DestTable, Match, TagMatcher};
pub use row::{RowBuilder, ValueBuilder};
pub use tag_filter::{ExcludeFilter, MappingTagFilter, TagFilter, TagFilterer};
pub use values::{mapping_value_matches, split_tag_values};

use crate::config::MappingConfig;

/// The geometric role an element is classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementClass {
    Point,
    LineString,
    Polygon,
    Relation,
    RelationMember,
}

impl ElementClass {
    pub const ALL: [ElementClass; 5] = [
        ElementClass::Point,
        ElementClass::LineString,
        ElementClass::Polygon,
        ElementClass::Relation,
        ElementClass::RelationMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementClass::Point => "point",
            ElementClass::LineString => "linestring",
            ElementClass::Polygon => "polygon",
            ElementClass::Relation => "relation",
            ElementClass::RelationMember => "relation_member",
        }
    }
}

/// A compiled mapping document.
#[derive(Debug, Clone)]
pub struct Mapping {
    config: MappingConfig,
    point: TagMatcher,
    line_string: TagMatcher,
    polygon: TagMatcher,
    relation: TagMatcher,
    relation_member: TagMatcher,
    node_filter: TagFilter,
    way_filter: TagFilter,
    relation_filter: TagFilter,
}

impl Mapping {
    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn matcher(&self, class: ElementClass) -> &TagMatcher {
        match class {
            ElementClass::Point => &self.point,
            ElementClass::LineString => &self.line_string,
            ElementClass::Polygon => &self.polygon,
            ElementClass::Relation => &self.relation,
            ElementClass::RelationMember => &self.relation_member,
        }
    }

    pub fn point_matcher(&self) -> &TagMatcher {
        &self.point
    }

    pub fn line_string_matcher(&self) -> &TagMatcher {
        &self.line_string
    }

    /// Matches closed ways and multipolygon-like relations.
    pub fn polygon_matcher(&self) -> &TagMatcher {
        &self.polygon
    }

    pub fn relation_matcher(&self) -> &TagMatcher {
        &self.relation
    }

    pub fn relation_member_matcher(&self) -> &TagMatcher {
        &self.relation_member
    }

    pub fn node_tag_filter(&self) -> &TagFilter {
        &self.node_filter
    }

    pub fn way_tag_filter(&self) -> &TagFilter {
        &self.way_filter
    }

    pub fn relation_tag_filter(&self) -> &TagFilter {
        &self.relation_filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, Way, build_tag_map};

    fn mapping(yaml: &str) -> Mapping {
        Mapping::compile(MappingConfig::from_yaml_str(yaml).unwrap()).unwrap()
    }

    fn way(tags: &[(&str, &str)], closed: bool) -> Way {
        Way {
            element: Element::new(1, build_tag_map(tags.iter().copied())),
            refs: if closed { vec![1, 2, 3, 1] } else { vec![1, 2, 3] },
        }
    }

    fn tables(matches: &[Match]) -> Vec<String> {
        matches.iter().map(|m| m.table.to_string()).collect()
    }

    #[test]
    fn sub_mappings_are_separate_destinations() {
        let mapping = mapping(
            r#"
tables:
  landusages:
    type: polygon
    mappings:
      green:
        mapping: {leisure: [park]}
      built:
        mapping: {landuse: [residential]}
"#,
        );
        let matches = mapping
            .polygon_matcher()
            .match_way(&way(&[("leisure", "park"), ("landuse", "residential")], true));
        assert_eq!(tables(&matches), vec!["landusages:green", "landusages:built"]);
    }

    #[test]
    fn type_mappings_apply_per_class() {
        let mapping = mapping(
            r#"
tables:
  features:
    type: geometry
    type_mappings:
      points: {amenity: [__any__]}
      linestrings: {highway: [__any__]}
      any: {name: [__any__]}
"#,
        );
        let tags = build_tag_map([("amenity", "cafe"), ("highway", "path")]);
        let point = mapping.point_matcher().match_tags(&tags, false, false);
        assert_eq!(point.len(), 1);
        assert_eq!(point[0].key, "amenity");

        let line = mapping.line_string_matcher().match_tags(&tags, false, false);
        assert_eq!(line[0].key, "highway");

        let named = build_tag_map([("name", "x")]);
        assert_eq!(mapping.relation_matcher().match_tags(&named, true, true).len(), 1);
    }

    #[test]
    fn point_or_polygon_tables_join_both_classes() {
        let mapping = mapping(
            r#"
tables:
  shops:
    type: point_or_polygon
    mapping: {shop: [__any__]}
"#,
        );
        assert!(!mapping.point_matcher().is_empty());
        assert!(!mapping.polygon_matcher().is_empty());
        assert!(mapping.line_string_matcher().is_empty());
        assert!(mapping.relation_matcher().is_empty());
    }
}
