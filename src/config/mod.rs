//! Mapping document model.
//!
//! Maps are `IndexMap`s so that tables, keys, and values keep the order in
//! which they were declared; the compiler derives tie-break order from it.

mod runtime;

pub use runtime::RuntimeConfig;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MappingError;

/// Wildcard sentinel usable as mapping key, mapping value, or multi-value key.
pub const ANY: &str = "__any__";

/// Tag key to accepted values, in declaration order.
pub type KeyValues = IndexMap<String, Vec<String>>;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub tables: IndexMap<String, TableConfig>,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub areas: AreasConfig,
}

impl MappingConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, MappingError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Point,
    #[serde(rename = "linestring")]
    LineString,
    Polygon,
    Geometry,
    PointOrPolygon,
    Relation,
    RelationMember,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Point => "point",
            TableType::LineString => "linestring",
            TableType::Polygon => "polygon",
            TableType::Geometry => "geometry",
            TableType::PointOrPolygon => "point_or_polygon",
            TableType::Relation => "relation",
            TableType::RelationMember => "relation_member",
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(rename = "type", default)]
    pub table_type: Option<TableType>,
    #[serde(default)]
    pub mapping: Option<KeyValues>,
    #[serde(default)]
    pub mappings: Option<IndexMap<String, SubMapping>>,
    #[serde(default)]
    pub type_mappings: TypeMappings,
    /// `fields` is the deprecated spelling.
    #[serde(default, alias = "fields")]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub filters: Option<FiltersConfig>,
    #[serde(default)]
    pub relation_types: Option<Vec<String>>,
    /// Keys whose `;` separated values may each produce a row.
    #[serde(default)]
    pub multi_values: Vec<String>,
    /// Keys whose `;` separated values are split for matching and filtering
    /// only; the first declared sub-value wins.
    #[serde(default)]
    pub split_values: Vec<String>,
    #[serde(rename = "_comment", default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct SubMapping {
    pub mapping: KeyValues,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TypeMappings {
    #[serde(default)]
    pub points: TypeMapping,
    #[serde(default)]
    pub linestrings: TypeMapping,
    #[serde(default)]
    pub polygons: TypeMapping,
    #[serde(default)]
    pub any: TypeMapping,
}

/// Either `{mapping: ..., mappings: ...}` or a bare key/values map.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(from = "RawTypeMapping")]
pub struct TypeMapping {
    pub mapping: Option<KeyValues>,
    pub mappings: IndexMap<String, SubMapping>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTypeMapping {
    Full(FullTypeMapping),
    Plain(KeyValues),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FullTypeMapping {
    #[serde(default)]
    mapping: Option<KeyValues>,
    #[serde(default)]
    mappings: IndexMap<String, SubMapping>,
}

impl From<RawTypeMapping> for TypeMapping {
    fn from(raw: RawTypeMapping) -> Self {
        match raw {
            RawTypeMapping::Full(full) => TypeMapping {
                mapping: full.mapping,
                mappings: full.mappings,
            },
            RawTypeMapping::Plain(mapping) => TypeMapping {
                mapping: Some(mapping),
                mappings: IndexMap::new(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub args: IndexMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub geometry_transform: Option<String>,
    #[serde(default)]
    pub from_member: bool,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FiltersConfig {
    /// Deprecated `[[key, value], ...]` form of `reject`.
    #[serde(default)]
    pub exclude_tags: Option<Vec<(String, String)>>,
    #[serde(default)]
    pub require: KeyValues,
    #[serde(default)]
    pub reject: KeyValues,
    #[serde(default)]
    pub require_regexp: IndexMap<String, String>,
    #[serde(default)]
    pub reject_regexp: IndexMap<String, String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct TagsConfig {
    #[serde(default)]
    pub load_all: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub include_regex: Vec<String>,
}

/// `None` and an empty list differ: only configured lists add implicit filters.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct AreasConfig {
    #[serde(default)]
    pub area_tags: Option<Vec<String>>,
    #[serde(default)]
    pub linear_tags: Option<Vec<String>>,
}
