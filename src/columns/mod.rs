//! Column types: how a single output value is computed.
//!
//! A [`ColumnRegistry`] maps type names used in the mapping document to
//! constructors. Constructors run once at compile time and produce a
//! [`ColumnFunc`] that is shared read-only by all workers.

mod builtin;

pub(crate) use builtin::geometry_value;

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ColumnConfig;
use crate::element::{Element, Member, Relation};
use crate::geometry::SourceGeometry;
use crate::mapping::Match;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Json(JsonValue),
    /// EWKB
    Geometry(Vec<u8>),
}

pub type Row = Vec<Option<ColumnValue>>;

/// Inputs of a regular column.
pub struct ValueContext<'a> {
    /// Tag value of the column's key, if the column has a key and it is set.
    pub value: Option<&'a str>,
    pub element: &'a Element,
    pub geometry: Option<&'a SourceGeometry>,
    pub matched: &'a Match,
}

/// Inputs of a member column.
pub struct MemberContext<'a> {
    pub relation: &'a Relation,
    pub member: &'a Member,
    pub index: usize,
    pub matched: &'a Match,
}

pub type ValueFn = Arc<dyn Fn(&ValueContext<'_>) -> Option<ColumnValue> + Send + Sync>;
pub type MemberValueFn = Arc<dyn Fn(&MemberContext<'_>) -> Option<ColumnValue> + Send + Sync>;

#[derive(Clone)]
pub enum ColumnFunc {
    /// Computed from tags, element, geometry, and match.
    Value(ValueFn),
    /// Computed from relation member identity alone.
    Member(MemberValueFn),
}

impl fmt::Debug for ColumnFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnFunc::Value(_) => f.write_str("ColumnFunc::Value"),
            ColumnFunc::Member(_) => f.write_str("ColumnFunc::Member"),
        }
    }
}

type Constructor = Arc<dyn Fn(&ColumnConfig) -> Result<ColumnFunc, String> + Send + Sync>;

#[derive(Clone)]
pub struct ColumnType {
    name: String,
    geometry: bool,
    constructor: Constructor,
}

impl fmt::Debug for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnType")
            .field("name", &self.name)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl ColumnType {
    /// A column type whose function depends on the column declaration
    /// (`args`, `keys`, ...). Errors become configuration errors.
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ColumnConfig) -> Result<ColumnFunc, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            geometry: false,
            constructor: Arc::new(constructor),
        }
    }

    pub fn value<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ValueContext<'_>) -> Option<ColumnValue> + Send + Sync + 'static,
    {
        let func: ValueFn = Arc::new(func);
        Self::new(name, move |_| Ok(ColumnFunc::Value(func.clone())))
    }

    pub fn member<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&MemberContext<'_>) -> Option<ColumnValue> + Send + Sync + 'static,
    {
        let func: MemberValueFn = Arc::new(func);
        Self::new(name, move |_| Ok(ColumnFunc::Member(func.clone())))
    }

    /// Mark the type as producing geometries, which enables `geometry_transform`.
    pub fn with_geometry(mut self) -> Self {
        self.geometry = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_geometry(&self) -> bool {
        self.geometry
    }

    pub fn build(&self, column: &ColumnConfig) -> Result<ColumnFunc, String> {
        (self.constructor)(column)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    types: HashMap<String, ColumnType>,
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ColumnRegistry {
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        builtin::register_all(&mut registry);
        registry
    }

    /// Add or replace a column type, returning the previous one.
    pub fn register(&mut self, column_type: ColumnType) -> Option<ColumnType> {
        self.types.insert(column_type.name.clone(), column_type)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnType> {
        self.types.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
