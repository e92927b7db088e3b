//! Error types for mapping compilation and geometry transforms.
//!
//! - [`MappingError`] - fatal, raised while loading or compiling a mapping
//! - [`TransformError`] - non-fatal, raised by a geometry transform and
//!   downgraded to a pass-through of the source geometry

use thiserror::Error;

/// Errors raised while loading or compiling a mapping document.
///
/// Any of these aborts compilation; no partial mapping is produced.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Failed to read the mapping file.
    #[error("Failed to read mapping: {0}")]
    Io(#[from] std::io::Error),

    /// The mapping document is not valid YAML or does not fit the model.
    #[error("Invalid mapping document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing type for table {table}")]
    MissingTableType { table: String },

    #[error("table with type:geometry requires type_mappings for table {table}")]
    GeometryTableWithMapping { table: String },

    #[error("unhandled column type {column_type} for column {column} in table {table}")]
    UnknownColumnType {
        table: String,
        column: String,
        column_type: String,
    },

    #[error("unknown geometry_transform {transform:?} for column {column} in table {table}")]
    UnknownGeometryTransform {
        table: String,
        column: String,
        transform: String,
    },

    #[error("invalid column arguments for column {column} in table {table}: {message}")]
    InvalidColumnArgs {
        table: String,
        column: String,
        message: String,
    },

    #[error("invalid filter regexp for key {key} in table {table}: {source}")]
    InvalidFilterRegex {
        table: String,
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid tags.include_regex pattern {pattern:?}: {source}")]
    InvalidIncludeRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors from a single geometry transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid geometry bounds")]
    InvalidBounds,

    #[error("geometry transform {0} failed")]
    NoResult(&'static str),

    #[error("maximum inscribed circle requires a polygonal geometry")]
    NotPolygonal,

    #[error("failed to encode geometry: {0}")]
    Encode(#[from] geozero::error::GeozeroError),
}
