//! Rule evaluation for importing OSM elements into relational tables.
//!
//! A YAML mapping document ([`config::MappingConfig`]) is compiled into a
//! [`mapping::Mapping`], which classifies nodes, ways, and relations by their
//! tags and builds the column values for every destination table they match.

pub mod columns;
pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod mapping;
pub mod utils;

pub use error::{MappingError, TransformError};
pub use mapping::Mapping;
