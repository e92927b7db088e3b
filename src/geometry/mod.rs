//! Geometry values and the optional per-column geometry transforms.

mod engine;
mod polylabel;
mod pool;
mod transform;

pub use engine::GeometryEngine;
pub use pool::{EngineGuard, EnginePool};
pub use transform::{GeometryTransform, make_transform_func};

use geo_types::Geometry;
use geozero::{CoordDimensions, ToWkb};

use crate::error::TransformError;

/// An element geometry as built by the geometry collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGeometry {
    pub geometry: Geometry<f64>,
    pub srid: Option<i32>,
}

impl SourceGeometry {
    pub fn new(geometry: Geometry<f64>, srid: Option<i32>) -> Self {
        Self { geometry, srid }
    }

    pub fn to_ewkb(&self) -> Result<Vec<u8>, TransformError> {
        encode_ewkb(&self.geometry, self.srid)
    }
}

pub(crate) fn encode_ewkb(
    geometry: &Geometry<f64>,
    srid: Option<i32>,
) -> Result<Vec<u8>, TransformError> {
    Ok(geometry.to_ewkb(CoordDimensions::xy(), srid)?)
}

/// Hex rendering used when rows are written as text.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn ewkb_carries_srid() {
        let source = SourceGeometry::new(Geometry::Point(Point::new(1.0, 2.0)), Some(3857));
        let plain = encode_ewkb(&source.geometry, None).unwrap();
        let with_srid = source.to_ewkb().unwrap();
        // 4 extra bytes for the SRID
        assert_eq!(with_srid.len(), plain.len() + 4);
    }

    #[test]
    fn hex_is_uppercase() {
        assert_eq!(to_hex(&[0x01, 0xab, 0x00]), "01AB00");
    }
}
