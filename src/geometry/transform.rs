use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::EnginePool;
use crate::columns::{ColumnValue, ValueContext, ValueFn, geometry_value};

/// Point derived from an element geometry in place of the geometry itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryTransform {
    Centroid,
    /// Midpoint of the bounding box.
    Center,
    PointOnSurface,
    /// Center of the maximum inscribed circle.
    PoleOfInaccessibility,
}

impl GeometryTransform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GeometryTransform::Centroid => "centroid",
            GeometryTransform::Center => "center",
            GeometryTransform::PointOnSurface => "point_on_surface",
            GeometryTransform::PoleOfInaccessibility => "pole_of_inaccessibility",
        }
    }

    /// Like `parse`, but an empty name or `none` means no transform.
    pub fn parse_optional(name: &str) -> Result<Option<Self>, String> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        name.parse().map(Some)
    }
}

impl fmt::Display for GeometryTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "centroid" => Ok(GeometryTransform::Centroid),
            "center" => Ok(GeometryTransform::Center),
            "point_on_surface" | "pointonsurface" => Ok(GeometryTransform::PointOnSurface),
            "pole_of_inaccessibility" | "maximum_inscribed_circle" => {
                Ok(GeometryTransform::PoleOfInaccessibility)
            }
            other => Err(format!("unknown geometry transform '{other}'")),
        }
    }
}

/// Wrap a geometry column so that it stores `transform` of the element
/// geometry. Engines are borrowed from `pool` for the duration of one call;
/// on failure the untransformed geometry is stored.
pub fn make_transform_func(transform: GeometryTransform, pool: Arc<EnginePool>) -> ValueFn {
    Arc::new(move |ctx: &ValueContext<'_>| -> Option<ColumnValue> {
        let source = ctx.geometry?;
        let result = pool.checkout().transform(source, transform);
        match result {
            Ok(bytes) => Some(ColumnValue::Geometry(bytes)),
            Err(err) => {
                tracing::warn!(
                    transform = %transform,
                    id = ctx.element.id,
                    table = %ctx.matched.table.name,
                    error = %err,
                    "geometry transform failed, keeping original geometry"
                );
                geometry_value(source)
            }
        }
    })
}
