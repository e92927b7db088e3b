use geo::{Centroid, CoordsIter, InteriorPoint};
use geo_types::{Geometry, Point};

use super::polylabel::{CellQueue, pole_of_inaccessibility};
use super::{SourceGeometry, encode_ewkb};
use super::transform::GeometryTransform;
use crate::error::TransformError;

/// A reusable geometry context.
///
/// Engines carry per-call state (the SRID of the geometry being processed and
/// the cell queue of the inscribed-circle search) and are therefore never
/// shared between threads; borrow one from an [`EnginePool`](super::EnginePool).
#[derive(Debug, Default)]
pub struct GeometryEngine {
    serial: usize,
    srid: Option<i32>,
    cells: CellQueue,
}

impl GeometryEngine {
    pub fn new(serial: usize) -> Self {
        Self {
            serial,
            srid: None,
            cells: CellQueue::default(),
        }
    }

    /// Identifies the engine within its pool.
    pub fn serial(&self) -> usize {
        self.serial
    }

    pub fn set_srid(&mut self, srid: Option<i32>) {
        self.srid = srid;
    }

    pub fn srid(&self) -> Option<i32> {
        self.srid
    }

    /// Apply `transform` to `source`, returning the EWKB of the resulting point.
    pub fn transform(
        &mut self,
        source: &SourceGeometry,
        transform: GeometryTransform,
    ) -> Result<Vec<u8>, TransformError> {
        self.set_srid(source.srid);
        let point = match transform {
            GeometryTransform::Centroid => self.centroid(&source.geometry)?,
            GeometryTransform::Center => self.center(&source.geometry)?,
            GeometryTransform::PointOnSurface => self.point_on_surface(&source.geometry)?,
            GeometryTransform::PoleOfInaccessibility => {
                self.pole_of_inaccessibility(&source.geometry, 0.0)?
            }
        };
        encode_ewkb(&Geometry::Point(point), self.srid)
    }

    pub fn centroid(&self, geometry: &Geometry<f64>) -> Result<Point<f64>, TransformError> {
        geometry
            .centroid()
            .ok_or(TransformError::NoResult(GeometryTransform::Centroid.as_str()))
    }

    /// Midpoint of the bounding box.
    pub fn center(&self, geometry: &Geometry<f64>) -> Result<Point<f64>, TransformError> {
        let (min_x, min_y, max_x, max_y) = geometry.coords_iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), c| {
                (min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y))
            },
        );
        if min_x > max_x || min_y > max_y {
            return Err(TransformError::InvalidBounds);
        }
        Ok(Point::new(
            min_x + (max_x - min_x) / 2.0,
            min_y + (max_y - min_y) / 2.0,
        ))
    }

    pub fn point_on_surface(&self, geometry: &Geometry<f64>) -> Result<Point<f64>, TransformError> {
        geometry
            .interior_point()
            .ok_or(TransformError::NoResult(GeometryTransform::PointOnSurface.as_str()))
    }

    /// Center of the maximum inscribed circle.
    pub fn pole_of_inaccessibility(
        &mut self,
        geometry: &Geometry<f64>,
        tolerance: f64,
    ) -> Result<Point<f64>, TransformError> {
        pole_of_inaccessibility(&mut self.cells, geometry, tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{MultiPolygon, polygon};

    fn square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ])
    }

    fn l_shape() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn centroid_and_center_of_square() {
        let engine = GeometryEngine::new(0);
        assert_eq!(engine.centroid(&square()).unwrap(), Point::new(1.0, 1.0));
        assert_eq!(engine.center(&square()).unwrap(), Point::new(1.0, 1.0));
    }

    #[test]
    fn center_fails_on_empty_geometry() {
        let engine = GeometryEngine::new(0);
        let empty = Geometry::MultiPolygon(MultiPolygon::<f64>(vec![]));
        assert!(matches!(
            engine.center(&empty),
            Err(TransformError::InvalidBounds)
        ));
    }

    #[test]
    fn point_on_surface_lies_inside_concave_shape() {
        use geo::Contains;

        let engine = GeometryEngine::new(0);
        let shape = l_shape();
        let point = engine.point_on_surface(&shape).unwrap();
        let Geometry::Polygon(polygon) = &shape else {
            unreachable!()
        };
        assert!(polygon.contains(&point) || polygon.exterior().contains(&point));
    }

    #[test]
    fn transform_sets_srid_from_source() {
        let mut engine = GeometryEngine::new(0);
        let source = SourceGeometry::new(square(), Some(3857));
        let ewkb = engine.transform(&source, GeometryTransform::Centroid).unwrap();
        assert_eq!(engine.srid(), Some(3857));
        let expected = encode_ewkb(&Geometry::Point(Point::new(1.0, 1.0)), Some(3857)).unwrap();
        assert_eq!(ewkb, expected);
    }
}
