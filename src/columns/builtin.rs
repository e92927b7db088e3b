//! Built-in column types.

use geo::{Area, Validation};
use geo_types::Geometry;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

use super::{ColumnFunc, ColumnRegistry, ColumnType, ColumnValue, ValueContext};
use crate::config::ColumnConfig;
use crate::geometry::SourceGeometry;

const WEB_MERCATOR_POLE: f64 = 6378137.0 * std::f64::consts::PI;

pub(super) fn register_all(registry: &mut ColumnRegistry) {
    registry.register(ColumnType::value("id", |ctx| {
        Some(ColumnValue::Integer(ctx.element.id))
    }));
    registry.register(ColumnType::value("string", |ctx| {
        ctx.value
            .filter(|v| !v.is_empty())
            .map(|v| ColumnValue::String(v.to_string()))
    }));
    registry.register(ColumnType::value("bool", |ctx| {
        Some(ColumnValue::Bool(truthy(ctx.value)))
    }));
    registry.register(ColumnType::value("boolint", |ctx| {
        Some(ColumnValue::Integer(truthy(ctx.value) as i64))
    }));
    registry.register(ColumnType::value("integer", |ctx| {
        ctx.value?.trim().parse::<i64>().ok().map(ColumnValue::Integer)
    }));
    registry.register(ColumnType::value("direction", |ctx| {
        let direction = match ctx.value {
            Some("1" | "yes" | "true") => 1,
            Some("-1") => -1,
            _ => 0,
        };
        Some(ColumnValue::Integer(direction))
    }));
    registry.register(ColumnType::value("mapping_key", |ctx| {
        Some(ColumnValue::String(ctx.matched.key.clone()))
    }));
    registry.register(ColumnType::value("mapping_value", |ctx| {
        Some(ColumnValue::String(ctx.matched.value.clone()))
    }));
    registry.register(ColumnType::value("geometry", |ctx| geometry_value(ctx.geometry?)).with_geometry());
    registry.register(
        ColumnType::value("validated_geometry", |ctx| {
            let source = ctx.geometry?;
            if !source.geometry.is_valid() {
                tracing::warn!(
                    table = %ctx.matched.table.name,
                    id = ctx.element.id,
                    "dropping invalid geometry"
                );
                return None;
            }
            geometry_value(source)
        })
        .with_geometry(),
    );
    registry.register(ColumnType::new("hstore_tags", make_hstore_tags));
    registry.register(ColumnType::value("area", |ctx| {
        polygon_area(&ctx.geometry?.geometry).map(ColumnValue::Float)
    }));
    registry.register(ColumnType::value("webmerc_area", |ctx| {
        webmerc_area(&ctx.geometry?.geometry).map(ColumnValue::Float)
    }));
    registry.register(ColumnType::new("enumerate", make_enumerate));
    registry.register(ColumnType::new("categorize", make_categorize));
    registry.register(ColumnType::new("string_suffixreplace", make_suffix_replace));

    registry.register(ColumnType::member("member_id", |ctx| {
        Some(ColumnValue::Integer(ctx.member.id))
    }));
    registry.register(ColumnType::member("member_role", |ctx| {
        Some(ColumnValue::String(ctx.member.role.clone()))
    }));
    registry.register(ColumnType::member("member_type", |ctx| {
        Some(ColumnValue::Integer(ctx.member.member_type.code()))
    }));
    registry.register(ColumnType::member("member_index", |ctx| {
        Some(ColumnValue::Integer(ctx.index as i64))
    }));
}

/// EWKB of `source`; encoding failures are logged and stored as null.
pub(crate) fn geometry_value(source: &SourceGeometry) -> Option<ColumnValue> {
    match source.to_ewkb() {
        Ok(bytes) => Some(ColumnValue::Geometry(bytes)),
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode geometry");
            None
        }
    }
}

fn truthy(value: Option<&str>) -> bool {
    !matches!(value, None | Some("" | "0" | "false" | "no"))
}

fn arg<T: DeserializeOwned>(column: &ColumnConfig, name: &str) -> Result<Option<T>, String> {
    column
        .args
        .get(name)
        .map(|value| {
            serde_yaml::from_value(value.clone()).map_err(|e| format!("args.{name}: {e}"))
        })
        .transpose()
}

fn make_hstore_tags(column: &ColumnConfig) -> Result<ColumnFunc, String> {
    let include: Option<Vec<String>> = arg(column, "include")?;
    Ok(ColumnFunc::Value(Arc::new(move |ctx: &ValueContext<'_>| {
        let tags: Map<String, JsonValue> = match &include {
            Some(keys) => keys
                .iter()
                .filter_map(|k| {
                    ctx.element
                        .tags
                        .get(k)
                        .map(|v| (k.clone(), JsonValue::String(v.clone())))
                })
                .collect(),
            None => ctx
                .element
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        };
        Some(ColumnValue::Json(JsonValue::Object(tags)))
    })))
}

fn make_enumerate(column: &ColumnConfig) -> Result<ColumnFunc, String> {
    let values: Vec<String> = arg(column, "values")?.ok_or("missing args.values")?;
    let ranks: HashMap<String, i64> = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i as i64 + 1))
        .collect();
    Ok(ColumnFunc::Value(Arc::new(move |ctx: &ValueContext<'_>| {
        ranks.get(ctx.value?).copied().map(ColumnValue::Integer)
    })))
}

/// First of the column's keys whose value is listed wins; `default` otherwise.
fn make_categorize(column: &ColumnConfig) -> Result<ColumnFunc, String> {
    let values: IndexMap<String, i64> = arg(column, "values")?.ok_or("missing args.values")?;
    let default: Option<i64> = arg(column, "default")?;
    let keys: Vec<String> = if column.keys.is_empty() {
        column.key.iter().cloned().collect()
    } else {
        column.keys.clone()
    };
    if keys.is_empty() {
        return Err("categorize requires key or keys".to_string());
    }
    Ok(ColumnFunc::Value(Arc::new(move |ctx: &ValueContext<'_>| {
        keys.iter()
            .filter_map(|k| ctx.element.tags.get(k))
            .find_map(|v| values.get(v).copied())
            .or(default)
            .map(ColumnValue::Integer)
    })))
}

fn make_suffix_replace(column: &ColumnConfig) -> Result<ColumnFunc, String> {
    let suffixes: IndexMap<String, String> =
        arg(column, "suffixes")?.ok_or("missing args.suffixes")?;
    Ok(ColumnFunc::Value(Arc::new(move |ctx: &ValueContext<'_>| {
        let value = ctx.value.filter(|v| !v.is_empty())?;
        let replaced = suffixes
            .iter()
            .find_map(|(suffix, replacement)| {
                value
                    .strip_suffix(suffix.as_str())
                    .map(|stem| format!("{stem}{replacement}"))
            })
            .unwrap_or_else(|| value.to_string());
        Some(ColumnValue::String(replaced))
    })))
}

fn polygon_area(geometry: &Geometry<f64>) -> Option<f64> {
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) => {
            Some(geometry.unsigned_area())
        }
        _ => None,
    }
}

/// Area of a Web Mercator geometry, scaled back by the latitude of its middle.
fn webmerc_area(geometry: &Geometry<f64>) -> Option<f64> {
    use geo::BoundingRect;

    let area = polygon_area(geometry)?;
    let rect = geometry.bounding_rect()?;
    let mid_y = rect.min().y + rect.height() / 2.0;
    let mid_lat =
        2.0 * ((mid_y / WEB_MERCATOR_POLE) * std::f64::consts::PI).exp().atan()
            - std::f64::consts::FRAC_PI_2;
    Some(area * mid_lat.cos().powi(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, build_tag_map};
    use crate::mapping::Match;
    use geo_types::{LineString, Point, polygon};

    fn column(column_type: &str, key: Option<&str>, args: &str) -> ColumnConfig {
        ColumnConfig {
            name: "col".to_string(),
            key: key.map(str::to_string),
            column_type: column_type.to_string(),
            args: serde_yaml::from_str(args).unwrap(),
            ..Default::default()
        }
    }

    fn eval(
        column_type: &str,
        column: &ColumnConfig,
        element: &Element,
        geometry: Option<&SourceGeometry>,
    ) -> Option<ColumnValue> {
        let registry = ColumnRegistry::builtin();
        let func = registry.get(column_type).unwrap().build(column).unwrap();
        let matched = Match::detached("amenity", "cafe", "pois");
        let ctx = ValueContext {
            value: column.key.as_deref().and_then(|k| element.tags.get(k).map(String::as_str)),
            element,
            geometry,
            matched: &matched,
        };
        match func {
            ColumnFunc::Value(f) => f(&ctx),
            ColumnFunc::Member(_) => panic!("member column"),
        }
    }

    #[test]
    fn scalar_conversions() {
        let element = Element::new(
            42,
            build_tag_map([
                ("name", "Foo"),
                ("empty", ""),
                ("lanes", " 3 "),
                ("oneway", "-1"),
                ("bridge", "no"),
                ("tunnel", "yes"),
            ]),
        );

        assert_eq!(
            eval("id", &column("id", None, "{}"), &element, None),
            Some(ColumnValue::Integer(42))
        );
        assert_eq!(
            eval("string", &column("string", Some("name"), "{}"), &element, None),
            Some(ColumnValue::String("Foo".into()))
        );
        assert_eq!(
            eval("string", &column("string", Some("empty"), "{}"), &element, None),
            None
        );
        assert_eq!(
            eval("integer", &column("integer", Some("lanes"), "{}"), &element, None),
            Some(ColumnValue::Integer(3))
        );
        assert_eq!(
            eval("integer", &column("integer", Some("name"), "{}"), &element, None),
            None
        );
        assert_eq!(
            eval("direction", &column("direction", Some("oneway"), "{}"), &element, None),
            Some(ColumnValue::Integer(-1))
        );
        assert_eq!(
            eval("bool", &column("bool", Some("bridge"), "{}"), &element, None),
            Some(ColumnValue::Bool(false))
        );
        assert_eq!(
            eval("boolint", &column("boolint", Some("tunnel"), "{}"), &element, None),
            Some(ColumnValue::Integer(1))
        );
        assert_eq!(
            eval("bool", &column("bool", Some("missing"), "{}"), &element, None),
            Some(ColumnValue::Bool(false))
        );
    }

    #[test]
    fn mapping_key_and_value() {
        let element = Element::default();
        assert_eq!(
            eval("mapping_key", &column("mapping_key", None, "{}"), &element, None),
            Some(ColumnValue::String("amenity".into()))
        );
        assert_eq!(
            eval("mapping_value", &column("mapping_value", None, "{}"), &element, None),
            Some(ColumnValue::String("cafe".into()))
        );
    }

    #[test]
    fn enumerate_and_categorize() {
        let element = Element::new(1, build_tag_map([("highway", "secondary"), ("railway", "rail")]));

        let enumerate = column("enumerate", Some("highway"), "values: [primary, secondary]");
        assert_eq!(
            eval("enumerate", &enumerate, &element, None),
            Some(ColumnValue::Integer(2))
        );

        let mut categorize = column(
            "categorize",
            None,
            "{values: {rail: 5, tertiary: 1}, default: 0}",
        );
        categorize.keys = vec!["highway".into(), "railway".into()];
        assert_eq!(
            eval("categorize", &categorize, &element, None),
            Some(ColumnValue::Integer(5))
        );

        let registry = ColumnRegistry::builtin();
        assert!(registry
            .get("enumerate")
            .unwrap()
            .build(&column("enumerate", Some("highway"), "{}"))
            .is_err());
    }

    #[test]
    fn suffix_replace() {
        let element = Element::new(1, build_tag_map([("name", "Main Straße")]));
        let col = column(
            "string_suffixreplace",
            Some("name"),
            "suffixes: {straße: str., Straße: Str.}",
        );
        assert_eq!(
            eval("string_suffixreplace", &col, &element, None),
            Some(ColumnValue::String("Main Str.".into()))
        );
    }

    #[test]
    fn hstore_tags_with_include() {
        let element = Element::new(1, build_tag_map([("name", "Foo"), ("shop", "bakery")]));
        let col = column("hstore_tags", None, "include: [name, missing]");
        let Some(ColumnValue::Json(JsonValue::Object(tags))) =
            eval("hstore_tags", &col, &element, None)
        else {
            panic!("expected json object");
        };
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["name"], JsonValue::String("Foo".into()));
    }

    #[test]
    fn geometry_columns() {
        let element = Element::default();
        let square = SourceGeometry::new(
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 2.0),
                (x: 0.0, y: 2.0),
                (x: 0.0, y: 0.0),
            ]),
            Some(3857),
        );
        assert_eq!(
            eval("geometry", &column("geometry", None, "{}"), &element, Some(&square)),
            Some(ColumnValue::Geometry(square.to_ewkb().unwrap()))
        );
        assert_eq!(
            eval("area", &column("area", None, "{}"), &element, Some(&square)),
            Some(ColumnValue::Float(4.0))
        );
        assert_eq!(
            eval("geometry", &column("geometry", None, "{}"), &element, None),
            None
        );

        let point = SourceGeometry::new(Geometry::Point(Point::new(1.0, 1.0)), None);
        assert_eq!(eval("area", &column("area", None, "{}"), &element, Some(&point)), None);

        let broken = SourceGeometry::new(
            Geometry::LineString(LineString::from(vec![(0.0, 0.0)])),
            None,
        );
        assert_eq!(
            eval(
                "validated_geometry",
                &column("validated_geometry", None, "{}"),
                &element,
                Some(&broken)
            ),
            None
        );
    }

    #[test]
    fn validated_geometry_drops_self_intersections() {
        let element = Element::new(1, Default::default());
        let validated = column("validated_geometry", None, "{}");

        let bowtie = SourceGeometry::new(
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 4.0, y: 4.0),
                (x: 4.0, y: 0.0),
                (x: 0.0, y: 2.0),
                (x: 0.0, y: 0.0),
            ]),
            None,
        );
        assert_eq!(eval("validated_geometry", &validated, &element, Some(&bowtie)), None);

        let square = SourceGeometry::new(
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 4.0, y: 0.0),
                (x: 4.0, y: 4.0),
                (x: 0.0, y: 4.0),
                (x: 0.0, y: 0.0),
            ]),
            None,
        );
        assert_eq!(
            eval("validated_geometry", &validated, &element, Some(&square)),
            Some(ColumnValue::Geometry(square.to_ewkb().unwrap()))
        );
    }

    #[test]
    fn webmerc_area_at_equator_is_unscaled() {
        let square = Geometry::Polygon(polygon![
            (x: -1.0, y: -1.0),
            (x: 1.0, y: -1.0),
            (x: 1.0, y: 1.0),
            (x: -1.0, y: 1.0),
            (x: -1.0, y: -1.0),
        ]);
        let area = webmerc_area(&square).unwrap();
        assert!((area - 4.0).abs() < 1e-9);
    }
}
