use anyhow::{Context, Result};
use geo_types::{Geometry, Point};
use serde::Deserialize;
use serde_json::Value;

use osmroute::element::{Element, Member, MemberType, Node, Relation, Tags, Way};
use osmroute::geometry::SourceGeometry;

const WGS84: i32 = 4326;

/// One line of the element stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputElement {
    Node {
        id: i64,
        #[serde(default)]
        tags: Tags,
        #[serde(default)]
        lon: Option<f64>,
        #[serde(default)]
        lat: Option<f64>,
        #[serde(default)]
        geometry: Option<Value>,
        #[serde(default)]
        srid: Option<i32>,
    },
    Way {
        id: i64,
        #[serde(default)]
        tags: Tags,
        #[serde(default)]
        refs: Vec<i64>,
        #[serde(default)]
        geometry: Option<Value>,
        #[serde(default)]
        srid: Option<i32>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        tags: Tags,
        #[serde(default)]
        members: Vec<InputMember>,
        #[serde(default)]
        geometry: Option<Value>,
        #[serde(default)]
        srid: Option<i32>,
    },
}

#[derive(Debug, Deserialize)]
pub struct InputMember {
    #[serde(rename = "type")]
    pub member_type: MemberType,
    #[serde(rename = "ref")]
    pub id: i64,
    #[serde(default)]
    pub role: String,
    /// Tags of the member element, if the producer resolved it.
    #[serde(default)]
    pub tags: Option<Tags>,
}

/// An element ready for classification.
#[derive(Debug)]
pub enum Parsed {
    Node(Node, Option<SourceGeometry>),
    Way(Way, Option<SourceGeometry>),
    Relation(Relation, Option<SourceGeometry>),
}

pub fn parse_line(line: &str) -> Result<Parsed> {
    let element: InputElement = serde_json::from_str(line).context("invalid element JSON")?;
    Ok(match element {
        InputElement::Node {
            id,
            tags,
            lon,
            lat,
            geometry,
            srid,
        } => {
            let geometry = match (geometry, lon, lat) {
                (Some(value), _, _) => Some(parse_geometry(value, srid)?),
                (None, Some(lon), Some(lat)) => Some(SourceGeometry::new(
                    Geometry::Point(Point::new(lon, lat)),
                    Some(srid.unwrap_or(WGS84)),
                )),
                _ => None,
            };
            let node = Node {
                element: Element::new(id, tags),
                lon: lon.unwrap_or_default(),
                lat: lat.unwrap_or_default(),
            };
            Parsed::Node(node, geometry)
        }
        InputElement::Way {
            id,
            tags,
            refs,
            geometry,
            srid,
        } => {
            let geometry = geometry.map(|g| parse_geometry(g, srid)).transpose()?;
            Parsed::Way(
                Way {
                    element: Element::new(id, tags),
                    refs,
                },
                geometry,
            )
        }
        InputElement::Relation {
            id,
            tags,
            members,
            geometry,
            srid,
        } => {
            let geometry = geometry.map(|g| parse_geometry(g, srid)).transpose()?;
            let members = members
                .into_iter()
                .map(|m| Member {
                    id: m.id,
                    member_type: m.member_type,
                    role: m.role,
                    element: m.tags.map(|tags| Element::new(m.id, tags)),
                })
                .collect();
            Parsed::Relation(
                Relation {
                    element: Element::new(id, tags),
                    members,
                },
                geometry,
            )
        }
    })
}

fn parse_geometry(value: Value, srid: Option<i32>) -> Result<SourceGeometry> {
    let geometry: geojson::Geometry =
        serde_json::from_value(value).context("invalid GeoJSON geometry")?;
    let geometry = Geometry::<f64>::try_from(geometry).context("unsupported GeoJSON geometry")?;
    Ok(SourceGeometry::new(geometry, Some(srid.unwrap_or(WGS84))))
}
