//! Row construction for matched elements.

use std::sync::Arc;

use crate::columns::{ColumnFunc, ColumnRegistry, ColumnValue, MemberContext, Row, ValueContext};
use crate::config::TableConfig;
use crate::element::{Element, Member, Relation};
use crate::error::MappingError;
use crate::geometry::{EnginePool, GeometryTransform, SourceGeometry, make_transform_func};

use super::Match;

/// One compiled column.
#[derive(Debug, Clone)]
pub struct ValueBuilder {
    name: String,
    key: Option<String>,
    from_member: bool,
    func: ColumnFunc,
}

impl ValueBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn value(
        &self,
        element: &Element,
        geometry: Option<&SourceGeometry>,
        matched: &Match,
    ) -> Option<ColumnValue> {
        match &self.func {
            ColumnFunc::Value(func) => func(&ValueContext {
                value: self.tag_value(element),
                element,
                geometry,
                matched,
            }),
            ColumnFunc::Member(_) => None,
        }
    }

    fn member_value(
        &self,
        relation: &Relation,
        member: &Member,
        index: usize,
        geometry: Option<&SourceGeometry>,
        matched: &Match,
    ) -> Option<ColumnValue> {
        match &self.func {
            ColumnFunc::Value(_) if self.from_member => {
                let element = member.element.as_ref()?;
                self.value(element, geometry, matched)
            }
            ColumnFunc::Value(_) => self.value(&relation.element, geometry, matched),
            ColumnFunc::Member(func) => func(&MemberContext {
                relation,
                member,
                index,
                matched,
            }),
        }
    }

    fn tag_value<'e>(&self, element: &'e Element) -> Option<&'e str> {
        let key = self.key.as_deref()?;
        element.tags.get(key).map(String::as_str)
    }
}

/// The ordered columns of one table.
#[derive(Debug, Clone, Default)]
pub struct RowBuilder {
    columns: Vec<ValueBuilder>,
}

impl RowBuilder {
    pub(crate) fn compile(
        table: &str,
        config: &TableConfig,
        registry: &ColumnRegistry,
        pool: &Arc<EnginePool>,
    ) -> Result<Self, MappingError> {
        let mut columns = Vec::with_capacity(config.columns.len());
        for column in &config.columns {
            let column_type = registry.get(&column.column_type).ok_or_else(|| {
                MappingError::UnknownColumnType {
                    table: table.to_string(),
                    column: column.name.clone(),
                    column_type: column.column_type.clone(),
                }
            })?;

            let mut func =
                column_type
                    .build(column)
                    .map_err(|message| MappingError::InvalidColumnArgs {
                        table: table.to_string(),
                        column: column.name.clone(),
                        message,
                    })?;

            if let Some(name) = &column.geometry_transform {
                if column_type.is_geometry() {
                    let transform = GeometryTransform::parse_optional(name).map_err(|_| {
                        MappingError::UnknownGeometryTransform {
                            table: table.to_string(),
                            column: column.name.clone(),
                            transform: name.clone(),
                        }
                    })?;
                    if let Some(transform) = transform {
                        func = ColumnFunc::Value(make_transform_func(transform, pool.clone()));
                    }
                } else if !name.trim().is_empty() {
                    tracing::warn!(
                        table,
                        column = %column.name,
                        column_type = %column.column_type,
                        "geometry_transform ignored on non-geometry column"
                    );
                }
            }

            columns.push(ValueBuilder {
                name: column.name.clone(),
                key: column.key.clone(),
                from_member: column.from_member,
                func,
            });
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ValueBuilder] {
        &self.columns
    }

    pub fn make_row(
        &self,
        element: &Element,
        geometry: Option<&SourceGeometry>,
        matched: &Match,
    ) -> Row {
        self.columns
            .iter()
            .map(|column| column.value(element, geometry, matched))
            .collect()
    }

    pub fn make_member_row(
        &self,
        relation: &Relation,
        member: &Member,
        index: usize,
        geometry: Option<&SourceGeometry>,
        matched: &Match,
    ) -> Row {
        self.columns
            .iter()
            .map(|column| column.member_value(relation, member, index, geometry, matched))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;
    use crate::element::{MemberType, build_tag_map};

    fn builder(yaml: &str) -> Result<RowBuilder, MappingError> {
        let config = MappingConfig::from_yaml_str(yaml).unwrap();
        let (name, table) = config.tables.first().unwrap();
        RowBuilder::compile(
            name,
            table,
            &ColumnRegistry::builtin(),
            &Arc::new(EnginePool::new(1)),
        )
    }

    const MEMBERS: &str = r#"
tables:
  route_members:
    type: relation_member
    mapping:
      route: [bus]
    columns:
      - {name: osm_id, type: id}
      - {name: member, type: member_id}
      - {name: role, type: member_role}
      - {name: kind, type: member_type}
      - {name: index, type: member_index}
      - {name: name, type: string, key: name}
      - {name: stop_name, type: string, key: name, from_member: true}
"#;

    #[test]
    fn member_row_mixes_relation_and_member_values() {
        let rows = builder(MEMBERS).unwrap();
        let relation = Relation {
            element: Element::new(10, build_tag_map([("route", "bus"), ("name", "Line 1")])),
            members: vec![Member {
                id: 5,
                member_type: MemberType::Node,
                role: "stop".to_string(),
                element: Some(Element::new(5, build_tag_map([("name", "Main St")]))),
            }],
        };
        let matched = Match::detached("route", "bus", "route_members");

        let row = rows.make_member_row(&relation, &relation.members[0], 0, None, &matched);
        assert_eq!(
            row,
            vec![
                Some(ColumnValue::Integer(10)),
                Some(ColumnValue::Integer(5)),
                Some(ColumnValue::String("stop".into())),
                Some(ColumnValue::Integer(0)),
                Some(ColumnValue::Integer(0)),
                Some(ColumnValue::String("Line 1".into())),
                Some(ColumnValue::String("Main St".into())),
            ]
        );
    }

    #[test]
    fn unresolved_member_gives_null_member_columns() {
        let rows = builder(MEMBERS).unwrap();
        let relation = Relation {
            element: Element::new(10, build_tag_map([("route", "bus")])),
            members: vec![Member {
                id: 7,
                member_type: MemberType::Way,
                role: String::new(),
                element: None,
            }],
        };
        let matched = Match::detached("route", "bus", "route_members");
        let row = rows.make_member_row(&relation, &relation.members[0], 3, None, &matched);
        assert_eq!(row[3], Some(ColumnValue::Integer(1)));
        assert_eq!(row[4], Some(ColumnValue::Integer(3)));
        assert_eq!(row[6], None);
    }

    #[test]
    fn member_columns_are_null_in_plain_rows() {
        let rows = builder(MEMBERS).unwrap();
        let element = Element::new(10, build_tag_map([("name", "Line 1")]));
        let matched = Match::detached("route", "bus", "route_members");
        let row = rows.make_row(&element, None, &matched);
        assert_eq!(row.len(), 7);
        assert_eq!(row[1], None);
        assert_eq!(row[5], Some(ColumnValue::String("Line 1".into())));
    }

    #[test]
    fn unknown_column_type_is_an_error() {
        let err = builder(
            r#"
tables:
  pois:
    type: point
    mapping: {amenity: [cafe]}
    columns:
      - {name: x, type: hstore}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::UnknownColumnType { .. }));
    }

    #[test]
    fn geometry_transform_validation() {
        let err = builder(
            r#"
tables:
  pois:
    type: polygon
    mapping: {building: [__any__]}
    columns:
      - {name: geom, type: geometry, geometry_transform: buffer}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::UnknownGeometryTransform { .. }));

        // ignored on non-geometry columns
        assert!(
            builder(
                r#"
tables:
  pois:
    type: polygon
    mapping: {building: [__any__]}
    columns:
      - {name: name, type: string, key: name, geometry_transform: buffer}
"#,
            )
            .is_ok()
        );
    }
}
