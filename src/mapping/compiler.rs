//! Mapping compilation.
//!
//! One pass over the document assigns every (key, value) entry its
//! declaration order and compiles each table once (row builder, explicit
//! filters, split policy). Per element class the matching tables are then
//! merged into a [`TagMatcher`], and the matchers into the tag filters.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::filters::{DEFAULT_RELATION_TYPES, ElementFilter, FilterMode, ValueSet};
use super::matcher::{
    ClassificationIndex, DestTable, Destination, KeySet, SplitPolicy, TableRules, TagMatcher,
    Target,
};
use super::row::RowBuilder;
use super::tag_filter::{ExcludeFilter, MappingTagFilter, TagFilter};
use super::{ElementClass, Mapping};
use crate::columns::ColumnRegistry;
use crate::config::{KeyValues, MappingConfig, SubMapping, TableConfig, TableType, TypeMapping};
use crate::error::MappingError;
use crate::geometry::EnginePool;

/// Hands out declaration orders. Lives for exactly one compile pass.
#[derive(Debug, Default)]
pub(crate) struct OrderCounter(usize);

impl OrderCounter {
    pub(crate) fn next(&mut self) -> usize {
        let order = self.0;
        self.0 += 1;
        order
    }
}

/// Which part of a table an entry was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Base,
    Points,
    LineStrings,
    Polygons,
    Any,
}

impl Section {
    fn applies_to(self, class: ElementClass) -> bool {
        match self {
            Section::Base | Section::Any => true,
            Section::Points => class == ElementClass::Point,
            Section::LineStrings => class == ElementClass::LineString,
            Section::Polygons => class == ElementClass::Polygon,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry<'c> {
    section: Section,
    sub_mapping: Option<&'c str>,
    key: &'c str,
    value: &'c str,
    order: usize,
}

/// A table compiled independently of any element class.
#[derive(Debug)]
struct DeclaredTable<'c> {
    name: &'c str,
    config: &'c TableConfig,
    table_type: TableType,
    entries: Vec<Entry<'c>>,
    builder: Arc<RowBuilder>,
    filters: Vec<ElementFilter>,
    split: SplitPolicy,
}

pub(crate) fn table_matches(table_type: TableType, class: ElementClass) -> bool {
    use ElementClass as C;
    use TableType as T;

    matches!(
        (table_type, class),
        (T::Geometry, _)
            | (T::PointOrPolygon, C::Point | C::Polygon)
            | (T::Point, C::Point)
            | (T::LineString, C::LineString)
            | (T::Polygon, C::Polygon)
            | (T::Relation, C::Relation)
            | (T::RelationMember, C::RelationMember)
    )
}

impl Mapping {
    /// Compile with the built-in column types and one geometry engine per
    /// worker thread.
    pub fn compile(config: MappingConfig) -> Result<Self, MappingError> {
        let pool = Arc::new(EnginePool::new(rayon::current_num_threads()));
        Self::compile_with(config, &ColumnRegistry::builtin(), pool)
    }

    pub fn compile_with(
        config: MappingConfig,
        registry: &ColumnRegistry,
        pool: Arc<EnginePool>,
    ) -> Result<Self, MappingError> {
        let declared = declare_tables(&config, registry, &pool)?;

        let area_tags = config
            .areas
            .area_tags
            .as_ref()
            .map(|tags| Arc::new(tags.iter().cloned().collect::<HashSet<_>>()));
        let linear_tags = config
            .areas
            .linear_tags
            .as_ref()
            .map(|tags| Arc::new(tags.iter().cloned().collect::<HashSet<_>>()));
        let implicit = ImplicitFilters {
            area_tags,
            linear_tags,
        };

        let build = |class| build_matcher(class, &declared, &implicit);
        let point = build(ElementClass::Point);
        let line_string = build(ElementClass::LineString);
        let polygon = build(ElementClass::Polygon);
        let relation = build(ElementClass::Relation);
        let relation_member = build(ElementClass::RelationMember);

        let (node_filter, way_filter, relation_filter) = if config.tags.load_all {
            let exclude = ExcludeFilter::new(&config.tags.exclude);
            (
                TagFilter::Exclude(exclude.clone()),
                TagFilter::Exclude(exclude.clone()),
                TagFilter::Exclude(exclude),
            )
        } else {
            let include = config
                .tags
                .include_regex
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| MappingError::InvalidIncludeRegex {
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let tag_filter = |matchers: &[&TagMatcher], keep_relation_types: bool| {
                TagFilter::Mapping(build_tag_filter(
                    &config,
                    &declared,
                    matchers,
                    keep_relation_types,
                    &include,
                ))
            };
            (
                tag_filter(&[&point, &relation_member], false),
                tag_filter(&[&line_string, &polygon, &relation_member], false),
                tag_filter(
                    &[&line_string, &polygon, &relation, &relation_member],
                    true,
                ),
            )
        };

        for matcher in [&point, &line_string, &polygon, &relation, &relation_member] {
            tracing::debug!(
                class = matcher.class().as_str(),
                tables = matcher.tables.len(),
                destinations = matcher.dests.len(),
                keys = matcher.index.len(),
                "compiled matcher"
            );
        }
        drop(declared);

        Ok(Mapping {
            config,
            point,
            line_string,
            polygon,
            relation,
            relation_member,
            node_filter,
            way_filter,
            relation_filter,
        })
    }
}

fn declare_tables<'c>(
    config: &'c MappingConfig,
    registry: &ColumnRegistry,
    pool: &Arc<EnginePool>,
) -> Result<Vec<DeclaredTable<'c>>, MappingError> {
    let mut types = Vec::with_capacity(config.tables.len());
    for (name, table) in &config.tables {
        let table_type = table
            .table_type
            .ok_or_else(|| MappingError::MissingTableType {
                table: name.clone(),
            })?;
        if table_type == TableType::Geometry && (table.mapping.is_some() || table.mappings.is_some())
        {
            return Err(MappingError::GeometryTableWithMapping {
                table: name.clone(),
            });
        }
        types.push(table_type);
    }

    let mut orders = OrderCounter::default();
    let mut declared = Vec::with_capacity(config.tables.len());
    for ((name, table), table_type) in config.tables.iter().zip(types) {
        let entries = table_entries(table, &mut orders);
        let split = split_policy(table);
        let filters = explicit_filters(name, table, &split)?;
        let builder = Arc::new(RowBuilder::compile(name, table, registry, pool)?);
        declared.push(DeclaredTable {
            name,
            config: table,
            table_type,
            entries,
            builder,
            filters,
            split,
        });
    }
    Ok(declared)
}

/// Entries in declaration order: `mapping`, `mappings`, then `type_mappings`
/// for points, linestrings, polygons, and any.
fn table_entries<'c>(table: &'c TableConfig, orders: &mut OrderCounter) -> Vec<Entry<'c>> {
    let mut entries = Vec::new();
    let mut add = |section: Section, sub_mapping: Option<&'c str>, mapping: &'c KeyValues| {
        for (key, values) in mapping {
            for value in values {
                entries.push(Entry {
                    section,
                    sub_mapping,
                    key,
                    value,
                    order: orders.next(),
                });
            }
        }
    };
    let mut add_all = |section: Section,
                       mapping: Option<&'c KeyValues>,
                       mappings: Option<&'c indexmap::IndexMap<String, SubMapping>>| {
        if let Some(mapping) = mapping {
            add(section, None, mapping);
        }
        for (sub_name, sub) in mappings.into_iter().flatten() {
            add(section, Some(sub_name.as_str()), &sub.mapping);
        }
    };

    add_all(Section::Base, table.mapping.as_ref(), table.mappings.as_ref());
    let typed: [(Section, &'c TypeMapping); 4] = [
        (Section::Points, &table.type_mappings.points),
        (Section::LineStrings, &table.type_mappings.linestrings),
        (Section::Polygons, &table.type_mappings.polygons),
        (Section::Any, &table.type_mappings.any),
    ];
    for (section, type_mapping) in typed {
        add_all(section, type_mapping.mapping.as_ref(), Some(&type_mapping.mappings));
    }
    entries
}

fn split_policy(table: &TableConfig) -> SplitPolicy {
    let multi = KeySet::from_keys(&table.multi_values);
    let mut split = KeySet::from_keys(&table.split_values);
    split.extend(&multi);
    SplitPolicy { split, multi }
}

/// `exclude_tags`, `require`, `reject`, `require_regexp`, `reject_regexp`, in
/// that order.
fn explicit_filters(
    table: &str,
    config: &TableConfig,
    split: &SplitPolicy,
) -> Result<Vec<ElementFilter>, MappingError> {
    let Some(filters) = &config.filters else {
        return Ok(Vec::new());
    };
    let mut result = Vec::new();

    let values_filter = |key: &str, values: &[String], mode| ElementFilter::Values {
        key: key.to_string(),
        values: ValueSet::from_values(table, key, values),
        split: split.split.covers(key),
        mode,
    };

    if let Some(exclude_tags) = &filters.exclude_tags {
        tracing::warn!(
            table,
            "exclude_tags filter is deprecated and will be removed, use reject instead"
        );
        for (key, value) in exclude_tags {
            result.push(values_filter(key, &[value.clone()], FilterMode::Reject));
        }
    }
    for (key, values) in &filters.require {
        result.push(values_filter(key, values, FilterMode::Require));
    }
    for (key, values) in &filters.reject {
        result.push(values_filter(key, values, FilterMode::Reject));
    }

    let regexes = [
        (&filters.require_regexp, FilterMode::Require),
        (&filters.reject_regexp, FilterMode::Reject),
    ];
    for (patterns, mode) in regexes {
        for (key, pattern) in patterns {
            let regex = Regex::new(pattern).map_err(|source| MappingError::InvalidFilterRegex {
                table: table.to_string(),
                key: key.clone(),
                source,
            })?;
            result.push(ElementFilter::Regex {
                key: key.clone(),
                regex,
                split: split.split.covers(key),
                mode,
            });
        }
    }
    Ok(result)
}

/// `areas` configuration, shared by all tables.
struct ImplicitFilters {
    area_tags: Option<Arc<HashSet<String>>>,
    linear_tags: Option<Arc<HashSet<String>>>,
}

impl ImplicitFilters {
    fn for_table(&self, table_type: TableType, class: ElementClass) -> Vec<ElementFilter> {
        let mut filters = Vec::new();
        if !table_matches(table_type, class) {
            return filters;
        }
        if let Some(area_tags) = &self.area_tags
            && table_type == TableType::LineString
        {
            filters.push(ElementFilter::AreaTags(area_tags.clone()));
        }
        if let Some(linear_tags) = &self.linear_tags
            && (table_type == TableType::Polygon
                || (table_type == TableType::PointOrPolygon && class == ElementClass::Polygon))
        {
            filters.push(ElementFilter::LinearTags(linear_tags.clone()));
        }
        filters
    }
}

fn relation_filters(table: &DeclaredTable<'_>, class: ElementClass) -> Vec<ElementFilter> {
    if !matches!(
        class,
        ElementClass::Polygon | ElementClass::Relation | ElementClass::RelationMember
    ) {
        return Vec::new();
    }
    match &table.config.relation_types {
        Some(types) => vec![ElementFilter::RelationTypes(types.clone())],
        None if matches!(
            table.table_type,
            TableType::Polygon | TableType::PointOrPolygon
        ) =>
        {
            vec![ElementFilter::default_relation_types()]
        }
        None => Vec::new(),
    }
}

fn build_matcher(
    class: ElementClass,
    declared: &[DeclaredTable<'_>],
    implicit: &ImplicitFilters,
) -> TagMatcher {
    // relations are checked against polygon rules as well
    let typed_classes: &[ElementClass] = match class {
        ElementClass::Relation => &[ElementClass::Polygon, ElementClass::Relation],
        _ => std::slice::from_ref(&class),
    };

    let mut index = ClassificationIndex::new();
    let mut dests = Vec::new();
    let mut tables = Vec::new();

    for table in declared
        .iter()
        .filter(|t| table_matches(t.table_type, class))
    {
        let rules = tables.len();
        let mut filters = table.filters.clone();
        for typed in typed_classes {
            filters.extend(implicit.for_table(table.table_type, *typed));
        }
        tables.push(TableRules {
            builder: table.builder.clone(),
            filters,
            relation_filters: relation_filters(table, class),
            split: table.split.clone(),
        });

        let mut table_dests: HashMap<Option<&str>, usize> = HashMap::new();
        for entry in table.entries.iter().filter(|e| e.section.applies_to(class)) {
            let dest = *table_dests.entry(entry.sub_mapping).or_insert_with(|| {
                dests.push(Destination {
                    table: DestTable::new(table.name, entry.sub_mapping),
                    rules,
                });
                dests.len() - 1
            });
            index
                .entry(entry.key.to_string())
                .or_default()
                .entry(entry.value.to_string())
                .or_default()
                .push(Target {
                    dest,
                    order: entry.order,
                });
        }
    }

    TagMatcher {
        class,
        index,
        dests,
        tables,
    }
}

/// Keys that must survive tag filtering although no mapping names them.
fn extra_tags(
    config: &MappingConfig,
    declared: &[DeclaredTable<'_>],
    class: ElementClass,
) -> HashSet<String> {
    let mut tags = HashSet::new();
    for table in declared
        .iter()
        .filter(|t| table_matches(t.table_type, class))
    {
        for column in &table.config.columns {
            tags.extend(column.key.iter().cloned());
            tags.extend(column.keys.iter().cloned());
        }
        if let Some(filters) = &table.config.filters {
            if let Some(exclude_tags) = &filters.exclude_tags {
                tags.extend(exclude_tags.iter().map(|(key, _)| key.clone()));
            }
            tags.extend(filters.require.keys().cloned());
            tags.extend(filters.reject.keys().cloned());
            tags.extend(filters.require_regexp.keys().cloned());
            tags.extend(filters.reject_regexp.keys().cloned());
        }
        if table.config.relation_types.is_some()
            && matches!(
                class,
                ElementClass::Polygon | ElementClass::Relation | ElementClass::RelationMember
            )
        {
            tags.insert("type".to_string());
        }
    }
    tags.extend(config.tags.include.iter().cloned());
    // closed-way handling depends on it
    tags.insert("area".to_string());
    tags
}

fn build_tag_filter(
    config: &MappingConfig,
    declared: &[DeclaredTable<'_>],
    matchers: &[&TagMatcher],
    keep_relation_types: bool,
    include: &[Regex],
) -> MappingTagFilter {
    let mut filter = MappingTagFilter {
        include: include.to_vec(),
        ..Default::default()
    };
    if keep_relation_types {
        filter.mappings.insert(
            "type".to_string(),
            DEFAULT_RELATION_TYPES.iter().map(|t| t.to_string()).collect(),
        );
    }
    for matcher in matchers {
        for (key, values) in &matcher.index {
            filter
                .mappings
                .entry(key.clone())
                .or_default()
                .extend(values.keys().cloned());
        }
        filter
            .extra_tags
            .extend(extra_tags(config, declared, matcher.class()));
        for table in declared
            .iter()
            .filter(|t| table_matches(t.table_type, matcher.class()))
        {
            filter.split_keys.extend(&table.split.split);
        }
    }
    filter
}
