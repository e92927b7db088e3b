//! Tag classification.
//!
//! Every tag of an element is looked up in the classification index; the
//! candidates are grouped per destination and key, reduced to a winner by
//! declaration order, and filtered. See [`TagMatcher::match_tags`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::ElementClass;
use super::filters::ElementFilter;
use super::row::RowBuilder;
use super::values::split_tag_values;
use crate::columns::Row;
use crate::config::ANY;
use crate::element::{Element, Member, Node, Relation, Tags, Way};
use crate::geometry::SourceGeometry;

/// Where a match goes: a table, optionally narrowed to one of its sub-mappings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestTable {
    pub name: Arc<str>,
    pub sub_mapping: Option<Arc<str>>,
}

impl DestTable {
    pub fn new(name: &str, sub_mapping: Option<&str>) -> Self {
        Self {
            name: Arc::from(name),
            sub_mapping: sub_mapping.map(Arc::from),
        }
    }
}

impl fmt::Display for DestTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_mapping {
            Some(sub) => write!(f, "{}:{}", self.name, sub),
            None => f.write_str(&self.name),
        }
    }
}

/// A tag that selected a destination table.
#[derive(Debug, Clone)]
pub struct Match {
    pub key: String,
    pub value: String,
    pub table: DestTable,
    builder: Arc<RowBuilder>,
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value && self.table == other.table
    }
}

impl Match {
    pub fn row(&self, element: &Element, geometry: Option<&SourceGeometry>) -> Row {
        self.builder.make_row(element, geometry, self)
    }

    pub fn member_row(
        &self,
        relation: &Relation,
        member: &Member,
        index: usize,
        geometry: Option<&SourceGeometry>,
    ) -> Row {
        self.builder
            .make_member_row(relation, member, index, geometry, self)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.builder.columns().iter().map(|c| c.name())
    }

    #[cfg(test)]
    pub(crate) fn detached(key: &str, value: &str, table: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            table: DestTable::new(table, None),
            builder: Arc::default(),
        }
    }
}

/// Keys a policy applies to; `__any__` covers all of them.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeySet {
    any: bool,
    keys: HashSet<String>,
}

impl KeySet {
    pub(crate) fn from_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Self {
        let mut set = Self::default();
        for key in keys {
            if key == ANY {
                set.any = true;
            } else {
                set.keys.insert(key.clone());
            }
        }
        set
    }

    pub(crate) fn covers(&self, key: &str) -> bool {
        self.any || self.keys.contains(key)
    }

    pub(crate) fn extend(&mut self, other: &KeySet) {
        self.any |= other.any;
        self.keys.extend(other.keys.iter().cloned());
    }
}

/// How `;` separated values are treated for one table.
#[derive(Debug, Clone, Default)]
pub(crate) struct SplitPolicy {
    /// Sub-values take part in classification and filtering.
    pub(crate) split: KeySet,
    /// All matching sub-values of the key produce a match.
    pub(crate) multi: KeySet,
}

/// Everything the matcher knows about one table.
#[derive(Debug, Clone)]
pub(crate) struct TableRules {
    pub(crate) builder: Arc<RowBuilder>,
    pub(crate) filters: Vec<ElementFilter>,
    pub(crate) relation_filters: Vec<ElementFilter>,
    pub(crate) split: SplitPolicy,
}

#[derive(Debug, Clone)]
pub(crate) struct Destination {
    pub(crate) table: DestTable,
    /// Index into `TagMatcher::tables`.
    pub(crate) rules: usize,
}

/// A destination reachable through one (key, value) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) dest: usize,
    pub(crate) order: usize,
}

/// key -> value -> targets, `__any__` included as key and value.
pub(crate) type ClassificationIndex = HashMap<String, HashMap<String, Vec<Target>>>;

#[derive(Debug, Clone, Copy)]
struct Candidate<'t> {
    dest: usize,
    key: &'t str,
    value: &'t str,
    order: usize,
}

/// Classifies elements of one class into destination tables.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    pub(crate) class: ElementClass,
    pub(crate) index: ClassificationIndex,
    pub(crate) dests: Vec<Destination>,
    pub(crate) tables: Vec<TableRules>,
}

impl TagMatcher {
    pub fn class(&self) -> ElementClass {
        self.class
    }

    /// Destination tables this matcher can produce, in declaration order.
    pub fn destinations(&self) -> impl Iterator<Item = &DestTable> {
        self.dests.iter().map(|d| &d.table)
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn match_node(&self, node: &Node) -> Vec<Match> {
        self.match_tags(&node.element.tags, false, false)
    }

    /// Ways are gated by closedness and the `area` tag: the polygon matcher
    /// only sees closed ways that are not `area=no`, the linestring matcher
    /// sees open ways and closed ways that are not `area=yes`.
    pub fn match_way(&self, way: &Way) -> Vec<Match> {
        let tags = &way.element.tags;
        let area = tags.get("area").map(String::as_str);
        let closed = way.is_closed();
        match self.class {
            ElementClass::Polygon => {
                if closed && area != Some("no") {
                    self.match_tags(tags, true, false)
                } else {
                    Vec::new()
                }
            }
            _ => {
                if !closed {
                    self.match_tags(tags, false, false)
                } else if area != Some("yes") {
                    self.match_tags(tags, true, false)
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn match_relation(&self, relation: &Relation) -> Vec<Match> {
        self.match_tags(&relation.element.tags, true, true)
    }

    /// Classify a tag map.
    ///
    /// Per destination, each key yields one candidate group: its
    /// smallest-order candidate, or for multi-value keys all of them. The
    /// group with the smallest order wins the destination and must pass the
    /// table filters (and, for relations, the relation filters). Matches are
    /// returned in order of the winning groups.
    pub fn match_tags(&self, tags: &Tags, closed: bool, relation: bool) -> Vec<Match> {
        let mut candidates = self.candidates(tags);
        if candidates.is_empty() {
            return Vec::new();
        }
        candidates.sort_unstable_by(|a, b| {
            (a.dest, a.key, a.order, a.value).cmp(&(b.dest, b.key, b.order, b.value))
        });

        let mut selected: Vec<(usize, &[Candidate<'_>])> = Vec::new();
        for dest_candidates in candidates.chunk_by(|a, b| a.dest == b.dest) {
            let dest = &self.dests[dest_candidates[0].dest];
            let rules = &self.tables[dest.rules];

            let mut best: Option<&[Candidate<'_>]> = None;
            for group in dest_candidates.chunk_by(|a, b| a.key == b.key) {
                let group = if rules.split.multi.covers(group[0].key) {
                    group
                } else {
                    &group[..1]
                };
                if best.is_none_or(|b| group[0].order < b[0].order) {
                    best = Some(group);
                }
            }
            let Some(group) = best else {
                continue;
            };

            let key = group[0].key;
            let passes = |filters: &[ElementFilter]| {
                filters.iter().all(|f| f.passes(tags, key, closed))
            };
            if !passes(&rules.filters) || (relation && !passes(&rules.relation_filters)) {
                tracing::trace!(table = %dest.table, key, closed, relation, "filtered out");
                continue;
            }
            selected.push((group[0].order, group));
        }

        selected.sort_by_key(|(order, _)| *order);

        let mut matches = Vec::new();
        for (_, group) in selected {
            let mut previous: Option<(usize, &str)> = None;
            for candidate in group {
                if previous == Some((candidate.order, candidate.value)) {
                    continue;
                }
                previous = Some((candidate.order, candidate.value));
                let dest = &self.dests[candidate.dest];
                matches.push(Match {
                    key: candidate.key.to_string(),
                    value: candidate.value.to_string(),
                    table: dest.table.clone(),
                    builder: self.tables[dest.rules].builder.clone(),
                });
            }
        }
        matches
    }

    fn candidates<'t>(&'t self, tags: &'t Tags) -> Vec<Candidate<'t>> {
        let mut candidates = Vec::new();
        let mut push = |targets: &[Target], key: &'t str, value: &'t str| {
            candidates.extend(targets.iter().map(|t| Candidate {
                dest: t.dest,
                key,
                value,
                order: t.order,
            }));
        };

        if let Some(targets) = self.index.get(ANY).and_then(|values| values.get(ANY)) {
            push(targets, ANY, ANY);
        }

        for (key, value) in tags {
            let Some(values) = self.index.get(key) else {
                continue;
            };
            if let Some(targets) = values.get(ANY) {
                push(targets, key.as_str(), value.as_str());
            }
            if let Some(targets) = values.get(value) {
                push(targets, key.as_str(), value.as_str());
            }
            if value.contains(';') {
                for sub_value in split_tag_values(value) {
                    let Some(targets) = values.get(sub_value) else {
                        continue;
                    };
                    let split: Vec<Target> = targets
                        .iter()
                        .copied()
                        .filter(|t| {
                            self.tables[self.dests[t.dest].rules].split.split.covers(key)
                        })
                        .collect();
                    push(&split, key.as_str(), sub_value);
                }
            }
        }
        candidates
    }
}
