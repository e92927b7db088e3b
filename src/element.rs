//! OSM elements as handed over by a source reader.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Element {
    pub id: i64,
    #[serde(default)]
    pub tags: Tags,
}

impl Element {
    pub fn new(id: i64, tags: Tags) -> Self {
        Self { id, tags }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub element: Element,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Way {
    pub element: Element,
    pub refs: Vec<i64>,
}

impl Way {
    /// A way is closed when it has at least four refs and its ends coincide.
    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    pub fn code(&self) -> i64 {
        match self {
            MemberType::Node => 0,
            MemberType::Way => 1,
            MemberType::Relation => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub member_type: MemberType,
    pub role: String,
    /// The resolved member, if the reader could find it.
    pub element: Option<Element>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    pub element: Element,
    pub members: Vec<Member>,
}

/// Build a tag map from string pairs.
pub fn build_tag_map<'a, I>(tags: I) -> Tags
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
