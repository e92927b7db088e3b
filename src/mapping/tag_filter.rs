//! Tag reduction before classification.
//!
//! Readers run the filter for the element type on each element so that only
//! tags the mapping can use are kept (or, with `tags.load_all`, all tags but
//! the excluded ones).

use regex::Regex;
use std::collections::{HashMap, HashSet};

use super::matcher::KeySet;
use super::values::mapping_value_matches;
use crate::config::ANY;
use crate::element::Tags;
use crate::utils::{glob_match, is_glob};

pub trait TagFilterer: Send + Sync {
    /// Remove unwanted tags in place. Filtering twice changes nothing.
    fn filter(&self, tags: &mut Tags);

    fn filter_opt(&self, tags: Option<&mut Tags>) {
        if let Some(tags) = tags {
            self.filter(tags);
        }
    }
}

/// Keeps mapped, whitelisted, and include-matching tags.
#[derive(Debug, Clone, Default)]
pub struct MappingTagFilter {
    pub(crate) mappings: HashMap<String, HashSet<String>>,
    pub(crate) extra_tags: HashSet<String>,
    pub(crate) split_keys: KeySet,
    pub(crate) include: Vec<Regex>,
}

impl MappingTagFilter {
    fn keep(&self, key: &str, value: &str) -> bool {
        if let Some(values) = self.mappings.get(key)
            && (values.contains(ANY)
                || mapping_value_matches(values, value, self.split_keys.covers(key)))
        {
            return true;
        }
        self.extra_tags.contains(key) || self.include.iter().any(|re| re.is_match(key))
    }

    /// Tag keys kept regardless of their value.
    pub fn extra_tags(&self) -> impl Iterator<Item = &str> {
        self.extra_tags.iter().map(String::as_str)
    }
}

impl TagFilterer for MappingTagFilter {
    fn filter(&self, tags: &mut Tags) {
        tags.retain(|key, value| {
            let keep = self.keep(key, value);
            if !keep {
                tracing::trace!(key = %key, "dropping tag");
            }
            keep
        });
    }
}

/// Drops excluded keys; used when all tags are loaded.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    keys: HashSet<String>,
    patterns: Vec<String>,
}

impl ExcludeFilter {
    pub fn new<'a>(exclude: impl IntoIterator<Item = &'a String>) -> Self {
        let mut filter = Self::default();
        for key in exclude {
            if is_glob(key) {
                filter.patterns.push(key.clone());
            } else {
                filter.keys.insert(key.clone());
            }
        }
        filter
    }

    fn excluded(&self, key: &str) -> bool {
        self.keys.contains(key) || self.patterns.iter().any(|p| glob_match(p, key))
    }
}

impl TagFilterer for ExcludeFilter {
    fn filter(&self, tags: &mut Tags) {
        tags.retain(|key, _| !self.excluded(key));
    }
}

/// The filter handed out for an element type.
#[derive(Debug, Clone)]
pub enum TagFilter {
    Mapping(MappingTagFilter),
    Exclude(ExcludeFilter),
}

impl TagFilterer for TagFilter {
    fn filter(&self, tags: &mut Tags) {
        match self {
            TagFilter::Mapping(filter) => filter.filter(tags),
            TagFilter::Exclude(filter) => filter.filter(tags),
        }
    }
}
