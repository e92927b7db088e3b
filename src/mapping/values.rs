//! `;` separated tag values.

use std::collections::HashSet;

/// Split `a; b;;c` into `[a, b, c]`. Values without `;`, or with nothing
/// but separators and whitespace, come back unchanged.
pub fn split_tag_values(value: &str) -> Vec<&str> {
    if !value.contains(';') {
        return vec![value];
    }
    let parts: Vec<&str> = value
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() { vec![value] } else { parts }
}

/// Whether `tag_value`, or with `split` any of its sub-values, is in `values`.
pub fn mapping_value_matches(values: &HashSet<String>, tag_value: &str, split: bool) -> bool {
    if !split {
        return values.contains(tag_value);
    }
    split_tag_values(tag_value)
        .into_iter()
        .any(|value| values.contains(value))
}
