//! Flattening nested metadata into dot-path leaves and back.
//!
//! Mappings are walked recursively; every non-mapping value (scalars, lists) and every
//! empty mapping becomes one leaf keyed by its joined path. A literal `.` or `\` inside
//! a key is escaped with `\` so [`unflatten`] can restore the exact structure.
//!
//! The walk tracks the containers on the current descent path. Reaching a container
//! that is already on the path substitutes [`CIRCULAR_REFERENCE_SENTINEL`] instead of
//! recursing. Identities are pointer addresses, so the walk never owns what it visits.

use serde_json::{Map, Value};
use tracing::warn;

use super::Deadline;
use super::merge::MergeError;
use crate::constants::CIRCULAR_REFERENCE_SENTINEL;

/// A metadata tree that can be flattened.
///
/// Implemented for plain JSON values and for [`SharedValue`](super::shared::SharedValue)
/// graphs, which may alias or cycle.
pub trait MetadataNode: Sized {
    /// Identity of a mapping container. `None` for anything else.
    fn container_id(&self) -> Option<usize>;

    /// Child entries when this node is a mapping.
    fn entries(&self) -> Option<Vec<(String, Self)>>;

    /// This node as a leaf value.
    fn to_leaf(&self) -> Value;
}

impl MetadataNode for &Value {
    fn container_id(&self) -> Option<usize> {
        match *self {
            Value::Object(map) => Some(map as *const Map<String, Value> as usize),
            _ => None,
        }
    }

    fn entries(&self) -> Option<Vec<(String, Self)>> {
        match *self {
            Value::Object(map) => Some(map.iter().map(|(k, v)| (k.clone(), v)).collect()),
            _ => None,
        }
    }

    fn to_leaf(&self) -> Value {
        (*self).clone()
    }
}

/// Flatten `root` into a map of escaped dot-paths.
///
/// A non-mapping root flattens to an empty map. Fails only when `deadline` expires.
pub fn flatten<N: MetadataNode>(
    root: &N,
    deadline: &Deadline,
) -> Result<Map<String, Value>, MergeError> {
    let mut out = Map::new();
    if root.entries().is_none() {
        return Ok(out);
    }
    let mut path = Vec::new();
    walk(root, None, &mut path, &mut out, deadline)?;
    Ok(out)
}

/// `prefix` is `None` only for the root mapping.
fn walk<N: MetadataNode>(
    node: &N,
    prefix: Option<&str>,
    on_path: &mut Vec<usize>,
    out: &mut Map<String, Value>,
    deadline: &Deadline,
) -> Result<(), MergeError> {
    deadline.check()?;

    let entries = match (node.entries(), prefix) {
        (Some(entries), _) if !entries.is_empty() || prefix.is_none() => entries,
        (_, Some(leaf_path)) => {
            out.insert(leaf_path.to_string(), node.to_leaf());
            return Ok(());
        }
        (_, None) => return Ok(()),
    };
    let here = prefix.unwrap_or("");

    let id = node.container_id();
    if let Some(id) = id {
        if on_path.contains(&id) {
            warn!("Circular reference at '{here}' replaced with sentinel");
            out.insert(here.to_string(), Value::String(CIRCULAR_REFERENCE_SENTINEL.to_string()));
            return Ok(());
        }
        on_path.push(id);
    }

    for (key, child) in entries {
        let escaped = escape_key(&key);
        let child_path = match prefix {
            None => escaped,
            Some(parent) => format!("{parent}.{escaped}"),
        };
        walk(&child, Some(&child_path), on_path, out, deadline)?;
    }

    if id.is_some() {
        on_path.pop();
    }
    Ok(())
}

/// Rebuild the nested mapping from flattened paths.
///
/// When a path runs through an existing leaf, the leaf is replaced by a mapping.
pub fn unflatten(flat: &Map<String, Value>) -> Value {
    let mut root = Map::new();
    for (path, value) in flat {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        let mut cursor = &mut root;
        for segment in parents {
            let slot =
                cursor.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cursor = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        cursor.insert(last.clone(), value.clone());
    }
    Value::Object(root)
}

pub fn escape_key(key: &str) -> String {
    if !key.contains(['.', '\\']) {
        return key.to_string();
    }
    key.replace('\\', "\\\\").replace('.', "\\.")
}

/// Split an escaped path on unescaped dots and unescape each segment.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Byte offsets of every unescaped `.` in `path`.
pub(crate) fn separator_offsets(path: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut escaped = false;
    for (i, c) in path.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '.' => offsets.push(i),
            _ => {}
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn deadline() -> Deadline {
        Deadline::new("flatten", Duration::from_secs(5))
    }

    #[test]
    fn test_flatten_nested() {
        let data = json!({
            "client": {"name": "Acme", "address": {"city": "Paris"}},
            "parties": ["a", "b"],
            "empty": {},
            "n": 1,
        });
        let flat = flatten(&&data, &deadline()).unwrap();
        assert_eq!(
            Value::Object(flat),
            json!({
                "client.name": "Acme",
                "client.address.city": "Paris",
                "parties": ["a", "b"],
                "empty": {},
                "n": 1,
            })
        );
    }

    #[test]
    fn test_round_trip_with_dotted_keys() {
        let data = json!({
            "version.major": {"a\\b": 1, "x": [ {"y": 2} ]},
            "plain": {"deep": {"deeper": null}},
            "": "empty key",
        });
        let flat = flatten(&&data, &deadline()).unwrap();
        assert!(flat.contains_key(r"version\.major.a\\b"));
        assert_eq!(unflatten(&flat), data);
    }

    #[test]
    fn test_non_mapping_root() {
        assert!(flatten(&&json!("scalar"), &deadline()).unwrap().is_empty());
        assert_eq!(unflatten(&Map::new()), json!({}));
    }

    #[test]
    fn test_expired_deadline() {
        let expired = Deadline::new("flatten", Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = flatten(&&json!({"a": 1}), &expired).unwrap_err();
        assert!(err.to_string().contains("flatten"));
    }

    #[test]
    fn test_split_path_and_offsets() {
        assert_eq!(split_path(r"a\.b.c"), ["a.b", "c"]);
        assert_eq!(split_path("single"), ["single"]);
        assert_eq!(separator_offsets(r"a\.b.c.d"), [4, 6]);
    }
}
