//! Partial selection inside a stored array.
//!
//! A path is a sequence of [`PathItem`]s applied left to right:
//!
//! - `Index(i)` picks one element of a list (negative counts from the end).
//! - `Range(a, b)` keeps a sub-list and applies the rest of the path to each
//!   of its elements.
//! - `Field(name)` selects a record field. Applied to a list it projects
//!   every element, so `[0, "era", "names"]` yields one name list per era.
//! - `Fields(names)` keeps several fields of a record (projected over lists
//!   the same way).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::metadata::model::json_kind;
use crate::store::error::StoreError;

/// One step of a slicing path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathItem {
    /// A single list element.
    Index(i64),
    /// A half-open sub-list; `None` means the list boundary.
    Range(Option<i64>, Option<i64>),
    /// One record field.
    Field(String),
    /// Several record fields.
    Fields(Vec<String>),
}

impl PathItem {
    /// Range `[start, stop)` over list positions.
    pub fn range(start: usize, stop: usize) -> Self {
        PathItem::Range(Some(to_i64(start)), Some(to_i64(stop)))
    }

    /// Several fields at once.
    pub fn fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        PathItem::Fields(names.into_iter().map(Into::into).collect())
    }
}

fn to_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl From<i64> for PathItem {
    fn from(i: i64) -> Self {
        PathItem::Index(i)
    }
}

impl From<usize> for PathItem {
    fn from(i: usize) -> Self {
        PathItem::Index(to_i64(i))
    }
}

impl From<&str> for PathItem {
    fn from(name: &str) -> Self {
        PathItem::Field(name.to_string())
    }
}

impl From<String> for PathItem {
    fn from(name: String) -> Self {
        PathItem::Field(name)
    }
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::Index(i) => write!(f, "{i}"),
            PathItem::Range(a, b) => {
                if let Some(a) = a {
                    write!(f, "{a}")?;
                }
                f.write_str(":")?;
                if let Some(b) = b {
                    write!(f, "{b}")?;
                }
                Ok(())
            }
            PathItem::Field(name) => write!(f, "{name:?}"),
            PathItem::Fields(names) => write!(f, "{names:?}"),
        }
    }
}

fn render(path: &[PathItem]) -> String {
    let parts: Vec<String> = path.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len_i = to_i64(len);
    let idx = if index < 0 { len_i + index } else { index };
    if (0..len_i).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn resolve_bound(bound: Option<i64>, default: usize, len: usize) -> usize {
    match bound {
        None => default,
        Some(b) if b < 0 => usize::try_from(to_i64(len) + b).unwrap_or(0),
        Some(b) => usize::try_from(b).unwrap_or(usize::MAX).min(len),
    }
}

/// Apply `path` to `value`, returning an owned copy of the selection.
pub fn slice(value: &Value, path: &[PathItem]) -> Result<Value, StoreError> {
    slice_from(value, path, 0)
}

fn slice_from(value: &Value, path: &[PathItem], pos: usize) -> Result<Value, StoreError> {
    let Some(item) = path.get(pos) else {
        return Ok(value.clone());
    };

    match item {
        PathItem::Index(index) => {
            let items = as_list(value, path, pos)?;
            let idx =
                resolve_index(*index, items.len()).ok_or_else(|| StoreError::IndexOutOfBounds {
                    at: render(&path[..=pos]),
                    index: *index,
                    len: items.len(),
                })?;
            slice_from(&items[idx], path, pos + 1)
        }
        PathItem::Range(start, stop) => {
            let items = as_list(value, path, pos)?;
            let a = resolve_bound(*start, 0, items.len());
            let b = resolve_bound(*stop, items.len(), items.len()).max(a);
            items[a..b]
                .iter()
                .map(|v| slice_from(v, path, pos + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        PathItem::Field(name) => match value {
            Value::Object(map) => {
                let field = map.get(name).ok_or_else(|| StoreError::MissingField {
                    at: render(&path[..pos]),
                    field: name.clone(),
                })?;
                slice_from(field, path, pos + 1)
            }
            Value::Array(items) => project(items, path, pos),
            other => Err(not_a_record(other, path, pos)),
        },
        PathItem::Fields(names) => match value {
            Value::Object(map) => {
                let mut selected = Map::with_capacity(names.len());
                for name in names {
                    let field = map.get(name).ok_or_else(|| StoreError::MissingField {
                        at: render(&path[..pos]),
                        field: name.clone(),
                    })?;
                    selected.insert(name.clone(), field.clone());
                }
                slice_from(&Value::Object(selected), path, pos + 1)
            }
            Value::Array(items) => project(items, path, pos),
            other => Err(not_a_record(other, path, pos)),
        },
    }
}

/// Re-apply the field step at `pos` to every list element.
fn project(items: &[Value], path: &[PathItem], pos: usize) -> Result<Value, StoreError> {
    items
        .iter()
        .map(|v| slice_from(v, path, pos))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn as_list<'a>(value: &'a Value, path: &[PathItem], pos: usize) -> Result<&'a [Value], StoreError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::NotAList {
            at: render(&path[..pos]),
            found: json_kind(other),
        }),
    }
}

fn not_a_record(value: &Value, path: &[PathItem], pos: usize) -> StoreError {
    StoreError::NotARecord {
        at: render(&path[..pos]),
        found: json_kind(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Value {
        json!([{
            "offsets": [0, 100, 250],
            "file": [
                {"filename": "a", "era": 0, "prefix": 0, "tree": {"x": [{"seek": 1, "stop": 100, "bytes": 9}]}},
                {"filename": "b", "era": 0, "prefix": 1, "tree": {"x": [{"seek": 2, "stop": 150, "bytes": 8}]}}
            ],
            "era": [
                {"treename": "Events", "names": ["x", "y"]},
                {"treename": "Events", "names": ["y", "z"]}
            ],
            "prefix": ["/p/", "/q/"]
        }])
    }

    fn p(items: Vec<PathItem>) -> Vec<PathItem> {
        items
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let v = slice(&dataset(), &p(vec![0i64.into(), "offsets".into(), (-1i64).into()])).unwrap();
        assert_eq!(v, json!(250));
    }

    #[test]
    fn field_over_list_projects_each_element() {
        let v = slice(&dataset(), &p(vec![0i64.into(), "era".into(), "names".into()])).unwrap();
        assert_eq!(v, json!([["x", "y"], ["y", "z"]]));
    }

    #[test]
    fn range_applies_the_rest_of_the_path_per_element() {
        let path = vec![
            0i64.into(),
            "file".into(),
            PathItem::range(0, 2),
            "tree".into(),
            "x".into(),
        ];
        let v = slice(&dataset(), &path).unwrap();
        assert_eq!(v[1][0]["seek"], 2);
        assert_eq!(v.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn fields_keeps_only_the_requested_columns() {
        let path = vec![
            0i64.into(),
            "file".into(),
            PathItem::range(1, 5),
            PathItem::fields(["filename", "prefix"]),
        ];
        let v = slice(&dataset(), &path).unwrap();
        assert_eq!(v, json!([{"filename": "b", "prefix": 1}]));
    }

    #[test]
    fn open_and_negative_ranges_behave_like_slices() {
        let root = json!([1, 2, 3, 4]);
        assert_eq!(slice(&root, &[PathItem::Range(None, Some(-1))]).unwrap(), json!([1, 2, 3]));
        assert_eq!(slice(&root, &[PathItem::Range(Some(-2), None)]).unwrap(), json!([3, 4]));
        assert_eq!(slice(&root, &[PathItem::Range(Some(3), Some(1))]).unwrap(), json!([]));
    }

    #[test]
    fn errors_name_the_failing_position() {
        let err = slice(&dataset(), &[0i64.into(), "file".into(), 5i64.into()]).unwrap_err();
        match err {
            StoreError::IndexOutOfBounds { at, index, len } => {
                assert_eq!(at, r#"[0, "file", 5]"#);
                assert_eq!(index, 5);
                assert_eq!(len, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = slice(&dataset(), &[0i64.into(), "nope".into()]).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { ref field, .. } if field == "nope"));

        let err = slice(&dataset(), &[0i64.into(), "offsets".into(), "x".into(), 0i64.into()]);
        assert!(matches!(err, Err(StoreError::NotARecord { .. })));
    }
}
