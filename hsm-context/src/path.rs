//! Dot-path navigation over `serde_json::Value`.
//!
//! A path like `a.b.0.c` is a sequence of segments, each either a map key or
//! an array index; navigation descends through `Value::Object`/`Value::Array`
//! nodes accordingly.

use serde_json::{Map, Value as Json};
use std::fmt;

/// One step of a dot-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(i) => PathSegment::Index(i),
            Err(_) => PathSegment::Key(raw.to_string()),
        }
    }
}

/// Failure during path navigation or mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    IndexOutOfRange { segment: String, len: usize },
    NotIndexable { segment: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "empty path"),
            PathError::IndexOutOfRange { segment, len } => {
                write!(f, "index '{segment}' out of range (len {len})")
            }
            PathError::NotIndexable { segment } => {
                write!(f, "cannot navigate into scalar at '{segment}'")
            }
        }
    }
}

impl std::error::Error for PathError {}

fn segments(dotted_path: &str) -> Vec<PathSegment> {
    dotted_path.split('.').map(PathSegment::parse).collect()
}

/// Read a value by dot-path. `Err` means the path could not be navigated at
/// all (type mismatch mid-path); a missing leaf key/index returns `Ok` with
/// the caller treating `None`... actually returns `Err` uniformly so callers
/// use `.ok()` to collapse "missing" and "malformed" into `Option`.
pub fn navigate<'a>(root: &'a Json, dotted_path: &str) -> Result<&'a Json, PathError> {
    let segs = segments(dotted_path);
    if segs.is_empty() {
        return Err(PathError::Empty);
    }
    let mut current = root;
    for seg in &segs {
        current = match (current, seg) {
            (Json::Object(map), PathSegment::Key(key)) => {
                map.get(key).ok_or(PathError::NotIndexable {
                    segment: key.clone(),
                })?
            }
            (Json::Array(items), PathSegment::Index(i)) => {
                items.get(*i).ok_or(PathError::IndexOutOfRange {
                    segment: i.to_string(),
                    len: items.len(),
                })?
            }
            (_, PathSegment::Key(key)) => {
                return Err(PathError::NotIndexable {
                    segment: key.clone(),
                })
            }
            (_, PathSegment::Index(i)) => {
                return Err(PathError::NotIndexable {
                    segment: i.to_string(),
                })
            }
        };
    }
    Ok(current)
}

/// Write a value at a dot-path, creating intermediate objects (never
/// arrays — array growth by path is not supported) as needed.
pub fn write(root: &mut Json, dotted_path: &str, value: Json) -> Result<(), PathError> {
    let segs = segments(dotted_path);
    if segs.is_empty() {
        return Err(PathError::Empty);
    }
    write_segments(root, &segs, value)
}

fn write_segments(current: &mut Json, segs: &[PathSegment], value: Json) -> Result<(), PathError> {
    let (head, rest) = segs.split_first().expect("segs checked non-empty by caller");

    if rest.is_empty() {
        match (current, head) {
            (Json::Object(map), PathSegment::Key(key)) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            (Json::Array(items), PathSegment::Index(i)) => {
                if *i < items.len() {
                    items[*i] = value;
                    Ok(())
                } else if *i == items.len() {
                    items.push(value);
                    Ok(())
                } else {
                    Err(PathError::IndexOutOfRange {
                        segment: i.to_string(),
                        len: items.len(),
                    })
                }
            }
            (slot @ Json::Null, PathSegment::Key(key)) => {
                let mut map = Map::new();
                map.insert(key.clone(), value);
                *slot = Json::Object(map);
                Ok(())
            }
            (_, PathSegment::Key(key)) => Err(PathError::NotIndexable {
                segment: key.clone(),
            }),
            (_, PathSegment::Index(i)) => Err(PathError::NotIndexable {
                segment: i.to_string(),
            }),
        }
    } else {
        match head {
            PathSegment::Key(key) => {
                if matches!(current, Json::Null) {
                    *current = Json::Object(Map::new());
                }
                let Json::Object(map) = current else {
                    return Err(PathError::NotIndexable {
                        segment: key.clone(),
                    });
                };
                let slot = map.entry(key.clone()).or_insert(Json::Null);
                write_segments(slot, rest, value)
            }
            PathSegment::Index(i) => {
                let Json::Array(items) = current else {
                    return Err(PathError::NotIndexable {
                        segment: i.to_string(),
                    });
                };
                let slot = items.get_mut(*i).ok_or(PathError::IndexOutOfRange {
                    segment: i.to_string(),
                    len: items.len(),
                })?;
                write_segments(slot, rest, value)
            }
        }
    }
}

/// Remove the value at a dot-path, returning it if present.
pub fn remove(root: &mut Json, dotted_path: &str) -> Option<Json> {
    let segs = segments(dotted_path);
    let (last, parents) = segs.split_last()?;
    let mut current = root;
    for seg in parents {
        current = match (current, seg) {
            (Json::Object(map), PathSegment::Key(key)) => map.get_mut(key)?,
            (Json::Array(items), PathSegment::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    match (current, last) {
        (Json::Object(map), PathSegment::Key(key)) => map.remove(key),
        (Json::Array(items), PathSegment::Index(i)) if *i < items.len() => {
            Some(items.remove(*i))
        }
        _ => None,
    }
}
