//! Entity keys and canonical hashing.
//!
//! An [`EntityKey`] is the structured path of a remote document or query:
//! an ordered list of segments, some of which may be filter objects. Before a
//! key can address a cache entry or a remote subscription it must pass
//! [`EntityKey::validate`], which rejects keys with a [`KeySegment::Missing`]
//! segment ("not ready yet"). Only a [`ValidKey`] can be hashed, so hashing an
//! unvalidated key is unrepresentable.
//!
//! The hash is the canonical JSON of the segment list: object keys are sorted
//! recursively, so two filters that differ only in property insertion order
//! produce the same [`HashedKey`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// One segment of an entity path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeySegment {
    /// A collection or document id.
    Id(String),
    /// A structured filter (query constraints, search options, ...).
    Filter(Value),
    /// A required segment that is not known yet, e.g. an id still loading.
    Missing,
}

impl KeySegment {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn filter(value: Value) -> Self {
        Self::Filter(value)
    }

    /// Build a filter segment from any serializable value.
    ///
    /// `None` fields serialize as `null`, which is how absent values inside
    /// a filter are normalized.
    pub fn try_filter<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Filter)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    fn canonical_value(&self) -> Value {
        match self {
            Self::Id(id) => Value::String(id.clone()),
            Self::Filter(value) => canonicalize(value.clone()),
            Self::Missing => Value::Null,
        }
    }
}

impl From<&str> for KeySegment {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<&String> for KeySegment {
    fn from(id: &String) -> Self {
        Self::Id(id.clone())
    }
}

impl<S: Into<String>> From<Option<S>> for KeySegment {
    fn from(id: Option<S>) -> Self {
        match id {
            Some(id) => Self::Id(id.into()),
            None => Self::Missing,
        }
    }
}

impl From<Value> for KeySegment {
    fn from(value: Value) -> Self {
        Self::Filter(value)
    }
}

/// Structured path of a cached entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityKey {
    segments: Vec<KeySegment>,
}

impl EntityKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }

    /// Append a segment, builder style.
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when no segment is missing.
    pub fn is_ready(&self) -> bool {
        !self.segments.iter().any(KeySegment::is_missing)
    }

    /// Validate the key and compute its canonical hash.
    ///
    /// Returns `None` for keys that are not ready yet (or empty). Callers
    /// treat `None` as "no-op", never as an error.
    pub fn validate(&self) -> Option<ValidKey> {
        if self.segments.is_empty() || !self.is_ready() {
            return None;
        }
        let hashed = hash_segments(&self.segments);
        Some(ValidKey {
            key: self.clone(),
            hashed,
        })
    }
}

impl FromIterator<KeySegment> for EntityKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<KeySegment>> for EntityKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }
}

impl<S: Into<KeySegment>, const N: usize> From<[S; N]> for EntityKey {
    fn from(segments: [S; N]) -> Self {
        segments.into_iter().map(Into::into).collect()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                KeySegment::Id(id) => f.write_str(id)?,
                KeySegment::Filter(_) => write!(f, "{}", segment.canonical_value())?,
                KeySegment::Missing => f.write_str("<missing>")?,
            }
        }
        Ok(())
    }
}

/// A key that passed validation, together with its canonical hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidKey {
    key: EntityKey,
    hashed: HashedKey,
}

impl ValidKey {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn hash(&self) -> &HashedKey {
        &self.hashed
    }

    pub fn into_hash(self) -> HashedKey {
        self.hashed
    }

    /// Slash-joined document path, as the remote store addresses it.
    pub fn path(&self) -> String {
        self.key.to_string()
    }
}

impl fmt::Display for ValidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}

/// Canonical string form of a validated key; the cache map's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashedKey(String);

impl HashedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for HashedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HashedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn hash_segments(segments: &[KeySegment]) -> HashedKey {
    let canonical = Value::Array(segments.iter().map(KeySegment::canonical_value).collect());
    HashedKey(canonical.to_string())
}

/// Rebuild a JSON value with object keys sorted recursively.
///
/// Entries are reinserted in sorted order so the result is canonical whether
/// or not `serde_json` preserves insertion order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
