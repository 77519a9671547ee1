//! Core data types shared by the merger, the retriever and the search layer.

use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// Namespace used when a repository path carries a single segment.
pub const DEFAULT_NAMESPACE: &str = "library";

/// A namespace-qualified repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    pub namespace: String,
    pub name: String,
}

impl Repository {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        let namespace = namespace.into();
        let name = name.into();
        validate_name_part(&namespace, "namespace")?;
        validate_name_part(&name, "repository")?;
        Ok(Self { namespace, name })
    }

    /// Parse a repository path as it appears in a URL.
    ///
    /// `busybox` resolves to `library/busybox`; `acme/web` to namespace
    /// `acme`, name `web`. Trailing slashes are ignored.
    ///
    /// The path is split on the first `/` only, and the name must be a
    /// single segment: `acme/web/extra` is rejected with
    /// [`AppError::BadRequest`] instead of naming repository `web/extra`.
    pub fn parse(path: &str) -> AppResult<Self> {
        let trimmed = path.trim_end_matches('/');
        match trimmed.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new(DEFAULT_NAMESPACE, trimmed),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn validate_name_part(value: &str, what: &str) -> AppResult<()> {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap_or_else(|e| {
            panic!("Failed to compile repository name regex: {}", e)
        })
    });

    if re.is_match(value) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid {what} name: '{value}'")))
    }
}

/// One entry of a repository's image index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(id: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            checksum: Some(checksum.into()),
        }
    }

    /// A checksum counts as set only when it is present and non-empty.
    pub fn has_checksum(&self) -> bool {
        self.checksum.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// The image records of one repository, keyed by id.
///
/// Serialized as a JSON array. Iteration follows first insertion, which keeps
/// the persisted document stable across merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageList {
    records: IndexMap<String, ImageRecord>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace the record stored under its id.
    pub fn upsert(&mut self, record: ImageRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.values()
    }

    pub fn first(&self) -> Option<&ImageRecord> {
        self.records.values().next()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.iter()
                .filter_map(|record| serde_json::to_value(record).ok())
                .collect(),
        )
    }
}

impl Serialize for ImageList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.values())
    }
}

impl FromIterator<ImageRecord> for ImageList {
    fn from_iter<T: IntoIterator<Item = ImageRecord>>(iter: T) -> Self {
        let mut list = ImageList::new();
        for record in iter {
            list.upsert(record);
        }
        list
    }
}

/// An opaque search hit. Only the `name` field is interpreted, as the
/// repository identity used for de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResultEntry(Map<String, Value>);

impl SearchResultEntry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convenience constructor for the `{name, description}` shape produced
    /// by the bundled backends.
    pub fn repository(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name.into()));
        fields.insert("description".to_string(), Value::String(description.into()));
        Self(fields)
    }

    /// Wrap a JSON value, accepting objects only.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Repository identity (`namespace/name`) of this hit, if it carries one.
    pub fn repository_key(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Body returned by `/v1/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    query: String,
    num_results: usize,
    results: Vec<SearchResultEntry>,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, results: Vec<SearchResultEntry>) -> Self {
        Self {
            query: query.into(),
            num_results: results.len(),
            results,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    pub fn results(&self) -> &[SearchResultEntry] {
        &self.results
    }
}
