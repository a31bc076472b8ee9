//! References to data stored outside of the result store.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::hash::Hash20;

/// A reference to externally stored data, canonically a file.
///
/// Two artifacts are equal when they point at the same location and carry
/// the same content hash; creation date and metadata are ignored. The hash
/// is computed once, when a file artifact is created, so a changed file is
/// only noticed by creating a new `Artifact` for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub location: Utf8PathBuf,
    pub date_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Json>,
}

impl Artifact {
    /// An artifact without a content hash, for data the engine can't read
    /// (remote objects, database tables, ...).
    pub fn new(location: impl Into<Utf8PathBuf>) -> Self {
        Self {
            location: location.into(),
            date_created: Utc::now(),
            hash: None,
            metadata: Map::new(),
        }
    }

    /// A file artifact. If the file exists its SHA-1 is computed right away;
    /// a missing or unreadable file leaves the hash empty.
    pub fn file(location: impl Into<Utf8PathBuf>) -> Self {
        let mut artifact = Self::new(location);
        artifact.hash = hash_if_present(&artifact.location);
        artifact
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_date_created(mut self, date: DateTime<Utc>) -> Self {
        self.date_created = date;
        self
    }

    pub fn location(&self) -> &Utf8Path {
        &self.location
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.hash == other.hash
    }
}

impl Eq for Artifact {}

fn hash_if_present(path: &Utf8Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }

    match Hash20::hash_file(path) {
        Ok(hash) => Some(hash.to_hex()),
        Err(err) => {
            tracing::warn!("couldn't hash artifact {}: {}", path, err);
            None
        }
    }
}
