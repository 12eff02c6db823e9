use crate::{normalize, RegistryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;

const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Provenance of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryKind {
    Generated,
    Curated,
    Other(String),
}

impl From<String> for EntryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "generated" => Self::Generated,
            "curated" => Self::Curated,
            _ => Self::Other(value),
        }
    }
}

impl From<EntryKind> for String {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Generated => "generated".to_string(),
            EntryKind::Curated => "curated".to_string(),
            EntryKind::Other(value) => value,
        }
    }
}

/// One cached visualization. Fields absent in the file stay absent when the
/// registry is written back; unknown fields are carried through `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = Some(aliases.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        self.aliases.as_deref().unwrap_or_default()
    }

    /// Overwrite every field `other` carries, keeping the rest.
    fn merge(&mut self, other: Self) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.aliases.is_some() {
            self.aliases = other.aliases;
        }
        if other.module.is_some() {
            self.module = other.module;
        }
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.kind.is_some() {
            self.kind = other.kind;
        }
        self.extra.extend(other.extra);
    }
}

/// The persisted list of entries, in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub concepts: Vec<RegistryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Registry {
    /// Replace the fields of the entry with the same `id`, or append.
    /// Returns whether an existing entry was updated.
    pub fn upsert(&mut self, entry: RegistryEntry) -> bool {
        if let Some(existing) = self.concepts.iter_mut().find(|e| e.id == entry.id) {
            existing.merge(entry);
            true
        } else {
            self.concepts.push(entry);
            false
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.concepts.iter().find(|entry| entry.id == id)
    }

    /// Entries whose normalized title or any alias contains the normalized
    /// query. No query, or a blank one, lists everything.
    #[must_use]
    pub fn query(&self, q: Option<&str>) -> Vec<RegistryEntry> {
        let needle = q.map(normalize).unwrap_or_default();
        if needle.is_empty() {
            return self.concepts.clone();
        }

        self.concepts
            .iter()
            .filter(|entry| {
                normalize(entry.title()).contains(&needle)
                    || entry
                        .aliases()
                        .iter()
                        .any(|alias| normalize(alias).contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, RegistryError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty JSON with non-ASCII text left unescaped.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Current registry. A missing or unreadable store yields an empty one.
    async fn load(&self) -> Registry;

    /// Overwrite the whole registry.
    async fn save(&self, registry: &Registry) -> Result<(), RegistryError>;

    /// Build the update for entry `id` from its current state and merge it
    /// in, all within one read-modify-write round. `update` may run more
    /// than once if the store changes underneath it. Returns the stored
    /// entry.
    async fn upsert_with(
        &self,
        id: &str,
        update: &(dyn for<'e> Fn(Option<&'e RegistryEntry>) -> RegistryEntry + Send + Sync),
    ) -> Result<RegistryEntry, RegistryError>;

    /// Insert or update one entry without losing concurrent changes.
    async fn upsert(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let id = entry.id.clone();
        self.upsert_with(&id, &|_| entry.clone()).await?;
        Ok(())
    }
}

/// Registry kept in a single JSON file. Writes go through a temporary file
/// and a rename; `upsert` is a compare-and-swap on the file's digest.
pub struct JsonFileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
    max_attempts: usize,
}

struct Snapshot {
    bytes: Option<Vec<u8>>,
    digest: Vec<u8>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Number of read-modify-write rounds before `upsert` reports a conflict.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn snapshot(&self) -> Result<Snapshot, RegistryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        let digest = Sha256::digest(bytes.as_deref().unwrap_or_default()).to_vec();
        Ok(Snapshot { bytes, digest })
    }

    fn parse(&self, bytes: Option<&[u8]>) -> Registry {
        let Some(bytes) = bytes else {
            return Registry::default();
        };
        match Registry::from_slice(bytes) {
            Ok(registry) => registry,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "registry file is malformed, starting from an empty registry"
                );
                Registry::default()
            }
        }
    }

    async fn write_atomic(&self, contents: &str) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "registry.json".into());
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, contents).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for JsonFileRegistry {
    async fn load(&self) -> Registry {
        match self.snapshot().await {
            Ok(snapshot) => self.parse(snapshot.bytes.as_deref()),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "registry file is unreadable, starting from an empty registry"
                );
                Registry::default()
            }
        }
    }

    async fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        let contents = registry.to_json()?;
        let _guard = self.write_lock.lock().await;
        self.write_atomic(&contents).await
    }

    async fn upsert_with(
        &self,
        id: &str,
        update: &(dyn for<'e> Fn(Option<&'e RegistryEntry>) -> RegistryEntry + Send + Sync),
    ) -> Result<RegistryEntry, RegistryError> {
        for attempt in 1..=self.max_attempts {
            let before = self.snapshot().await?;
            let mut registry = self.parse(before.bytes.as_deref());
            let mut entry = update(registry.get(id));
            entry.id = id.to_string();
            let replaced = registry.upsert(entry.clone());
            let stored = registry.get(id).cloned().unwrap_or(entry);
            let contents = registry.to_json()?;

            let guard = self.write_lock.lock().await;
            let current = self.snapshot().await?;
            if current.digest == before.digest {
                self.write_atomic(&contents).await?;
                drop(guard);
                tracing::debug!(id, replaced, attempt, "registry entry upserted");
                return Ok(stored);
            }
            drop(guard);
            tracing::debug!(id, attempt, "registry changed during upsert, retrying");
        }

        Err(RegistryError::Conflict {
            attempts: self.max_attempts,
        })
    }
}
