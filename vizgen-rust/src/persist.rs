use crate::{Artifact, EntryKind, PersistError, RegistryEntry, RegistryStore};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, io::AsyncWriteExt};

const MAX_SUFFIX: usize = 100;

/// `viz_<slug>_<YYYYMMDD_HHMMSS>.html`
#[must_use]
pub fn artifact_filename(slug: &str, created_at: &DateTime<Local>) -> String {
    format!("viz_{slug}_{}.html", created_at.format("%Y%m%d_%H%M%S"))
}

fn with_suffix(filename: &str, n: usize) -> String {
    match filename.strip_suffix(".html") {
        Some(stem) => format!("{stem}_{n}.html"),
        None => format!("{filename}_{n}"),
    }
}

/// Registry identity for a new artifact.
#[derive(Debug, Clone)]
pub struct ArtifactMeta {
    pub id: String,
    pub title: String,
    /// Original request text; always kept as an alias.
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub aliases: Vec<String>,
}

/// Writes artifacts under the output directory and points the registry
/// at them.
#[derive(Clone)]
pub struct Persister {
    output_dir: PathBuf,
    url_prefix: String,
    module: String,
    store: Arc<dyn RegistryStore>,
}

impl Persister {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        module: impl Into<String>,
        store: Arc<dyn RegistryStore>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            module: module.into(),
            store,
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn persist(
        &self,
        artifact: &Artifact,
        meta: ArtifactMeta,
    ) -> Result<GenerationResult, PersistError> {
        let filename = self.write_new(artifact).await?;
        let url = if self.url_prefix.is_empty() {
            filename
        } else {
            format!("{}/{filename}", self.url_prefix)
        };

        // Aliases accumulate within the store's update round.
        let stored = self
            .store
            .upsert_with(&meta.id, &|existing| {
                let mut aliases = existing
                    .map(|entry| entry.aliases().to_vec())
                    .unwrap_or_default();
                if !aliases.contains(&meta.prompt) {
                    aliases.push(meta.prompt.clone());
                }
                RegistryEntry::new(meta.id.clone())
                    .with_title(meta.title.clone())
                    .with_aliases(aliases)
                    .with_module(self.module.clone())
                    .with_url(url.clone())
                    .with_kind(EntryKind::Generated)
            })
            .await?;
        tracing::info!(id = %meta.id, url = %url, "artifact persisted");

        Ok(GenerationResult {
            id: meta.id,
            title: meta.title,
            url,
            aliases: stored.aliases().to_vec(),
        })
    }

    /// Create the artifact file without replacing an existing one; a
    /// same-second collision gets a `_2`, `_3`, ... suffix.
    async fn write_new(&self, artifact: &Artifact) -> Result<String, PersistError> {
        let write_error = |path: &Path, source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| write_error(&self.output_dir, err))?;

        let base = artifact_filename(&artifact.concept_slug, &artifact.created_at);
        for n in 1..=MAX_SUFFIX {
            let filename = if n == 1 {
                base.clone()
            } else {
                with_suffix(&base, n)
            };
            let path = self.output_dir.join(&filename);
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(write_error(&path, err)),
            };
            file.write_all(artifact.markup.as_bytes())
                .await
                .map_err(|err| write_error(&path, err))?;
            file.flush().await.map_err(|err| write_error(&path, err))?;
            return Ok(filename);
        }
        Err(PersistError::Exhausted(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(
            artifact_filename("normal_distribution", &at),
            "viz_normal_distribution_20240305_070809.html"
        );
        assert_eq!(
            with_suffix("viz_a_20240305_070809.html", 2),
            "viz_a_20240305_070809_2.html"
        );
    }
}
