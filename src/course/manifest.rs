//! JSON manifest catalog.
//!
//! A manifest is `<dir>/<course_id>.json` holding either a bare chapter
//! array or an object with a `chapters` array.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{Chapter, CatalogError, CourseCatalog};

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Chapters(Vec<Chapter>),
    Course { chapters: Vec<Chapter> },
}

/// Reads course structure from JSON files in one directory.
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    dir: PathBuf,
}

impl ManifestCatalog {
    /// Catalog rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Manifest directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self, course_id: &str) -> Result<PathBuf, CatalogError> {
        let valid = !course_id.is_empty()
            && course_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !course_id.starts_with('.');
        if !valid {
            return Err(CatalogError::InvalidCourseId {
                course_id: course_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{course_id}.json")))
    }
}

#[async_trait]
impl CourseCatalog for ManifestCatalog {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn chapters(&self, course_id: &str) -> Result<Vec<Chapter>, CatalogError> {
        let path = self.manifest_path(course_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound {
                    course_id: course_id.to_string(),
                    path,
                });
            }
            Err(source) => return Err(CatalogError::Io { path, source }),
        };

        let manifest: ManifestFile = serde_json::from_str(&raw).map_err(|source| {
            CatalogError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        let chapters = match manifest {
            ManifestFile::Chapters(chapters) | ManifestFile::Course { chapters } => chapters,
        };
        debug!(chapters = chapters.len(), "manifest loaded");
        Ok(chapters)
    }
}
