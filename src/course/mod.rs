//! Course structure and the sequential run loop.
//!
//! # Architecture
//!
//! - [`CourseCatalog`] - Async trait that supplies a course's chapters
//! - [`ManifestCatalog`] - Catalog backed by `<dir>/<course_id>.json`
//! - [`CourseRunner`] - Walks chapters and units, one file at a time

mod error;
mod manifest;
mod runner;

pub use error::{CatalogError, RunError};
pub use manifest::ManifestCatalog;
pub use runner::{CourseRunner, FileFailure, RunOptions, RunReport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chapter of a course, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title.
    pub title: String,
    /// Lecture units, in display order.
    #[serde(default)]
    pub units: Vec<LectureUnit>,
}

/// One lecture and the files attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LectureUnit {
    /// Unit title.
    pub title: String,
    /// Page the unit's resources were found on; sent as `Referer`.
    #[serde(default)]
    pub page_url: Option<String>,
    /// Main media URL.
    #[serde(default)]
    pub media: Option<String>,
    /// Subtitle tracks.
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
    /// Supplementary files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// One subtitle track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Language tag, e.g. `en`.
    pub language: String,
    /// Track URL.
    pub url: String,
}

/// One supplementary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name; the URL's last segment is used when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// File URL.
    pub url: String,
}

/// Source of a course's chapter list.
///
/// This trait uses `async_trait` so runners can hold `&dyn CourseCatalog`.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Returns the chapters of `course_id` in display order.
    async fn chapters(&self, course_id: &str) -> Result<Vec<Chapter>, CatalogError>;
}
