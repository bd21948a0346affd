//! Error types for catalogs and course runs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading a course's chapter list.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No manifest exists for the course.
    #[error("no manifest for course '{course_id}' at {path}")]
    NotFound {
        /// Requested course.
        course_id: String,
        /// Where the manifest was expected.
        path: PathBuf,
    },

    /// The manifest could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("invalid manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The course identifier cannot name a manifest file.
    #[error("invalid course identifier '{course_id}'")]
    InvalidCourseId {
        /// Rejected identifier.
        course_id: String,
    },
}

/// Errors that stop a course run before any file is attempted.
#[derive(Debug, Error)]
pub enum RunError {
    /// The session has not passed a profile probe.
    #[error("refusing to start: session is not authenticated")]
    Unauthenticated,

    /// The chapter list could not be loaded.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl RunError {
    /// Stable machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "SESSION_MISSING",
            Self::Catalog(_) => "CATALOG",
        }
    }

    /// Concrete remediation step for the operator.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Sign in first: pass --cookie, or --email with --password.",
            Self::Catalog(CatalogError::NotFound { .. }) => {
                "Check the course identifier and --manifest-dir."
            }
            Self::Catalog(_) => "Fix the course manifest file, then re-run.",
        }
    }
}
