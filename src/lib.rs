//! Coursefetch Core Library
//!
//! Resilient, resumable downloading of course content behind an
//! authenticated session.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Retrying request client and resumable transfer engine
//! - [`auth`] - Session establishment, login handshake and persistence
//! - [`config`] - Runtime limits and the JSON config file
//! - [`course`] - Course catalogs and the sequential run loop
//! - [`filename`] - Filesystem-safe target names

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod course;
pub mod download;
pub mod filename;
#[cfg(test)]
mod test_support;
mod user_agent;

// Re-export commonly used types
pub use auth::{AuthError, Session, SessionManager, SessionRequest, SiteEndpoints};
pub use config::{ConfigStore, FileConfig, RuntimeConfig};
pub use course::{CourseCatalog, CourseRunner, ManifestCatalog, RunOptions, RunReport};
pub use download::{
    DownloadError, DownloadTask, FailureType, RequestClient, RequestOptions, RetryPolicy,
    TransferEngine, TransferStatus,
};
