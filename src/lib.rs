//! Core entry point for the spectrum_mark crate.
//!
//! Stamps one caption per page onto a PDF and writes a flat bookmark outline that mirrors the
//! captions, so every labelled spectrum page can be reached from the outline panel.

pub mod annotate;
pub mod bookmarks;
pub mod captions;
pub mod error;
pub mod fonts;
pub mod job;
pub mod style;

pub use error::{Error, ErrorKind, Result, Stage};
pub use job::{CancellationToken, JobOutcome, JobParameters, JobReport, JobResult, JobRunner};

/// Runs `params` with a default [`JobRunner`].
pub fn run(params: &JobParameters) -> JobResult {
    JobRunner::new().run(params)
}
