//! Error types for the spectrum_mark crate.
//!
//! Every failure is fatal to the job that raised it. The variants carry the path, page or line
//! the user needs in order to fix the input and re-run.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for spectrum_mark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while stamping captions and writing bookmarks.
#[derive(Error, Debug)]
pub enum Error {
    /// The input PDF or the caption file does not exist.
    #[error("File not found: {}", path.display())]
    NotFound {
        /// Path that could not be found.
        path: PathBuf,
    },

    /// The caption file is not valid UTF-8.
    #[error("Caption file {} is not valid UTF-8 (line {line})", path.display())]
    Encoding {
        /// Path of the caption file.
        path: PathBuf,
        /// 1-based line holding the first invalid byte sequence.
        line: usize,
    },

    /// A style or job parameter was rejected.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// An input file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// Path of the file being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The input PDF could not be parsed.
    #[error("Failed to load PDF {}: {source}", path.display())]
    Load {
        /// Path of the input document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: lopdf::Error,
    },

    /// Stamping the caption onto a page failed.
    #[error("Failed to stamp page {page}: {reason}")]
    Render {
        /// 1-based page number.
        page: usize,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// The bookmark outline could not be written into the document.
    #[error("Failed to write bookmark outline: {reason}")]
    Outline {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Serialising the document or writing the output file failed.
    #[error("Failed to write output {}: {source}", path.display())]
    Write {
        /// Path of the output document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Flat classification of [`Error`] values, reported with the completion signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::Encoding`].
    Encoding,
    /// See [`Error::InvalidParameter`].
    InvalidParameter,
    /// See [`Error::Read`].
    Read,
    /// See [`Error::Load`].
    Load,
    /// See [`Error::Render`].
    Render,
    /// See [`Error::Outline`].
    Outline,
    /// See [`Error::Write`].
    Write,
}

/// Pipeline stage in which an error was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Captions, style and input document are being loaded.
    Loading,
    /// Pages are being stamped.
    Processing,
    /// The outline is being built and the output serialised.
    Finalizing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Processing => "processing",
            Self::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Maps a failed read of an input file to [`Error::NotFound`] or [`Error::Read`].
    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            _ => Self::Read {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn render(page: usize, reason: impl Into<String>) -> Self {
        Self::Render {
            page,
            reason: reason.into(),
        }
    }

    pub(crate) fn outline(reason: impl Into<String>) -> Self {
        Self::Outline {
            reason: reason.into(),
        }
    }

    /// Returns the flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::Read { .. } => ErrorKind::Read,
            Self::Load { .. } => ErrorKind::Load,
            Self::Render { .. } => ErrorKind::Render,
            Self::Outline { .. } => ErrorKind::Outline,
            Self::Write { .. } => ErrorKind::Write,
        }
    }

    /// Returns the stage of the job in which this error is raised.
    pub fn stage(&self) -> Stage {
        match self {
            Self::NotFound { .. }
            | Self::Encoding { .. }
            | Self::InvalidParameter { .. }
            | Self::Read { .. }
            | Self::Load { .. } => Stage::Loading,
            Self::Render { .. } => Stage::Processing,
            Self::Outline { .. } | Self::Write { .. } => Stage::Finalizing,
        }
    }

    /// Returns the 1-based page the error refers to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::Render { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Returns the 1-based caption line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Encoding { line, .. } => Some(*line),
            _ => None,
        }
    }
}
