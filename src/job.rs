//! Job orchestration: captions and style in, stamped and bookmarked PDF out.
//!
//! A job moves through `Idle → Loading → Processing(page i of N) → Finalizing` and ends in
//! `Done`, `Failed` or `Cancelled`. The output file is written once, after every page has been
//! stamped and the outline built; a failed or cancelled job leaves no output behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use lopdf::Document;
use serde::{Deserialize, Serialize};

use crate::annotate::{PageAnnotator, PageJob};
use crate::bookmarks;
use crate::captions;
use crate::error::{Error, ErrorKind, Result, Stage};
use crate::style::{self, StyleParameters};

/// Everything one run needs, fixed before the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    /// PDF to annotate. Never modified.
    pub input_path: PathBuf,
    /// UTF-8 text file with one caption per line.
    pub caption_path: PathBuf,
    /// Where the annotated PDF is written. Must differ from `input_path`.
    pub output_path: PathBuf,
    /// Caption style as supplied by the user.
    #[serde(default)]
    pub style: StyleParameters,
}

impl JobParameters {
    /// Creates parameters with the default caption style.
    pub fn new(
        input_path: impl Into<PathBuf>,
        caption_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            caption_path: caption_path.into(),
            output_path: output_path.into(),
            style: StyleParameters::default(),
        }
    }

    /// Replaces the caption style.
    pub fn with_style(mut self, style: StyleParameters) -> Self {
        self.style = style;
        self
    }

    /// Parses a JSON job descriptor.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| {
            Error::invalid_parameter("job", format!("malformed job descriptor: {err}"))
        })
    }

    /// Reads a JSON job descriptor from `path`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
        Self::from_json_str(&json)
    }
}

/// Observable state of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Not started.
    Idle,
    /// Reading captions, style and the input document.
    Loading,
    /// Stamping `page` of `total`.
    Processing {
        /// 1-based page being stamped.
        page: usize,
        /// Number of pages in the document.
        total: usize,
    },
    /// Building the outline and writing the output.
    Finalizing,
    /// Output written.
    Done,
    /// The job stopped with an error.
    Failed {
        /// Kind of the error.
        kind: ErrorKind,
        /// Stage in which it was raised.
        stage: Stage,
    },
    /// The job was cancelled between two pages.
    Cancelled,
}

/// Receives every state transition of a running job.
pub trait JobObserver: Send {
    /// Called after the job entered `state`.
    fn on_state(&mut self, state: &JobState);
}

impl<F> JobObserver for F
where
    F: FnMut(&JobState) + Send,
{
    fn on_state(&mut self, state: &JobState) {
        self(state)
    }
}

/// Cooperative cancellation flag, checked by the runner at every page boundary.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every job holding a clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Summary of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    /// Path of the written document.
    pub output_path: PathBuf,
    /// Pages in the document.
    pub page_count: usize,
    /// Lines in the caption file.
    pub caption_count: usize,
    /// Pages that received a caption.
    pub stamped_pages: usize,
    /// Outline entries written.
    pub bookmark_count: usize,
    /// Caption lines beyond the last page.
    pub dropped_captions: usize,
    /// Size of the written document.
    pub bytes_written: usize,
}

/// Terminal state of a run that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The output was written.
    Done(JobReport),
    /// The job was cancelled; nothing was written.
    Cancelled {
        /// Pages stamped before cancellation was noticed.
        pages_completed: usize,
    },
}

/// Completion signal of one run.
pub type JobResult = Result<JobOutcome>;

/// Runs jobs one at a time on the calling thread.
#[derive(Default)]
pub struct JobRunner {
    cancellation: Option<CancellationToken>,
    observer: Option<Box<dyn JobObserver>>,
}

impl JobRunner {
    /// Creates a runner without cancellation or observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `token` before every page.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Reports state transitions to `observer`.
    pub fn with_observer(mut self, observer: impl JobObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Runs one job to completion, failure or cancellation.
    pub fn run(&mut self, params: &JobParameters) -> JobResult {
        self.transition(JobState::Idle);
        let result = self.execute(params);

        match &result {
            Ok(JobOutcome::Done(report)) => {
                info!(
                    "Wrote {} ({} bytes, {} stamped pages, {} bookmarks)",
                    report.output_path.display(),
                    report.bytes_written,
                    report.stamped_pages,
                    report.bookmark_count
                );
                self.transition(JobState::Done);
            }
            Ok(JobOutcome::Cancelled { pages_completed }) => {
                warn!(
                    "Job cancelled after {} pages; no output written",
                    pages_completed
                );
                self.transition(JobState::Cancelled);
            }
            Err(err) => {
                warn!("Job failed during {}: {}", err.stage(), err);
                self.transition(JobState::Failed {
                    kind: err.kind(),
                    stage: err.stage(),
                });
            }
        }

        result
    }

    fn execute(&mut self, params: &JobParameters) -> JobResult {
        self.transition(JobState::Loading);
        info!(
            "Annotating {} with captions from {}",
            params.input_path.display(),
            params.caption_path.display()
        );

        let style = style::resolve(&params.style)?;
        let captions = captions::load(&params.caption_path)?;
        let mut document = load_document(&params.input_path)?;

        let pages = document.get_pages();
        let page_count = pages.len();
        let caption_count = captions.len();
        info!("{} pages, {} caption lines", page_count, caption_count);
        if caption_count > page_count {
            info!(
                "Caption lines {}..={} have no page and are dropped",
                page_count + 1,
                caption_count
            );
        } else if caption_count < page_count {
            info!(
                "Pages {}..={} have no caption and are left unmodified",
                caption_count + 1,
                page_count
            );
        }

        let mut annotator = PageAnnotator::new();
        let mut stamped_pages = 0;
        for (index, &page_id) in pages.values().enumerate() {
            if self.cancelled() {
                return Ok(JobOutcome::Cancelled {
                    pages_completed: index,
                });
            }

            let page_number = index + 1;
            self.transition(JobState::Processing {
                page: page_number,
                total: page_count,
            });

            let job = PageJob {
                page_number,
                caption: captions.get(page_number),
                style: &style,
            };
            if annotator.annotate(&mut document, page_id, &job)?.is_some() {
                stamped_pages += 1;
            } else {
                debug!("Page {} has no caption", page_number);
            }
        }

        if self.cancelled() {
            return Ok(JobOutcome::Cancelled {
                pages_completed: page_count,
            });
        }

        self.transition(JobState::Finalizing);
        let entries = bookmarks::build(&captions, page_count);
        bookmarks::apply(&mut document, &entries)?;
        let bytes_written = write_document(&mut document, &params.output_path)?;

        Ok(JobOutcome::Done(JobReport {
            output_path: params.output_path.clone(),
            page_count,
            caption_count,
            stamped_pages,
            bookmark_count: entries.len(),
            dropped_captions: caption_count.saturating_sub(page_count),
            bytes_written,
        }))
    }

    fn cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn transition(&mut self, state: JobState) {
        debug!("Job state: {:?}", state);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_state(&state);
        }
    }
}

fn load_document(path: &Path) -> Result<Document> {
    let bytes = fs::read(path).map_err(|err| Error::read(path, err))?;
    Document::load_mem(&bytes).map_err(|source| Error::Load {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialises `document` in memory, then writes it to `path` in one go.
///
/// A file that was created but could not be fully written is removed again.
fn write_document(document: &mut Document, path: &Path) -> Result<usize> {
    let write_error = |source: io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut buffer = Vec::new();
    document
        .save_to(&mut buffer)
        .map_err(|err| write_error(io::Error::new(io::ErrorKind::Other, err.to_string())))?;

    let mut file = File::create(path).map_err(write_error)?;
    if let Err(err) = file.write_all(&buffer).and_then(|()| file.sync_all()) {
        drop(file);
        if fs::remove_file(path).is_ok() {
            warn!("Discarded partially written {}", path.display());
        }
        return Err(write_error(err));
    }

    Ok(buffer.len())
}
