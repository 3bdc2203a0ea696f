use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use spectrum_mark::style::StyleParameters;
use spectrum_mark::{JobOutcome, JobParameters};

/// Stamps one caption per page onto a PDF and writes matching bookmarks.
///
/// Line N of the caption file is stamped onto page N. Extra caption lines are ignored and pages
/// without a caption are left as they are. Coordinates are PDF points measured from the
/// bottom-left corner of the page.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON job descriptor; flags given on the command line override its values.
    #[arg(long, value_name = "FILE")]
    job: Option<PathBuf>,

    /// PDF to annotate.
    #[arg(short, long, value_name = "PDF")]
    input: Option<PathBuf>,

    /// UTF-8 caption file, one caption per page.
    #[arg(short, long, value_name = "TXT")]
    captions: Option<PathBuf>,

    /// Where to write the annotated PDF.
    #[arg(short, long, value_name = "PDF")]
    output: Option<PathBuf>,

    /// Horizontal anchor of the caption [default: 60].
    #[arg(long, allow_hyphen_values = true)]
    x: Option<f32>,

    /// Baseline of the caption [default: 8].
    #[arg(long, allow_hyphen_values = true)]
    y: Option<f32>,

    /// Font size in points [default: 12].
    #[arg(long)]
    font_size: Option<f32>,

    /// Caption color as "r,g,b", in 0-1 or 0-255 scale [default: 0,0,0].
    #[arg(long)]
    color: Option<String>,

    /// Caption alignment relative to the anchor: left, center or right [default: center].
    #[arg(long)]
    align: Option<String>,

    /// Log every stamped page and bookmark.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    fn into_parameters(self) -> Result<JobParameters, Box<dyn Error>> {
        let base = self
            .job
            .as_deref()
            .map(JobParameters::from_json_file)
            .transpose()?;

        let (input_path, caption_path, output_path, mut style) = match base {
            Some(job) => (
                self.input.unwrap_or(job.input_path),
                self.captions.unwrap_or(job.caption_path),
                self.output.unwrap_or(job.output_path),
                job.style,
            ),
            None => (
                self.input.ok_or("missing --input")?,
                self.captions.ok_or("missing --captions")?,
                self.output.ok_or("missing --output")?,
                StyleParameters::default(),
            ),
        };

        if let Some(x) = self.x {
            style.x = x;
        }
        if let Some(y) = self.y {
            style.y = y;
        }
        if let Some(font_size) = self.font_size {
            style.font_size = font_size;
        }
        if let Some(color) = self.color {
            style.color = color;
        }
        if let Some(alignment) = self.align {
            style.alignment = alignment;
        }

        if input_path == output_path {
            return Err(format!(
                "output {} would overwrite the input; choose another path",
                output_path.display()
            )
            .into());
        }

        Ok(JobParameters::new(input_path, caption_path, output_path).with_style(style))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let params = match cli.into_parameters() {
        Ok(params) => params,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match spectrum_mark::run(&params) {
        Ok(JobOutcome::Done(report)) => {
            println!(
                "Generated {} ({} pages, {} captions stamped, {} bookmarks, {} caption lines dropped)",
                report.output_path.display(),
                report.page_count,
                report.stamped_pages,
                report.bookmark_count,
                report.dropped_captions
            );
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::Cancelled { pages_completed }) => {
            eprintln!("Cancelled after {} pages; no output written", pages_completed);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error ({}): {}", err.stage(), err);
            print_error_sources(&err);
            ExitCode::FAILURE
        }
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
