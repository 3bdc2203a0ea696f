//! Caption source: one caption per line of a UTF-8 text file.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

const UTF8_BOM: &str = "\u{feff}";

/// Ordered, immutable list of captions read from a caption file.
///
/// Line `n` of the source (1-based) is the caption for page `n`. Lines are kept verbatim,
/// including blank ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptionList {
    lines: Vec<String>,
}

impl CaptionList {
    /// Splits `text` into captions on `\n`, `\r\n` and lone `\r` line boundaries.
    ///
    /// A terminator at the very end of the text does not start another caption.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        Self {
            lines: normalized.lines().map(str::to_owned).collect(),
        }
    }

    /// Returns the number of captions.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns whether the list holds no captions at all.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the caption for the given 1-based page number.
    pub fn get(&self, page_number: usize) -> Option<&str> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
    }

    /// Iterates over the captions in source order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Consumes the list and returns the captions.
    pub fn into_vec(self) -> Vec<String> {
        self.lines
    }
}

impl<S: Into<String>> FromIterator<S> for CaptionList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reads the caption file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<CaptionList> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| Error::read(path, err))?;

    let text = std::str::from_utf8(&bytes).map_err(|err| Error::Encoding {
        path: path.to_path_buf(),
        line: line_of_offset(&bytes, err.valid_up_to()),
    })?;

    Ok(CaptionList::parse(text))
}

fn line_of_offset(bytes: &[u8], offset: usize) -> usize {
    let prefix = &bytes[..offset];
    let breaks = prefix
        .iter()
        .enumerate()
        .filter(|&(index, &byte)| match byte {
            b'\n' => true,
            b'\r' => bytes.get(index + 1) != Some(&b'\n'),
            _ => false,
        })
        .count();
    breaks + 1
}
