//! Style resolution for caption stamps.
//!
//! [`StyleParameters`] holds the values exactly as a user typed them, [`StyleDescriptor`] the
//! validated, normalised form the annotator consumes. Coordinates are PDF user-space units with the
//! origin at the bottom-left corner of the page.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default horizontal anchor.
pub const DEFAULT_X: f32 = 60.0;
/// Default vertical anchor (baseline).
pub const DEFAULT_Y: f32 = 8.0;
/// Default font size in points.
pub const DEFAULT_FONT_SIZE: f32 = 12.0;
/// Default caption color.
pub const DEFAULT_COLOR: &str = "0,0,0";
/// Default alignment.
pub const DEFAULT_ALIGNMENT: &str = "center";

/// Horizontal placement of the caption relative to its anchor point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlignment {
    /// The anchor is the start of the text.
    #[default]
    Left,
    /// The anchor is the middle of the text.
    Center,
    /// The anchor is the end of the text.
    Right,
}

impl HorizontalAlignment {
    /// Returns the x coordinate where text of `width` starts when anchored at `x`.
    pub fn start_x(self, x: f32, width: f32) -> f32 {
        match self {
            Self::Left => x,
            Self::Center => x - width / 2.0,
            Self::Right => x - width,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for HorizontalAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HorizontalAlignment {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            _ => Err(Error::invalid_parameter(
                "alignment",
                format!("unrecognized value `{value}`; expected left, center or right"),
            )),
        }
    }
}

/// RGB color with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgb {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
}

impl Rgb {
    /// Creates a color from components already in `[0, 1]`.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses an `"r,g,b"` string given either in `0..=1` or in `0..=255` scale.
    ///
    /// The scale is chosen for all three components at once: if any component exceeds 1 the
    /// whole triple is divided by 255. Results are clamped to `[0, 1]`.
    pub fn parse(value: &str) -> Result<Self> {
        let components = value
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f32>()
                    .ok()
                    .filter(|number| number.is_finite())
                    .ok_or_else(|| {
                        Error::invalid_parameter(
                            "color",
                            format!("component `{part}` in `{value}` is not a number"),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let [r, g, b] = <[f32; 3]>::try_from(components).map_err(|parts| {
            Error::invalid_parameter(
                "color",
                format!(
                    "expected three components in `{value}`, found {}",
                    parts.len()
                ),
            )
        })?;

        let scale = if [r, g, b].iter().any(|&c| c > 1.0) {
            255.0
        } else {
            1.0
        };
        let normalize = |component: f32| (component / scale).clamp(0.0, 1.0);
        Ok(Self::new(normalize(r), normalize(g), normalize(b)))
    }
}

/// Style values as supplied by the caller, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleParameters {
    /// Horizontal anchor in PDF user space.
    pub x: f32,
    /// Vertical anchor (text baseline) in PDF user space.
    pub y: f32,
    /// Font size in points.
    pub font_size: f32,
    /// Color as `"r,g,b"` in `0..=1` or `0..=255` scale.
    pub color: String,
    /// One of `left`, `center` or `right`.
    pub alignment: String,
}

impl Default for StyleParameters {
    fn default() -> Self {
        Self {
            x: DEFAULT_X,
            y: DEFAULT_Y,
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_COLOR.to_owned(),
            alignment: DEFAULT_ALIGNMENT.to_owned(),
        }
    }
}

/// Canonical, validated caption style shared by every page of a job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StyleDescriptor {
    x: f32,
    y: f32,
    font_size: f32,
    color: Rgb,
    alignment: HorizontalAlignment,
}

impl StyleDescriptor {
    /// Returns the horizontal anchor.
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the vertical anchor.
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Returns the font size in points.
    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Returns the normalised color.
    pub fn color(&self) -> Rgb {
        self.color
    }

    /// Returns the alignment.
    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    /// Returns a copy of the descriptor with a different alignment.
    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }
}

/// Validates `params` and produces the style descriptor used for stamping.
pub fn resolve(params: &StyleParameters) -> Result<StyleDescriptor> {
    if !params.x.is_finite() {
        return Err(Error::invalid_parameter("x", "must be a finite number"));
    }
    if !params.y.is_finite() {
        return Err(Error::invalid_parameter("y", "must be a finite number"));
    }
    if !(params.font_size.is_finite() && params.font_size > 0.0) {
        return Err(Error::invalid_parameter(
            "font_size",
            format!("must be greater than zero, got {}", params.font_size),
        ));
    }

    Ok(StyleDescriptor {
        x: params.x,
        y: params.y,
        font_size: params.font_size,
        color: Rgb::parse(&params.color)?,
        alignment: params.alignment.parse()?,
    })
}
