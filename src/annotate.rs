//! Page annotator: stamps one caption onto one page.
//!
//! The stamp is appended as a new content stream. Existing streams are left byte-for-byte intact;
//! they are only bracketed by a `q`/`Q` pair so that graphics state they leave behind does not
//! leak into the caption.

use std::collections::BTreeSet;

use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::{Error, Result};
use crate::fonts::CaptionFont;
use crate::style::StyleDescriptor;

const FONT_RESOURCE_PREFIX: &str = "SpMk";

/// One page worth of work: the page, its caption (if any) and the shared style.
#[derive(Clone, Copy, Debug)]
pub struct PageJob<'a> {
    /// 1-based page number.
    pub page_number: usize,
    /// Caption for the page; `None` once the captions are exhausted.
    pub caption: Option<&'a str>,
    /// Style shared by every page of the job.
    pub style: &'a StyleDescriptor,
}

/// Placement of a caption written onto a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Stamp {
    /// 1-based page number.
    pub page_number: usize,
    /// Left edge of the text after alignment.
    pub start_x: f32,
    /// Baseline of the text.
    pub y: f32,
    /// Measured width of the text.
    pub width: f32,
    /// Font size the text was set in.
    pub font_size: f32,
}

/// Stamps captions onto the pages of a single document.
///
/// The caption font is added to the document the first time a caption is stamped and shared by
/// every later page.
#[derive(Debug, Default)]
pub struct PageAnnotator {
    font: CaptionFont,
    font_id: Option<ObjectId>,
}

impl PageAnnotator {
    /// Creates an annotator for a document that has not been stamped yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the font metrics used for measuring captions.
    pub fn font(&self) -> &CaptionFont {
        &self.font
    }

    /// Computes where the caption of `job` goes without touching any document.
    pub fn layout(&self, job: &PageJob<'_>) -> Option<Stamp> {
        let caption = job.caption?;
        let style = job.style;
        let width = self.font.text_width(caption, style.font_size());
        Some(Stamp {
            page_number: job.page_number,
            start_x: style.alignment().start_x(style.x(), width),
            y: style.y(),
            width,
            font_size: style.font_size(),
        })
    }

    /// Stamps the caption of `job` onto the page `page_id` of `document`.
    ///
    /// Returns `Ok(None)` and leaves the page untouched when the job carries no caption.
    pub fn annotate(
        &mut self,
        document: &mut Document,
        page_id: ObjectId,
        job: &PageJob<'_>,
    ) -> Result<Option<Stamp>> {
        let (Some(caption), Some(stamp)) = (job.caption, self.layout(job)) else {
            return Ok(None);
        };
        let page = job.page_number;

        if !caption.chars().all(|ch| self.font.is_encodable(ch)) {
            warn!(
                "Caption for page {} contains characters outside the caption font; they render as the replacement glyph",
                page
            );
        }

        let font_id = match self.font_id {
            Some(id) => id,
            None => {
                let id = self.font.install(document);
                self.font_id = Some(id);
                id
            }
        };

        let font_name = register_font(document, page_id, font_id)
            .map_err(|reason| Error::render(page, reason))?;
        let existing =
            existing_contents(document, page_id).map_err(|reason| Error::render(page, reason))?;

        let stamp_bytes =
            self.stamp_content(caption, job.style, &stamp, &font_name, !existing.is_empty())?;
        let stamp_id = document.add_object(Stream::new(Dictionary::new(), stamp_bytes));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        if !existing.is_empty() {
            let save_id = document.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            contents.push(Object::Reference(save_id));
            contents.extend(existing);
        }
        contents.push(Object::Reference(stamp_id));

        page_dictionary_mut(document, page_id)
            .map_err(|reason| Error::render(page, reason))?
            .set("Contents", Object::Array(contents));

        debug!(
            "Stamped page {}: {:?} width {:.2} at ({:.2}, {:.2}), {} aligned",
            page,
            caption,
            stamp.width,
            stamp.start_x,
            stamp.y,
            job.style.alignment()
        );

        Ok(Some(stamp))
    }

    fn stamp_content(
        &self,
        caption: &str,
        style: &StyleDescriptor,
        stamp: &Stamp,
        font_name: &[u8],
        restore_first: bool,
    ) -> Result<Vec<u8>> {
        let color = style.color();
        let mut operations = Vec::with_capacity(10);
        if restore_first {
            operations.push(Operation::new("Q", vec![]));
        }
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "rg",
                vec![
                    Object::Real(color.r),
                    Object::Real(color.g),
                    Object::Real(color.b),
                ],
            ),
            Operation::new("Tr", vec![Object::Integer(0)]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font_name.to_vec()),
                    Object::Real(stamp.font_size),
                ],
            ),
            Operation::new(
                "Td",
                vec![Object::Real(stamp.start_x), Object::Real(stamp.y)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(
                    self.font.encode(caption),
                    StringFormat::Hexadecimal,
                )],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);

        let encoded = Content { operations }.encode().map_err(|err| {
            Error::render(stamp.page_number, format!("cannot encode stamp: {err}"))
        })?;

        // Streams are concatenated bytewise, so delimit the stamp from its neighbours.
        let mut bytes = Vec::with_capacity(encoded.len() + 2);
        bytes.push(b'\n');
        bytes.extend(encoded);
        bytes.push(b'\n');
        Ok(bytes)
    }
}

type Reason<T> = std::result::Result<T, String>;

fn page_dictionary(document: &Document, page_id: ObjectId) -> Reason<&Dictionary> {
    document
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|err| format!("page object {:?} is unusable: {err}", page_id))
}

fn page_dictionary_mut(document: &mut Document, page_id: ObjectId) -> Reason<&mut Dictionary> {
    document
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| format!("page object {:?} is unusable: {err}", page_id))
}

fn resolve_dictionary(document: &Document, object: &Object) -> Reason<Dictionary> {
    match object {
        Object::Dictionary(dictionary) => Ok(dictionary.clone()),
        Object::Reference(id) => document
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .map_err(|err| format!("object {:?} is not a dictionary: {err}", id)),
        other => Err(format!("expected a dictionary, found {}", object_kind(other))),
    }
}

/// Returns a copy of the resources in effect for the page, following `/Parent` inheritance.
fn effective_resources(document: &Document, page_id: ObjectId) -> Reason<Dictionary> {
    let mut visited = BTreeSet::new();
    let mut node_id = page_id;

    while visited.insert(node_id) {
        let node = page_dictionary(document, node_id)?;
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dictionary(document, resources);
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => break,
        }
    }

    Ok(Dictionary::new())
}

/// Registers the caption font in the page's own resources and returns its resource name.
///
/// Shared or inherited resource dictionaries are copied onto the page rather than modified.
fn register_font(
    document: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Reason<Vec<u8>> {
    let mut resources = effective_resources(document, page_id)?;
    let mut fonts = match resources.get(b"Font") {
        Ok(fonts) => resolve_dictionary(document, fonts)?,
        Err(_) => Dictionary::new(),
    };

    let name = (0..)
        .map(|index| match index {
            0 => FONT_RESOURCE_PREFIX.as_bytes().to_vec(),
            n => format!("{FONT_RESOURCE_PREFIX}{n}").into_bytes(),
        })
        .find(|candidate| match fonts.get(candidate) {
            Ok(Object::Reference(id)) => *id == font_id,
            Ok(_) => false,
            Err(_) => true,
        })
        .ok_or_else(|| "no free font resource name".to_owned())?;

    fonts.set(name.clone(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    page_dictionary_mut(document, page_id)?.set("Resources", Object::Dictionary(resources));

    Ok(name)
}

/// Returns the page's content stream references in drawing order.
fn existing_contents(document: &Document, page_id: ObjectId) -> Reason<Vec<Object>> {
    let page = page_dictionary(document, page_id)?;
    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Array(streams)) => Ok(streams.clone()),
        Ok(Object::Reference(id)) => match document.get_object(*id) {
            Ok(Object::Array(streams)) => Ok(streams.clone()),
            Ok(_) => Ok(vec![Object::Reference(*id)]),
            Err(err) => Err(format!("content stream {:?} is missing: {err}", id)),
        },
        Ok(other) => Err(format!(
            "unsupported /Contents entry of type {}",
            object_kind(other)
        )),
    }
}

fn object_kind(object: &Object) -> &'static str {
    match object {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) | Object::Real(_) => "number",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{self, HorizontalAlignment, StyleParameters};
    use lopdf::dictionary;

    fn style(alignment: &str) -> StyleDescriptor {
        style::resolve(&StyleParameters {
            x: 200.0,
            y: 40.0,
            font_size: 10.0,
            color: "255,0,0".to_owned(),
            alignment: alignment.to_owned(),
        })
        .expect("valid style")
    }

    fn single_page_document(contents: &[u8]) -> (Document, ObjectId) {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let content_id = document.add_object(Stream::new(Dictionary::new(), contents.to_vec()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "SpMk" => Object::Integer(0) },
                },
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        (document, page_id)
    }

    #[test]
    fn layout_shifts_anchor_by_alignment() {
        let annotator = PageAnnotator::new();
        let caption = Some("Fig 1");
        let width = annotator.font().text_width("Fig 1", 10.0);

        let mut starts = Vec::new();
        for alignment in ["left", "center", "right"] {
            let style = style(alignment);
            let job = PageJob {
                page_number: 1,
                caption,
                style: &style,
            };
            let stamp = annotator.layout(&job).expect("stamp");
            assert_eq!(stamp.y, 40.0);
            assert_eq!(stamp.width, width);
            starts.push(stamp.start_x);
        }
        assert_eq!(starts, vec![200.0, 200.0 - width / 2.0, 200.0 - width]);
    }

    #[test]
    fn missing_caption_leaves_page_untouched() {
        let (mut document, page_id) = single_page_document(b"0 0 m 100 100 l S\n");
        let before = document.get_page_content(page_id).expect("page content");
        let style = style("left");

        let stamp = PageAnnotator::new()
            .annotate(
                &mut document,
                page_id,
                &PageJob {
                    page_number: 1,
                    caption: None,
                    style: &style,
                },
            )
            .expect("annotate");

        assert!(stamp.is_none());
        assert_eq!(document.get_page_content(page_id).expect("page content"), before);
        let page = document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .expect("page");
        assert!(matches!(page.get(b"Contents"), Ok(Object::Reference(_))));
        assert!(page.get(b"Resources").is_err());
    }

    #[test]
    fn stamp_is_appended_after_original_content() {
        let original = b"0 0 m 100 100 l S\n";
        let (mut document, page_id) = single_page_document(original);
        let style = style("left").with_alignment(HorizontalAlignment::Left);

        PageAnnotator::new()
            .annotate(
                &mut document,
                page_id,
                &PageJob {
                    page_number: 1,
                    caption: Some("图 1"),
                    style: &style,
                },
            )
            .expect("annotate");

        let content = document.get_page_content(page_id).expect("page content");
        let operations = Content::decode(&content).expect("decode").operations;
        let operators: Vec<_> = operations.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(
            operators,
            vec!["q", "m", "l", "S", "Q", "q", "rg", "Tr", "BT", "Tf", "Td", "Tj", "ET", "Q"]
        );
        match &operations[11].operands[0] {
            Object::String(bytes, _) => {
                assert_eq!(bytes, &vec![0x56, 0xfe, 0x00, 0x20, 0x00, 0x31]);
            }
            other => panic!("unexpected Tj operand: {other:?}"),
        }
    }

    #[test]
    fn original_stream_without_trailing_newline_keeps_its_last_operator() {
        let (mut document, page_id) = single_page_document(b"0 0 m 100 100 l S");
        let style = style("left");

        PageAnnotator::new()
            .annotate(
                &mut document,
                page_id,
                &PageJob {
                    page_number: 1,
                    caption: Some("Fig 2"),
                    style: &style,
                },
            )
            .expect("annotate");

        let content = document.get_page_content(page_id).expect("page content");
        let operators: Vec<_> = Content::decode(&content)
            .expect("decode")
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect();
        assert_eq!(
            operators,
            vec!["q", "m", "l", "S", "Q", "q", "rg", "Tr", "BT", "Tf", "Td", "Tj", "ET", "Q"]
        );
    }

    #[test]
    fn font_name_avoids_inherited_resources() {
        let (mut document, page_id) = single_page_document(b"");
        let style = style("center");

        PageAnnotator::new()
            .annotate(
                &mut document,
                page_id,
                &PageJob {
                    page_number: 1,
                    caption: Some("Fig"),
                    style: &style,
                },
            )
            .expect("annotate");

        let page = document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .expect("page");
        let fonts = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .expect("page fonts");
        assert!(matches!(fonts.get(b"SpMk"), Ok(Object::Integer(0))));
        assert!(matches!(fonts.get(b"SpMk1"), Ok(Object::Reference(_))));
    }
}
