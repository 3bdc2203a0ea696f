#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use sha2::{Digest, Sha256};

/// Builds a PDF whose pages carry a line-art spectrum trace and a Helvetica label.
///
/// Fonts are inherited from the page tree so stamping has to copy resources onto the page.
pub fn spectrum_pdf(page_count: usize) -> Vec<u8> {
    spectrum_pdf_with_outline(page_count, &[])
}

/// Same as [`spectrum_pdf`] with a pre-existing flat outline titled `outline`.
pub fn spectrum_pdf_with_outline(page_count: usize, outline: &[&str]) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for index in 0..page_count {
        let content = Content {
            operations: spectrum_operations(index + 1),
        };
        let content_id = document.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode fixture content"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.clone(),
            "Count" => Object::Integer(page_count as i64),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if !outline.is_empty() {
        catalog.set("Outlines", build_outline(&mut document, outline, &kids));
    }
    let catalog_id = document.add_object(catalog);
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("save fixture");
    bytes
}

fn spectrum_operations(page_number: usize) -> Vec<Operation> {
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("w", vec![Object::Real(0.8)]),
        Operation::new("m", vec![Object::Integer(72), Object::Integer(200)]),
    ];
    for step in 1..20_i64 {
        let peak = if step % 5 == 0 { 400 } else { 200 + step * 3 };
        operations.push(Operation::new(
            "l",
            vec![Object::Integer(72 + step * 24), Object::Integer(peak)],
        ));
    }
    operations.extend([
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(9)]),
        Operation::new("Td", vec![Object::Integer(72), Object::Integer(800)]),
        Operation::new(
            "Tj",
            vec![Object::string_literal(format!("Spectrum {page_number}"))],
        ),
        Operation::new("ET", vec![]),
    ]);
    operations
}

fn build_outline(document: &mut Document, titles: &[&str], kids: &[Object]) -> Object {
    let root_id = document.new_object_id();
    let ids: Vec<ObjectId> = titles.iter().map(|_| document.new_object_id()).collect();
    for (index, title) in titles.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => Object::string_literal(*title),
            "Parent" => root_id,
            "Dest" => vec![kids[index % kids.len()].clone(), Object::Name(b"Fit".to_vec())],
        };
        if index > 0 {
            item.set("Prev", ids[index - 1]);
        }
        if index + 1 < ids.len() {
            item.set("Next", ids[index + 1]);
        }
        document.objects.insert(ids[index], Object::Dictionary(item));
    }
    document.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => ids[0],
            "Last" => ids[ids.len() - 1],
            "Count" => Object::Integer(ids.len() as i64),
        }),
    );
    Object::Reference(root_id)
}

pub fn write_file(dir: &Path, name: &str, bytes: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture file");
    path
}

pub fn load(path: &Path) -> Document {
    Document::load(path).expect("load output pdf")
}

/// Decodes a PDF text string (UTF-16BE with byte order mark, or PDFDocEncoding for ASCII).
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xfe, 0xff, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).expect("valid UTF-16 title")
        }
        _ => String::from_utf8(bytes.to_vec()).expect("ASCII title"),
    }
}

/// Returns the outline as `(title, 1-based page)` pairs in outline order.
pub fn outline(document: &Document) -> Vec<(String, usize)> {
    let page_numbers: Vec<(ObjectId, usize)> = document
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number as usize))
        .collect();
    let page_of = |id: ObjectId| {
        page_numbers
            .iter()
            .find(|(page_id, _)| *page_id == id)
            .map(|(_, number)| *number)
            .expect("destination is a page")
    };

    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("catalog");
    let catalog = document
        .get_object(catalog_id)
        .and_then(Object::as_dict)
        .expect("catalog dictionary");
    let Ok(root_id) = catalog.get(b"Outlines").and_then(Object::as_reference) else {
        return Vec::new();
    };
    let root = document
        .get_object(root_id)
        .and_then(Object::as_dict)
        .expect("outline root");

    let mut entries = Vec::new();
    let mut next = root.get(b"First").and_then(Object::as_reference).ok();
    while let Some(id) = next {
        let item = document
            .get_object(id)
            .and_then(Object::as_dict)
            .expect("outline item");
        assert!(item.get(b"First").is_err(), "outline must be flat");
        let title = match item.get(b"Title").expect("title") {
            Object::String(bytes, _) => decode_text(bytes),
            other => panic!("unexpected title {other:?}"),
        };
        let dest = item
            .get(b"Dest")
            .and_then(Object::as_array)
            .expect("destination array");
        let page = page_of(dest[0].as_reference().expect("page reference"));
        entries.push((title, page));
        next = item.get(b"Next").and_then(Object::as_reference).ok();
    }
    entries
}

/// Decoded content operations of the 1-based page `page_number`.
pub fn page_operations(document: &Document, page_number: u32) -> Vec<Operation> {
    let page_id = document.get_pages()[&page_number];
    let content = document.get_page_content(page_id).expect("page content");
    Content::decode(&content).expect("decode page content").operations
}

/// Caption stamps on a page: text shown while one of the stamp fonts is selected.
#[derive(Debug, PartialEq)]
pub struct FoundStamp {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

pub fn number(object: &Object) -> f32 {
    match object {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value as f32,
        other => panic!("expected a number, found {other:?}"),
    }
}

pub fn stamps(document: &Document, page_number: u32) -> Vec<FoundStamp> {
    let mut found = Vec::new();
    let mut font: Option<(Vec<u8>, f32)> = None;
    let mut position = (0.0, 0.0);
    for operation in page_operations(document, page_number) {
        match operation.operator.as_str() {
            "BT" => position = (0.0, 0.0),
            "Tf" => {
                let name = operation.operands[0].as_name().expect("font name").to_vec();
                font = Some((name, number(&operation.operands[1])));
            }
            "Td" => {
                position = (
                    number(&operation.operands[0]),
                    number(&operation.operands[1]),
                );
            }
            "Tj" => {
                let Some((name, size)) = &font else { continue };
                if !name.starts_with(b"SpMk") {
                    continue;
                }
                let Object::String(bytes, _) = &operation.operands[0] else {
                    panic!("stamp text must be a string");
                };
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                found.push(FoundStamp {
                    x: position.0,
                    y: position.1,
                    font_size: *size,
                    text: String::from_utf16_lossy(&units),
                });
            }
            _ => {}
        }
    }
    found
}

/// Operators of the page's original drawing, as generated by [`spectrum_pdf`].
pub fn original_operators(page_number: usize) -> Vec<String> {
    spectrum_operations(page_number)
        .into_iter()
        .map(|operation| operation.operator)
        .collect()
}

fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    fn scrub_segment(data: &mut [u8], tag: &[u8], terminator: u8) {
        let mut index = 0;
        while index + tag.len() < data.len() {
            if data[index..].starts_with(tag) {
                let mut cursor = index + tag.len();
                while cursor < data.len() && data[cursor] != terminator {
                    if !matches!(data[cursor], b'<' | b'>' | b' ' | b'\n' | b'\r' | b'\t') {
                        data[cursor] = b'0';
                    }
                    cursor += 1;
                }
                index = cursor;
            } else {
                index += 1;
            }
        }
    }

    let mut normalized = bytes.to_vec();
    scrub_segment(&mut normalized, b"/CreationDate(", b')');
    scrub_segment(&mut normalized, b"/ModDate(", b')');
    scrub_segment(&mut normalized, b"/ID[", b']');
    normalized
}

pub fn normalized_hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(scrub_pdf(bytes)).into()
}
