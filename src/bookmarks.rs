//! Bookmark synthesis built on top of `lopdf`.
//!
//! Each caption that landed on a page becomes one flat outline item pointing at that page. Writing
//! the outline replaces whatever outline the document carried before.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::captions::CaptionList;
use crate::error::{Error, Result};

/// Outline level of every entry; the outline is flat.
pub const BOOKMARK_LEVEL: u32 = 1;

/// One outline item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookmarkEntry {
    /// Text shown in the outline panel.
    pub title: String,
    /// Nesting level, always [`BOOKMARK_LEVEL`].
    pub level: u32,
    /// 1-based page the entry navigates to.
    pub destination_page: usize,
}

/// Builds one entry per captioned page.
///
/// Only the first `min(captions.len(), page_count)` captions produce entries; surplus caption lines
/// are dropped and pages beyond the last caption get no entry.
pub fn build(captions: &CaptionList, page_count: usize) -> Vec<BookmarkEntry> {
    captions
        .iter()
        .take(page_count)
        .enumerate()
        .map(|(index, title)| BookmarkEntry {
            title: title.to_owned(),
            level: BOOKMARK_LEVEL,
            destination_page: index + 1,
        })
        .collect()
}

/// Replaces the outline of `document` with `entries`.
///
/// Items of a previous outline are deleted from the document. An empty `entries` slice leaves the
/// document without an outline.
pub fn apply(document: &mut Document, entries: &[BookmarkEntry]) -> Result<()> {
    let catalog_id = catalog_id(document)?;
    remove_outline(document, catalog_id)?;

    if entries.is_empty() {
        return Ok(());
    }

    let pages = document.get_pages();
    let outline_entries = collect_outline_entries(document, entries, &pages)?;

    let outlines_id = document.new_object_id();
    link_outline_entries(outlines_id, document, &outline_entries);
    insert_outlines_root(outlines_id, catalog_id, document, &outline_entries)?;

    for entry in entries {
        debug!(
            "Bookmark: level={}, title={:?}, page={}",
            entry.level, entry.title, entry.destination_page
        );
    }

    Ok(())
}

struct OutlineEntry {
    object_id: ObjectId,
    page_ref: ObjectId,
    title: Object,
}

fn catalog_id(document: &Document) -> Result<ObjectId> {
    document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| Error::outline("PDF catalog entry is missing"))
}

fn catalog_mut(document: &mut Document, catalog_id: ObjectId) -> Result<&mut Dictionary> {
    document
        .objects
        .get_mut(&catalog_id)
        .ok_or_else(|| Error::outline("PDF catalog entry is missing"))?
        .as_dict_mut()
        .map_err(|_| Error::outline("PDF catalog entry is not a dictionary"))
}

/// Unlinks the current outline from the catalog and deletes its items.
fn remove_outline(document: &mut Document, catalog_id: ObjectId) -> Result<()> {
    let Some(previous) = catalog_mut(document, catalog_id)?.remove(b"Outlines") else {
        return Ok(());
    };
    let Object::Reference(root_id) = previous else {
        return Ok(());
    };

    let mut pending = vec![root_id];
    let mut visited = BTreeSet::new();
    while let Some(id) = pending.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(Object::Dictionary(item)) = document.objects.get(&id) else {
            continue;
        };
        for key in [b"First".as_slice(), b"Next".as_slice()] {
            if let Ok(next) = item.get(key).and_then(Object::as_reference) {
                pending.push(next);
            }
        }
    }

    for id in &visited {
        document.objects.remove(id);
    }
    debug!("Removed previous outline with {} objects", visited.len());

    Ok(())
}

fn collect_outline_entries(
    document: &mut Document,
    entries: &[BookmarkEntry],
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<Vec<OutlineEntry>> {
    entries
        .iter()
        .map(|entry| {
            let page_ref = u32::try_from(entry.destination_page)
                .ok()
                .and_then(|number| pages.get(&number))
                .copied()
                .ok_or_else(|| {
                    Error::outline(format!(
                        "bookmark {:?} refers to missing page {}",
                        entry.title, entry.destination_page
                    ))
                })?;

            Ok(OutlineEntry {
                object_id: document.new_object_id(),
                page_ref,
                title: text_string(&entry.title),
            })
        })
        .collect()
}

/// Encodes `text` as a PDF text string: literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xfe, 0xff];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn link_outline_entries(outlines_id: ObjectId, document: &mut Document, entries: &[OutlineEntry]) {
    for index in 0..entries.len() {
        let mut dictionary = Dictionary::new();
        dictionary.set("Title", entries[index].title.clone());
        dictionary.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(entries[index].page_ref),
                Object::Name("Fit".into()),
            ]),
        );
        dictionary.set("Parent", Object::Reference(outlines_id));

        if index > 0 {
            dictionary.set("Prev", Object::Reference(entries[index - 1].object_id));
        }

        if index + 1 < entries.len() {
            dictionary.set("Next", Object::Reference(entries[index + 1].object_id));
        }

        document
            .objects
            .insert(entries[index].object_id, Object::Dictionary(dictionary));
    }
}

fn insert_outlines_root(
    outlines_id: ObjectId,
    catalog_id: ObjectId,
    document: &mut Document,
    entries: &[OutlineEntry],
) -> Result<()> {
    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name("Outlines".into()));
    dictionary.set("Count", Object::Integer(entries.len() as i64));
    if let Some(first) = entries.first() {
        dictionary.set("First", Object::Reference(first.object_id));
    }
    if let Some(last) = entries.last() {
        dictionary.set("Last", Object::Reference(last.object_id));
    }

    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    catalog_mut(document, catalog_id)?.set("Outlines", Object::Reference(outlines_id));

    Ok(())
}
