//! The built-in caption font.
//!
//! Captions mix Chinese and Latin text, so they are set in `STSong-Light`, one of the Adobe
//! standard CJK fonts every conforming viewer provides. The font is referenced, not embedded, as a
//! Type0 font over the predefined `UniGB-UCS2-H` CMap: character codes are the UCS-2 code units
//! of the text. The horizontal metrics are written into the font dictionary, so the widths used
//! for alignment are the widths the viewer lays the glyphs out with.

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Name of the CID font used for captions.
pub const CAPTION_FONT_NAME: &str = "STSong-Light";

/// Predefined CMap mapping UCS-2 codes to Adobe-GB1 CIDs.
pub const CAPTION_FONT_ENCODING: &str = "UniGB-UCS2-H";

/// Code written for characters the UCS-2 CMap cannot address.
pub const REPLACEMENT_CHARACTER: char = '\u{fffd}';

const UNITS_PER_EM: f32 = 1000.0;

/// Advance of every glyph outside printable ASCII, including the replacement glyph.
const FULL_WIDTH_ADVANCE: i64 = 1000;

/// CID of U+0020 under `UniGB-UCS2-H`; printable ASCII maps to consecutive CIDs from here.
const FIRST_LATIN_CID: i64 = 1;

/// Proportional advances of Adobe-GB1 CIDs 1..=95 (U+0020 through U+007E) in `STSong-Light`.
const LATIN_ADVANCES: [i64; 95] = [
    207, 270, 342, 467, 462, 797, 710, 239, 374, 374, 423, 605, 238, 375, 238, 334, // ' '..'/'
    462, 462, 462, 462, 462, 462, 462, 462, 462, 462, 238, 238, 605, 605, 605, 344, // '0'..'?'
    748, 684, 560, 695, 739, 563, 511, 729, 793, 318, 312, 666, 526, 896, 758, 772, // '@'..'O'
    544, 772, 628, 465, 607, 753, 711, 972, 647, 620, 607, 374, 333, 374, 606, 500, // 'P'..'_'
    239, 417, 503, 427, 529, 415, 264, 444, 518, 241, 230, 495, 228, 793, 527, 524, // '`'..'o'
    524, 504, 338, 336, 277, 517, 450, 652, 466, 452, 407, 370, 258, 370, 605, // 'p'..'~'
];

/// Metrics and encoding of the caption font.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptionFont;

impl CaptionFont {
    /// Returns the advance of `ch` in thousandths of an em.
    pub fn advance(&self, ch: char) -> i64 {
        match ch {
            ' '..='~' => LATIN_ADVANCES[usize::from(ch as u8 - b' ')],
            _ => FULL_WIDTH_ADVANCE,
        }
    }

    /// Measures `text` set at `font_size` points, in PDF user-space units.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let units: i64 = text.chars().map(|ch| self.advance(ch)).sum();
        units as f32 / UNITS_PER_EM * font_size
    }

    /// Returns whether `ch` has a code under the font's CMap.
    pub fn is_encodable(&self, ch: char) -> bool {
        u16::try_from(u32::from(ch)).is_ok()
    }

    /// Encodes `text` as big-endian UCS-2 character codes.
    ///
    /// Characters outside the Basic Multilingual Plane are written as
    /// [`REPLACEMENT_CHARACTER`].
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            let code = u16::try_from(u32::from(ch)).unwrap_or(REPLACEMENT_CHARACTER as u16);
            bytes.extend_from_slice(&code.to_be_bytes());
        }
        bytes
    }

    /// Adds the font dictionaries to `document` and returns the Type0 font object.
    pub fn install(&self, document: &mut Document) -> ObjectId {
        let mut descriptor = Dictionary::new();
        descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
        descriptor.set("FontName", Object::Name(CAPTION_FONT_NAME.into()));
        descriptor.set("Flags", Object::Integer(6));
        descriptor.set(
            "FontBBox",
            Object::Array(vec![
                Object::Integer(-25),
                Object::Integer(-254),
                Object::Integer(1000),
                Object::Integer(880),
            ]),
        );
        descriptor.set("ItalicAngle", Object::Integer(0));
        descriptor.set("Ascent", Object::Integer(880));
        descriptor.set("Descent", Object::Integer(-120));
        descriptor.set("CapHeight", Object::Integer(880));
        descriptor.set("StemV", Object::Integer(93));
        let descriptor_id = document.add_object(Object::Dictionary(descriptor));

        let mut system_info = Dictionary::new();
        system_info.set("Registry", Object::string_literal("Adobe"));
        system_info.set("Ordering", Object::string_literal("GB1"));
        system_info.set("Supplement", Object::Integer(2));

        let mut cid_font = Dictionary::new();
        cid_font.set("Type", Object::Name(b"Font".to_vec()));
        cid_font.set("Subtype", Object::Name(b"CIDFontType0".to_vec()));
        cid_font.set("BaseFont", Object::Name(CAPTION_FONT_NAME.into()));
        cid_font.set("CIDSystemInfo", Object::Dictionary(system_info));
        cid_font.set("FontDescriptor", Object::Reference(descriptor_id));
        cid_font.set("DW", Object::Integer(FULL_WIDTH_ADVANCE));
        cid_font.set(
            "W",
            Object::Array(vec![
                Object::Integer(FIRST_LATIN_CID),
                Object::Array(LATIN_ADVANCES.iter().copied().map(Object::Integer).collect()),
            ]),
        );
        let cid_font_id = document.add_object(Object::Dictionary(cid_font));

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type0".to_vec()));
        font.set(
            "BaseFont",
            Object::Name(format!("{CAPTION_FONT_NAME}-{CAPTION_FONT_ENCODING}").into_bytes()),
        );
        font.set("Encoding", Object::Name(CAPTION_FONT_ENCODING.into()));
        font.set(
            "DescendantFonts",
            Object::Array(vec![Object::Reference(cid_font_id)]),
        );
        document.add_object(Object::Dictionary(font))
    }
}
