//! # PDF Serializer
//!
//! Writes a [`RenderedPage`] as a single-page PDF 1.7 file. The writer
//! emits raw objects itself; the subset of the format a menu page needs is
//! small.
//!
//! ## PDF Structure (simplified)
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- catalog, page tree, fonts, images, page, content
//! ...
//! xref                <- byte offsets of each object
//! trailer             <- root and info references
//! %%EOF
//! ```
//!
//! ## Fonts
//!
//! Standard fonts (Helvetica, Times) are plain Type1 references with
//! WinAnsi encoding. Custom TrueType fonts are embedded in full as
//! CIDFontType2 with Identity-H encoding: FontFile2, FontDescriptor,
//! CIDFont, ToUnicode CMap and the Type0 root, five objects per font.
//!
//! ## Images
//!
//! JPEG data passes through with DCTDecode. Decoded rasters are written as
//! FlateDecode RGB with an optional SMask. An image referenced several
//! times on the page is embedded once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miniz_oxide::deflate::compress_to_vec_zlib;
use serde::Serialize;

use crate::error::MenuError;
use crate::font::{FontContext, FontData, FontKey};
use crate::image_loader::{ImagePixelData, JpegColorSpace, LoadedImage};
use crate::render::{DrawOp, RenderedPage};
use crate::style::Color;

const COMPRESSION_LEVEL: u8 = 6;

/// Document information dictionary entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub keywords: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct PdfWriter;

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedding data for a custom TrueType font.
struct CustomFontEmbedData {
    /// Glyph ids in the embedded (full) font.
    char_to_gid: HashMap<char, u16>,
}

/// Tracks allocated PDF objects during writing.
struct PdfBuilder {
    objects: Vec<PdfObject>,
    /// Font resources in `/F<index>` order.
    font_objects: Vec<(FontKey, usize)>,
    custom_font_data: HashMap<FontKey, CustomFontEmbedData>,
    /// XObject ids, indexed as /Im0, /Im1, ...
    image_objects: Vec<usize>,
    /// Maps an image allocation to its /Im index.
    image_index: HashMap<*const LoadedImage, usize>,
}

struct PdfObject {
    data: Vec<u8>,
}

impl PdfBuilder {
    fn new() -> Self {
        // Object 0 is the free-list head, 1 the catalog, 2 the page tree.
        Self {
            objects: (0..3).map(|_| PdfObject { data: Vec::new() }).collect(),
            font_objects: Vec::new(),
            custom_font_data: HashMap::new(),
            image_objects: Vec::new(),
            image_index: HashMap::new(),
        }
    }

    fn push(&mut self, data: Vec<u8>) -> usize {
        let id = self.objects.len();
        self.objects.push(PdfObject { data });
        id
    }

    /// Push a stream object with the given extra dictionary entries.
    fn push_stream(&mut self, dict_entries: &str, payload: &[u8]) -> usize {
        let mut data: Vec<u8> = Vec::new();
        let _ = write!(
            data,
            "<< {} /Length {} >>\nstream\n",
            dict_entries,
            payload.len()
        );
        data.extend_from_slice(payload);
        data.extend_from_slice(b"\nendstream");
        self.push(data)
    }

    fn font_index(&self, key: &FontKey) -> usize {
        self.font_objects
            .iter()
            .position(|(k, _)| k == key)
            .unwrap_or(0)
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize one rendered page to PDF bytes.
    pub fn write(
        &self,
        page: &RenderedPage,
        info: &DocumentInfo,
        font_context: &FontContext,
    ) -> Result<Vec<u8>, MenuError> {
        let mut builder = PdfBuilder::new();

        self.register_fonts(&mut builder, page, font_context)?;
        self.register_images(&mut builder, page);

        let content = self.build_content_stream(page, &builder);
        let compressed = compress_to_vec_zlib(content.as_bytes(), COMPRESSION_LEVEL);
        let content_obj_id = builder.push_stream("/Filter /FlateDecode", &compressed);

        let font_resources = self.build_font_resource_dict(&builder.font_objects);
        let xobject_resources = self.build_xobject_resource_dict(&builder);
        let resources = if xobject_resources.is_empty() {
            format!("/Font << {} >>", font_resources)
        } else {
            format!("/Font << {} >> /XObject << {} >>", font_resources, xobject_resources)
        };
        let page_obj_id = builder.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Contents {} 0 R /Resources << {} >> >>",
                page.width, page.height, content_obj_id, resources
            )
            .into_bytes(),
        );

        builder.objects[1].data = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        builder.objects[2].data =
            format!("<< /Type /Pages /Kids [{} 0 R] /Count 1 >>", page_obj_id).into_bytes();

        let info_obj_id = builder.push(Self::build_info_dict(info).into_bytes());

        Ok(self.serialize(&builder, info_obj_id))
    }

    // ── Content stream ──────────────────────────────────────────

    fn build_content_stream(&self, page: &RenderedPage, builder: &PdfBuilder) -> String {
        let mut stream = String::new();
        for op in &page.ops {
            self.write_op(&mut stream, op, page.height, builder);
        }
        stream
    }

    fn write_op(&self, stream: &mut String, op: &DrawOp, page_height: f64, builder: &PdfBuilder) {
        match op {
            DrawOp::Image { image, rect } => {
                let Some(&idx) = builder.image_index.get(&Arc::as_ptr(image)) else {
                    return;
                };
                let y = page_height - rect.y - rect.height;
                let _ = writeln!(
                    stream,
                    "q\n{:.4} 0 0 {:.4} {:.2} {:.2} cm\n/Im{} Do\nQ",
                    rect.width, rect.height, rect.x, y, idx
                );
            }

            DrawOp::Rule {
                x1,
                y1,
                x2,
                y2,
                width,
                color,
            } => {
                let _ = writeln!(
                    stream,
                    "q\n{} RG\n{:.2} w\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ",
                    color_operands(color),
                    width,
                    x1,
                    page_height - y1,
                    x2,
                    page_height - y2
                );
            }

            DrawOp::Text {
                runs,
                font,
                font_size,
                color,
            } => {
                let idx = builder.font_index(font);
                let _ = writeln!(
                    stream,
                    "BT\n{} rg\n/F{} {:.2} Tf",
                    color_operands(color),
                    idx,
                    font_size
                );
                let custom = builder.custom_font_data.get(font);
                for run in runs {
                    let _ = writeln!(
                        stream,
                        "1 0 0 1 {:.2} {:.2} Tm",
                        run.x,
                        page_height - run.baseline
                    );
                    match custom {
                        Some(embed) => {
                            let mut hex = String::with_capacity(run.text.len() * 4);
                            for ch in run.text.chars() {
                                let gid = embed.char_to_gid.get(&ch).copied().unwrap_or(0);
                                let _ = write!(hex, "{:04X}", gid);
                            }
                            let _ = writeln!(stream, "<{}> Tj", hex);
                        }
                        None => {
                            let _ = writeln!(stream, "({}) Tj", Self::encode_winansi(&run.text));
                        }
                    }
                }
                stream.push_str("ET\n");
            }
        }
    }

    /// WinAnsi-encode and escape a string for a standard-font `Tj`.
    fn encode_winansi(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            let b = Self::unicode_to_winansi(ch).unwrap_or(b'?');
            match b {
                b'\\' => out.push_str("\\\\"),
                b'(' => out.push_str("\\("),
                b')' => out.push_str("\\)"),
                0x20..=0x7E => out.push(b as char),
                _ => {
                    let _ = write!(out, "\\{:03o}", b);
                }
            }
        }
        out
    }

    // ── Fonts ───────────────────────────────────────────────────

    /// Register every font the page draws with, in a stable order.
    fn register_fonts(
        &self,
        builder: &mut PdfBuilder,
        page: &RenderedPage,
        font_context: &FontContext,
    ) -> Result<(), MenuError> {
        let mut font_chars: BTreeMap<FontKey, BTreeSet<char>> = BTreeMap::new();
        for op in &page.ops {
            if let DrawOp::Text { runs, font, .. } = op {
                let chars = font_chars.entry(font.clone()).or_default();
                for run in runs {
                    chars.extend(run.text.chars());
                }
            }
        }

        if font_chars.is_empty() {
            font_chars.insert(FontKey::new(crate::font::HELVETICA, false), BTreeSet::new());
        }

        for (key, used_chars) in &font_chars {
            match font_context.resolve(key) {
                FontData::Standard(std_font) => {
                    let obj_id = builder.push(
                        format!(
                            "<< /Type /Font /Subtype /Type1 /BaseFont /{} \
                             /Encoding /WinAnsiEncoding >>",
                            std_font.pdf_name()
                        )
                        .into_bytes(),
                    );
                    builder.font_objects.push((key.clone(), obj_id));
                }
                FontData::Custom { data, .. } => {
                    let type0_obj_id = Self::write_custom_font_objects(builder, key, data, used_chars)?;
                    builder.font_objects.push((key.clone(), type0_obj_id));
                }
            }
        }

        Ok(())
    }

    /// Write the five CIDFont objects for a custom TrueType font.
    /// Returns the object id of the Type0 root font dictionary.
    fn write_custom_font_objects(
        builder: &mut PdfBuilder,
        key: &FontKey,
        ttf_data: &[u8],
        used_chars: &BTreeSet<char>,
    ) -> Result<usize, MenuError> {
        let face = ttf_parser::Face::parse(ttf_data, 0).map_err(|e| {
            MenuError::Font(format!("Failed to parse TTF data for font '{}': {}", key.family, e))
        })?;

        let units_per_em = face.units_per_em();
        let ascender = face.ascender();
        let descender = face.descender();

        let char_to_gid: HashMap<char, u16> = used_chars
            .iter()
            .filter_map(|&ch| face.glyph_index(ch).map(|gid| (ch, gid.0)))
            .collect();

        let pdf_font_name = Self::sanitize_font_name(&key.family, key.bold);

        // 1. FontFile2
        let compressed_ttf = compress_to_vec_zlib(ttf_data, COMPRESSION_LEVEL);
        let fontfile2_id = builder.push_stream(
            &format!("/Length1 {} /Filter /FlateDecode", ttf_data.len()),
            &compressed_ttf,
        );

        // 2. FontDescriptor
        let scale = 1000.0 / units_per_em as f64;
        let bbox = face.global_bounding_box();
        let cap_height = face.capital_height().unwrap_or(ascender) as f64 * scale;
        let font_descriptor_id = builder.push(
            format!(
                "<< /Type /FontDescriptor /FontName /{} /Flags 4 \
                 /FontBBox [{} {} {} {}] /ItalicAngle 0 \
                 /Ascent {} /Descent {} /CapHeight {} /StemV {} \
                 /FontFile2 {} 0 R >>",
                pdf_font_name,
                (bbox.x_min as f64 * scale) as i32,
                (bbox.y_min as f64 * scale) as i32,
                (bbox.x_max as f64 * scale) as i32,
                (bbox.y_max as f64 * scale) as i32,
                (ascender as f64 * scale) as i32,
                (descender as f64 * scale) as i32,
                cap_height as i32,
                if key.bold { 120 } else { 80 },
                fontfile2_id,
            )
            .into_bytes(),
        );

        // 3. CIDFont (descendant)
        let w_array = Self::build_w_array(&char_to_gid, &face, units_per_em);
        let default_width = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(|adv| (adv as f64 * scale) as u32)
            .unwrap_or(1000);
        let cidfont_id = builder.push(
            format!(
                "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
                 /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
                 /FontDescriptor {} 0 R /DW {} /W {} \
                 /CIDToGIDMap /Identity >>",
                pdf_font_name, font_descriptor_id, default_width, w_array,
            )
            .into_bytes(),
        );

        // 4. ToUnicode CMap
        let cmap = Self::build_tounicode_cmap(&char_to_gid, &pdf_font_name);
        let compressed_cmap = compress_to_vec_zlib(cmap.as_bytes(), COMPRESSION_LEVEL);
        let tounicode_id = builder.push_stream("/Filter /FlateDecode", &compressed_cmap);

        // 5. Type0 root
        let type0_id = builder.push(
            format!(
                "<< /Type /Font /Subtype /Type0 /BaseFont /{} \
                 /Encoding /Identity-H /DescendantFonts [{} 0 R] \
                 /ToUnicode {} 0 R >>",
                pdf_font_name, cidfont_id, tounicode_id,
            )
            .into_bytes(),
        );

        builder
            .custom_font_data
            .insert(key.clone(), CustomFontEmbedData { char_to_gid });

        Ok(type0_id)
    }

    /// `/W` array: `[gid [width] gid [width] ...]`, sorted by glyph id.
    fn build_w_array(
        char_to_gid: &HashMap<char, u16>,
        face: &ttf_parser::Face,
        units_per_em: u16,
    ) -> String {
        let scale = 1000.0 / units_per_em as f64;
        let gids: BTreeSet<u16> = char_to_gid.values().copied().collect();

        let mut result = String::from("[");
        for gid in gids {
            let advance = face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0);
            let _ = write!(result, " {} [{}]", gid, (advance as f64 * scale) as u32);
        }
        result.push_str(" ]");
        result
    }

    /// ToUnicode CMap so text stays extractable.
    fn build_tounicode_cmap(char_to_gid: &HashMap<char, u16>, font_name: &str) -> String {
        let mut gid_to_unicode: Vec<(u16, char)> =
            char_to_gid.iter().map(|(&ch, &gid)| (gid, ch)).collect();
        gid_to_unicode.sort();
        gid_to_unicode.dedup_by_key(|(gid, _)| *gid);

        let mut cmap = String::new();
        cmap.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
        cmap.push_str("/CIDSystemInfo\n<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
        let _ = writeln!(cmap, "/CMapName /{}-UTF16 def", font_name);
        cmap.push_str("/CMapType 2 def\n1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

        // At most 100 entries per bfchar block.
        for chunk in gid_to_unicode.chunks(100) {
            let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
            for &(gid, ch) in chunk {
                let mut units = [0u16; 2];
                let hex: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{:04X}", u))
                    .collect();
                let _ = writeln!(cmap, "<{:04X}> <{}>", gid, hex);
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
        cmap
    }

    /// Strip characters that are not allowed in a PDF name.
    fn sanitize_font_name(family: &str, bold: bool) -> String {
        let mut name: String = family
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if name.is_empty() {
            name = "CustomFont".to_string();
        }
        if bold {
            name.push_str("-Bold");
        }
        name
    }

    fn build_font_resource_dict(&self, font_objects: &[(FontKey, usize)]) -> String {
        font_objects
            .iter()
            .enumerate()
            .map(|(i, (_, obj_id))| format!("/F{} {} 0 R", i, obj_id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ── Images ──────────────────────────────────────────────────

    fn register_images(&self, builder: &mut PdfBuilder, page: &RenderedPage) {
        for image in page.images() {
            let ptr = Arc::as_ptr(image);
            if builder.image_index.contains_key(&ptr) {
                continue;
            }
            let obj_id = Self::write_image_xobject(builder, image);
            builder.image_index.insert(ptr, builder.image_objects.len());
            builder.image_objects.push(obj_id);
        }
    }

    /// Write one image as one or two XObjects. Returns the main XObject id.
    fn write_image_xobject(builder: &mut PdfBuilder, image: &LoadedImage) -> usize {
        match &image.pixel_data {
            ImagePixelData::Jpeg { data, color_space } => {
                let color_space = match color_space {
                    JpegColorSpace::DeviceRGB => "/DeviceRGB",
                    JpegColorSpace::DeviceGray => "/DeviceGray",
                };
                builder.push_stream(
                    &format!(
                        "/Type /XObject /Subtype /Image /Width {} /Height {} \
                         /ColorSpace {} /BitsPerComponent 8 /Filter /DCTDecode",
                        image.width_px, image.height_px, color_space
                    ),
                    data,
                )
            }

            ImagePixelData::Decoded { rgb, alpha } => {
                let smask_id = alpha.as_ref().map(|alpha| {
                    builder.push_stream(
                        &format!(
                            "/Type /XObject /Subtype /Image /Width {} /Height {} \
                             /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                            image.width_px, image.height_px
                        ),
                        &compress_to_vec_zlib(alpha, COMPRESSION_LEVEL),
                    )
                });
                let smask_ref = smask_id
                    .map(|id| format!(" /SMask {} 0 R", id))
                    .unwrap_or_default();
                builder.push_stream(
                    &format!(
                        "/Type /XObject /Subtype /Image /Width {} /Height {} \
                         /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode{}",
                        image.width_px, image.height_px, smask_ref
                    ),
                    &compress_to_vec_zlib(rgb, COMPRESSION_LEVEL),
                )
            }
        }
    }

    fn build_xobject_resource_dict(&self, builder: &PdfBuilder) -> String {
        builder
            .image_objects
            .iter()
            .enumerate()
            .map(|(idx, obj_id)| format!("/Im{} {} 0 R", idx, obj_id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ── Strings & metadata ──────────────────────────────────────

    fn build_info_dict(info: &DocumentInfo) -> String {
        let mut dict = String::from("<< ");
        let entries = [
            ("Title", info.title.as_deref()),
            ("Subject", info.subject.as_deref()),
            ("Author", info.author.as_deref()),
            ("Creator", info.creator.as_deref()),
        ];
        for (name, value) in entries {
            if let Some(value) = value {
                let _ = write!(dict, "/{} {} ", name, Self::text_string(value));
            }
        }
        if !info.keywords.is_empty() {
            let _ = write!(dict, "/Keywords {} ", Self::text_string(&info.keywords.join(", ")));
        }
        if let Some(created) = info.created_at {
            let _ = write!(dict, "/CreationDate (D:{}Z) ", created.format("%Y%m%d%H%M%S"));
        }
        let _ = write!(dict, "/Producer (menupress {}) >>", env!("CARGO_PKG_VERSION"));
        dict
    }

    /// A PDF text string: literal for ASCII, UTF-16BE hex otherwise.
    fn text_string(s: &str) -> String {
        if s.is_ascii() {
            format!("({})", Self::escape_pdf_string(s))
        } else {
            let mut hex = String::from("<FEFF");
            for unit in s.encode_utf16() {
                let _ = write!(hex, "{:04X}", unit);
            }
            hex.push('>');
            hex
        }
    }

    fn escape_pdf_string(s: &str) -> String {
        s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
    }

    /// Map a code point to its WinAnsiEncoding (Windows-1252) byte.
    fn unicode_to_winansi(ch: char) -> Option<u8> {
        let cp = ch as u32;
        if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
            return Some(cp as u8);
        }
        match cp {
            0x20AC => Some(0x80), // euro
            0x201A => Some(0x82),
            0x0192 => Some(0x83),
            0x201E => Some(0x84),
            0x2026 => Some(0x85), // ellipsis
            0x2020 => Some(0x86),
            0x2021 => Some(0x87),
            0x02C6 => Some(0x88),
            0x2030 => Some(0x89),
            0x0160 => Some(0x8A),
            0x2039 => Some(0x8B),
            0x0152 => Some(0x8C),
            0x017D => Some(0x8E),
            0x2018 => Some(0x91), // curly quotes
            0x2019 => Some(0x92),
            0x201C => Some(0x93),
            0x201D => Some(0x94),
            0x2022 => Some(0x95), // bullet
            0x2013 => Some(0x96), // en dash
            0x2014 => Some(0x97), // em dash
            0x02DC => Some(0x98),
            0x2122 => Some(0x99),
            0x0161 => Some(0x9A),
            0x203A => Some(0x9B),
            0x0153 => Some(0x9C),
            0x017E => Some(0x9E),
            0x0178 => Some(0x9F),
            _ => None,
        }
    }

    /// Serialize all objects into the final byte stream.
    fn serialize(&self, builder: &PdfBuilder, info_obj_id: usize) -> Vec<u8> {
        let mut output: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = vec![0; builder.objects.len()];

        output.extend_from_slice(b"%PDF-1.7\n");
        output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

        for (i, obj) in builder.objects.iter().enumerate().skip(1) {
            offsets[i] = output.len();
            let _ = write!(output, "{} 0 obj\n", i);
            output.extend_from_slice(&obj.data);
            output.extend_from_slice(b"\nendobj\n\n");
        }

        let xref_offset = output.len();
        let _ = write!(output, "xref\n0 {}\n", builder.objects.len());
        output.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            let _ = write!(output, "{:010} 00000 n \n", offset);
        }

        let _ = write!(
            output,
            "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            builder.objects.len(),
            info_obj_id,
            xref_offset
        );

        output
    }
}

fn color_operands(color: &Color) -> String {
    format!("{:.3} {:.3} {:.3}", color.r, color.g, color.b)
}
