//! # Font Management
//!
//! Resolves the menu's three font roles to concrete fonts and measures text.
//!
//! Titles fall back to Times-Bold, descriptions to Times and the footer
//! always uses Helvetica, all standard PDF fonts that need no embedding. The decorative title font and
//! the optional body font arrive as fetched TrueType assets and are parsed
//! with ttf-parser. A font that fails to parse is reported to the caller,
//! which logs it and keeps the standard fallback, so measurement itself can
//! never fail.

pub mod metrics;

pub use metrics::StandardFontMetrics;
use std::collections::HashMap;

use crate::error::MenuError;
use crate::style::FontRole;
use crate::text::TextMeasure;

/// Identifies one concrete font inside a [`FontContext`].
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FontData {
    /// One of the standard PDF fonts. No embedding needed.
    Standard(StandardFont),
    /// A TrueType/OpenType font that will be embedded in full.
    Custom {
        data: Vec<u8>,
        metrics: CustomFontMetrics,
    },
}

/// Parsed metrics from a TrueType/OpenType font via ttf-parser.
#[derive(Debug, Clone)]
pub struct CustomFontMetrics {
    pub units_per_em: u16,
    /// Advance of every character the font's Unicode cmap maps.
    pub advance_widths: HashMap<char, u16>,
    /// Advance of `.notdef`, which is what an unmapped character paints.
    pub missing_advance: u16,
    pub ascender: i16,
    pub descender: i16,
}

impl CustomFontMetrics {
    /// Get the advance width of a character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let w = self
            .advance_widths
            .get(&ch)
            .copied()
            .unwrap_or(self.missing_advance);
        (w as f64 / self.units_per_em as f64) * font_size
    }

    /// Parse metrics from font data using ttf-parser.
    pub fn from_font_data(data: &[u8]) -> Result<Self, ttf_parser::FaceParsingError> {
        let face = ttf_parser::Face::parse(data, 0)?;
        let units_per_em = face.units_per_em();

        let mut codepoints = Vec::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables.into_iter().filter(|t| t.is_unicode()) {
                subtable.codepoints(|cp| codepoints.push(cp));
            }
        }

        let mut advance_widths = HashMap::with_capacity(codepoints.len());
        for ch in codepoints.into_iter().filter_map(char::from_u32) {
            if let Some(glyph_id) = face.glyph_index(ch) {
                advance_widths.insert(ch, face.glyph_hor_advance(glyph_id).unwrap_or(0));
            }
        }

        // Matches the /DW the PDF writer emits for the font.
        let missing_advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .unwrap_or(units_per_em);

        Ok(CustomFontMetrics {
            units_per_em,
            advance_widths,
            missing_advance,
            ascender: face.ascender(),
            descender: face.descender(),
        })
    }
}

/// The standard PDF fonts the menu page draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    TimesBold,
}

impl StandardFont {
    /// The PDF name for this font.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::TimesRoman => "Times-Roman",
            Self::TimesBold => "Times-Bold",
        }
    }
}

pub const TIMES: &str = "Times";
pub const HELVETICA: &str = "Helvetica";

/// Shared font context used by layout, rendering and PDF serialization.
pub struct FontContext {
    fonts: HashMap<FontKey, FontData>,
    roles: HashMap<FontRole, FontKey>,
}

impl Default for FontContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FontContext {
    /// A context with only the standard fonts: Times-Bold for titles,
    /// Times for descriptions, Helvetica for the footer.
    pub fn new() -> Self {
        let mut fonts = HashMap::new();
        for (family, bold, font) in [
            (HELVETICA, false, StandardFont::Helvetica),
            (TIMES, false, StandardFont::TimesRoman),
            (TIMES, true, StandardFont::TimesBold),
        ] {
            fonts.insert(FontKey::new(family, bold), FontData::Standard(font));
        }

        let mut roles = HashMap::new();
        roles.insert(FontRole::Display, FontKey::new(TIMES, true));
        roles.insert(FontRole::Body, FontKey::new(TIMES, false));
        roles.insert(FontRole::Footer, FontKey::new(HELVETICA, false));

        Self { fonts, roles }
    }

    /// Register a TrueType font and bind it to `role`.
    ///
    /// On error the role keeps its previous (standard) font.
    pub fn register_custom(
        &mut self,
        role: FontRole,
        family: &str,
        data: Vec<u8>,
    ) -> Result<(), MenuError> {
        let metrics = CustomFontMetrics::from_font_data(&data)
            .map_err(|e| MenuError::Font(format!("Failed to parse font '{}': {}", family, e)))?;
        let key = FontKey::new(family, false);
        self.fonts
            .insert(key.clone(), FontData::Custom { data, metrics });
        self.roles.insert(role, key);
        Ok(())
    }

    /// The concrete font a role is currently bound to.
    pub fn key_for(&self, role: FontRole) -> FontKey {
        self.roles
            .get(&role)
            .cloned()
            .unwrap_or_else(|| FontKey::new(TIMES, false))
    }

    /// Whether a role is served by an embedded custom font.
    pub fn is_custom(&self, role: FontRole) -> bool {
        matches!(self.resolve(&self.key_for(role)), FontData::Custom { .. })
    }

    /// Look up a font, falling back to Times-Roman if not found.
    pub fn resolve(&self, key: &FontKey) -> &FontData {
        static FALLBACK: FontData = FontData::Standard(StandardFont::TimesRoman);
        self.fonts.get(key).unwrap_or(&FALLBACK)
    }

    /// Measure the width of a string in points.
    pub fn measure_string(&self, text: &str, key: &FontKey, font_size: f64) -> f64 {
        match self.resolve(key) {
            FontData::Standard(std_font) => std_font.metrics().measure_string(text, font_size),
            FontData::Custom { metrics, .. } => {
                text.chars().map(|ch| metrics.char_width(ch, font_size)).sum()
            }
        }
    }
}

impl TextMeasure for FontContext {
    fn measure(&self, text: &str, role: FontRole, font_size: f64) -> f64 {
        self.measure_string(text, &self.key_for(role), font_size)
    }
}
