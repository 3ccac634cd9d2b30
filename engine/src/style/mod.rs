//! # Paint Style
//!
//! The handful of visual properties the menu page needs: colors, text
//! alignment and font roles. Everything is resolved up front; there is no
//! cascade.

use serde::{Deserialize, Serialize};

/// An RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Horizontal alignment of a wrapped text block inside its box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Right,
    Center,
}

/// Which of the menu's typefaces a piece of text is set in.
///
/// Roles are resolved to concrete fonts by the [`FontContext`](crate::font::FontContext):
/// the display role uses the loaded decorative font when available, the body
/// role uses the optional body font, and the footer always uses Helvetica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontRole {
    /// Item titles and the section header.
    Display,
    /// Item descriptions.
    Body,
    /// Footer branding and page index.
    Footer,
}
