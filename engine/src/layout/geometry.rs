//! Page geometry and the tunables of the menu layout.
//!
//! All lengths are PDF points with the origin at the top-left corner of the
//! page and y growing downward. Defaults describe a portrait A4 page and are
//! written in millimetres through [`mm`].

use serde::{Deserialize, Serialize};

/// Points per millimetre.
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// Convert millimetres to points.
pub fn mm(v: f64) -> f64 {
    v * PT_PER_MM
}

/// Font sizes (points) at scale 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    pub grid_title: f64,
    pub grid_description: f64,
    /// Centered-section title size when the section has at most two items.
    pub centered_title_few: f64,
    pub centered_title_many: f64,
    pub centered_description_few: f64,
    pub centered_description_many: f64,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            grid_title: 14.0,
            grid_description: 12.0,
            centered_title_few: 24.0,
            centered_title_many: 20.0,
            centered_description_few: 12.0,
            centered_description_many: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    /// Left/right page margin.
    pub margin: f64,
    /// Space reserved at the top for the background's artwork.
    pub header_space: f64,
    /// Distance from the page bottom that content must stay above. The
    /// footer lives inside this band.
    pub bottom_margin: f64,
    /// Baseline of the footer line, measured from the page bottom.
    pub footer_baseline: f64,
    /// Share of the vertical budget given to the grid when both sections
    /// have items.
    pub section_ratio: f64,
    pub column_gap: f64,
    /// Gap between an item image and its text.
    pub image_gap: f64,
    pub max_image_size: f64,
    /// Vertical space between grid items in a column.
    pub item_spacing: f64,
    /// Extra height added under a grid item's text.
    pub text_padding: f64,
    /// Extra height added under a grid item's image.
    pub image_padding: f64,
    /// Gap between a title and its description.
    pub title_gap: f64,
    /// Space between the grid and the centered section's header.
    pub section_gap: f64,
    /// Line height per point of font size.
    pub line_height_per_pt: f64,
    pub fonts: FontSizes,
    /// Grid descriptions longer than this many characters are cut.
    pub description_limit: usize,
    /// Right-column grid items put their image on the right and right-align
    /// their text.
    pub alternate_sides: bool,
    /// Smallest uniform scale the planner shrinks to before dropping items.
    pub min_scale: f64,
    pub scale_step: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

impl PageGeometry {
    /// Portrait A4.
    pub fn a4() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: mm(15.0),
            header_space: mm(60.0),
            bottom_margin: mm(20.0),
            footer_baseline: mm(7.0),
            section_ratio: 0.55,
            column_gap: mm(10.0),
            image_gap: mm(5.0),
            max_image_size: mm(45.0),
            item_spacing: mm(8.0),
            text_padding: mm(12.0),
            image_padding: mm(5.0),
            title_gap: mm(1.0),
            section_gap: mm(5.0),
            line_height_per_pt: mm(0.5),
            fonts: FontSizes::default(),
            description_limit: 150,
            alternate_sides: false,
            min_scale: 0.6,
            scale_step: 0.05,
        }
    }

    pub fn content_width(&self) -> f64 {
        self.width - 2.0 * self.margin
    }

    /// Lowest y any item may reach.
    pub fn content_bottom(&self) -> f64 {
        self.height - self.bottom_margin
    }

    /// Vertical space between the header band and the bottom margin.
    pub fn available_height(&self) -> f64 {
        (self.content_bottom() - self.header_space).max(0.0)
    }

    pub fn line_height(&self, font_size: f64) -> f64 {
        font_size * self.line_height_per_pt
    }

    pub fn center_x(&self) -> f64 {
        self.width / 2.0
    }
}
