//! # Layout Planner
//!
//! Turns an ordered list of menu items into absolute positions on a single
//! page. The planner is pure: it reads item text through a [`TextMeasure`]
//! and knows which item images actually loaded, and produces a [`MenuPlan`]
//! the renderer paints verbatim.
//!
//! ## Sections
//!
//! The page has two stacked sections below a fixed header band:
//!
//! 1. **Grid** (category A): image-paired items in two columns. Item `i`
//!    goes to the left column when `i` is even and to the right when it is
//!    odd. Each column keeps its own cursor.
//! 2. **Centered** (category B): text-only items stacked in the middle of
//!    the page, anchored to the bottom limit and placed back-to-front so the
//!    last item lands just above the footer band. The block is clamped so it
//!    never rises into the grid.
//!
//! ## Fitting
//!
//! Page height is a hard constraint. When a pass leaves any item below the
//! bottom limit, every font size, image and spacing is scaled down by
//! `scale_step` and the page is planned again. At `min_scale` the planner
//! stops shrinking and drops trailing items (centered first unless the grid
//! alone overflows) until the rest fits. Dropped item ids are reported in
//! [`MenuPlan::truncated`]. Planning never fails and is deterministic.

pub mod geometry;

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::assets::AssetRef;
use crate::model::{Category, MenuItem};
use crate::style::{FontRole, TextAlign};
use crate::text::{wrap_text, TextMeasure};

pub use geometry::{mm, FontSizes, PageGeometry, PT_PER_MM};

const EPSILON: f64 = 1e-6;
/// Share of a grid row the image may take.
const IMAGE_ROW_SHARE: f64 = 0.85;
/// Baseline of a line, as a fraction of its line height from the line top.
const BASELINE_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Column {
    Left,
    Right,
    /// The single centered column of the text-only section.
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Wrapped lines ready to paint.
///
/// `x`/`width` describe the box the lines are aligned in; each line's
/// baseline is `first_baseline + i * line_height`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub role: FontRole,
    pub font_size: f64,
    pub line_height: f64,
    pub x: f64,
    pub top: f64,
    pub width: f64,
    pub first_baseline: f64,
    pub align: TextAlign,
}

impl TextBlock {
    pub fn height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(baseline, line)` pairs, top to bottom.
    pub fn baselines(&self) -> impl Iterator<Item = (f64, &str)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(move |(i, line)| (self.first_baseline + i as f64 * self.line_height, line.as_str()))
    }
}

/// One item with its final geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedItem {
    pub item: MenuItem,
    pub column: Column,
    /// Position within its column, counted from the top.
    pub slot: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Image box, present only when the item's image loaded.
    pub image: Option<Rect>,
    pub title: TextBlock,
    pub description: TextBlock,
}

impl PlacedItem {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// The band above the centered section holding its title.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectionHeader {
    pub y: f64,
    pub height: f64,
    pub baseline: f64,
    pub font_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuPlan {
    /// Grid items in input order, then centered items in input order.
    pub placed: Vec<PlacedItem>,
    pub section_header: Option<SectionHeader>,
    /// Uniform scale the page was planned at (1.0 when nothing shrank).
    pub scale: f64,
    /// Ids of items that did not fit even at minimum scale.
    pub truncated: Vec<String>,
    pub budget_grid: f64,
    pub budget_centered: f64,
}

impl MenuPlan {
    pub fn grid(&self) -> impl Iterator<Item = &PlacedItem> {
        self.placed.iter().filter(|p| p.column != Column::Center)
    }

    pub fn centered(&self) -> impl Iterator<Item = &PlacedItem> {
        self.placed.iter().filter(|p| p.column == Column::Center)
    }

    /// Lowest y reached by any placed item.
    pub fn content_bottom(&self) -> f64 {
        self.placed.iter().map(PlacedItem::bottom).fold(0.0, f64::max)
    }
}

/// Plan the page for `items`.
///
/// `loaded_images` holds the image references the asset loader resolved;
/// items whose image is missing keep their grid slot but get full-width
/// text and no image box.
pub fn plan(
    items: &[MenuItem],
    loaded_images: &HashSet<AssetRef>,
    geometry: &PageGeometry,
    measure: &dyn TextMeasure,
) -> MenuPlan {
    let mut grid: Vec<&MenuItem> = items.iter().filter(|i| i.category == Category::A).collect();
    let mut centered: Vec<&MenuItem> = items.iter().filter(|i| i.category == Category::B).collect();

    let planner = Planner {
        geometry,
        measure,
        loaded_images,
    };

    let mut scale = 1.0;
    loop {
        let pass = planner.pass(&grid, &centered, scale);
        if pass.fits(geometry) {
            if scale < 1.0 {
                debug!(scale, "menu shrunk to fit page");
            }
            return pass.into_plan(scale, Vec::new());
        }
        let next = scale - geometry.scale_step;
        if geometry.scale_step <= 0.0 || next < geometry.min_scale - EPSILON {
            break;
        }
        scale = next;
    }

    let scale = scale.max(geometry.min_scale);
    let mut truncated = Vec::new();
    loop {
        let pass = planner.pass(&grid, &centered, scale);
        if pass.fits(geometry) || (grid.is_empty() && centered.is_empty()) {
            if !truncated.is_empty() {
                warn!(
                    dropped = truncated.len(),
                    ids = ?truncated,
                    scale,
                    "menu does not fit one page, trailing items dropped"
                );
            }
            return pass.into_plan(scale, truncated);
        }
        let dropped = if pass.grid_bottom > geometry.content_bottom() + EPSILON || centered.is_empty() {
            grid.pop()
        } else {
            centered.pop()
        };
        if let Some(item) = dropped {
            // Dropped from the back, reported front to back.
            truncated.insert(0, item.id.clone());
        }
    }
}

/// Cut a description beyond `limit` characters, ending it with "...".
pub fn truncate_description(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

// ── Planning pass ───────────────────────────────────────────────

struct Planner<'a> {
    geometry: &'a PageGeometry,
    measure: &'a dyn TextMeasure,
    loaded_images: &'a HashSet<AssetRef>,
}

struct Pass {
    placed: Vec<PlacedItem>,
    section_header: Option<SectionHeader>,
    grid_bottom: f64,
    budget_grid: f64,
    budget_centered: f64,
}

impl Pass {
    fn fits(&self, geometry: &PageGeometry) -> bool {
        let limit = geometry.content_bottom() + EPSILON;
        self.placed.iter().all(|p| p.bottom() <= limit)
    }

    fn into_plan(self, scale: f64, truncated: Vec<String>) -> MenuPlan {
        MenuPlan {
            placed: self.placed,
            section_header: self.section_header,
            scale,
            truncated,
            budget_grid: self.budget_grid,
            budget_centered: self.budget_centered,
        }
    }
}

impl Planner<'_> {
    fn pass(&self, grid: &[&MenuItem], centered: &[&MenuItem], scale: f64) -> Pass {
        let g = self.geometry;
        let available = g.available_height();
        let (budget_grid, budget_centered) = match (grid.is_empty(), centered.is_empty()) {
            (false, false) => (available * g.section_ratio, available * (1.0 - g.section_ratio)),
            (false, true) => (available, 0.0),
            (true, false) => (0.0, available),
            (true, true) => (0.0, 0.0),
        };

        let mut placed = Vec::with_capacity(grid.len() + centered.len());
        let mut cursor = g.header_space;
        let mut grid_bottom = g.header_space;

        if !grid.is_empty() {
            let (items, bottom, next_cursor) = self.place_grid(grid, budget_grid, scale);
            placed.extend(items);
            grid_bottom = bottom;
            cursor = next_cursor;
        }

        let mut section_header = None;
        if !centered.is_empty() {
            let (items, header) = self.place_centered(centered, cursor, scale);
            placed.extend(items);
            section_header = Some(header);
        }

        Pass {
            placed,
            section_header,
            grid_bottom,
            budget_grid,
            budget_centered,
        }
    }

    /// Returns the placed items, the lowest item bottom, and the cursor the
    /// centered section starts from.
    fn place_grid(
        &self,
        grid: &[&MenuItem],
        budget: f64,
        scale: f64,
    ) -> (Vec<PlacedItem>, f64, f64) {
        let g = self.geometry;
        let rows = if grid.len() <= 2 {
            1
        } else {
            grid.len().div_ceil(2)
        };
        let space_per_row = budget / rows as f64;
        let image_size = g.max_image_size.min(space_per_row * IMAGE_ROW_SHARE) * scale;

        let column_width = g.content_width() / 2.0;
        let usable = (column_width - g.column_gap).max(0.0);
        let title_size = g.fonts.grid_title * scale;
        let desc_size = g.fonts.grid_description * scale;

        let mut cursors = [g.header_space; 2];
        let mut bottom = g.header_space;
        let mut placed = Vec::with_capacity(grid.len());

        for (index, item) in grid.iter().enumerate() {
            let col = index % 2;
            let column = if col == 0 { Column::Left } else { Column::Right };
            let col_x = g.margin + col as f64 * column_width;
            let y = cursors[col];

            let has_image = item.image.as_ref().is_some_and(|a| self.loaded_images.contains(a));
            let mirrored = g.alternate_sides && column == Column::Right;

            let image = has_image.then(|| Rect {
                x: if mirrored { col_x + usable - image_size } else { col_x },
                y,
                width: image_size,
                height: image_size,
            });

            let text_offset = if has_image { image_size + g.image_gap } else { 0.0 };
            let text_width = (usable - text_offset).max(1.0);
            let text_x = if mirrored { col_x } else { col_x + text_offset };
            let align = if mirrored { TextAlign::Right } else { TextAlign::Left };

            let title = self.block(
                &item.name.to_uppercase(),
                FontRole::Display,
                title_size,
                text_x,
                y,
                text_width,
                align,
            );
            let description = self.block(
                &truncate_description(&item.description, g.description_limit),
                FontRole::Body,
                desc_size,
                text_x,
                y + title.height() + g.title_gap * scale,
                text_width,
                align,
            );

            let text_height = title.height() + g.title_gap * scale + description.height();
            let height = (text_height + g.text_padding * scale).max(image_size + g.image_padding * scale);

            debug!(
                item = %item.name,
                ?column,
                slot = index / 2,
                y,
                height,
                has_image,
                "grid item placed"
            );

            bottom = bottom.max(y + height);
            cursors[col] = y + height + g.item_spacing * scale;
            placed.push(PlacedItem {
                item: (*item).clone(),
                column,
                slot: index / 2,
                x: col_x,
                y,
                width: usable,
                height,
                image,
                title,
                description,
            });
        }

        let next_cursor = cursors[0].max(cursors[1]) + g.section_gap * scale;
        (placed, bottom, next_cursor)
    }

    fn place_centered(
        &self,
        centered: &[&MenuItem],
        cursor: f64,
        scale: f64,
    ) -> (Vec<PlacedItem>, SectionHeader) {
        let g = self.geometry;
        let many = centered.len() > 2;
        let (title_size, desc_size) = if many {
            (g.fonts.centered_title_many, g.fonts.centered_description_many)
        } else {
            (g.fonts.centered_title_few, g.fonts.centered_description_few)
        };
        let title_size = title_size * scale;
        let desc_size = desc_size * scale;
        let spacing_factor = mm(if many { 3.0 } else { 6.0 }) * scale;
        let item_spacing = mm(if many { 4.0 } else { 6.0 }) * scale;
        let header_height = mm(if many { 8.0 } else { 12.0 }) * scale;
        let title_gap = mm(0.5) * scale;

        let content_width = g.content_width();
        let title_width = content_width * 0.7;
        let desc_width = content_width * 0.75;
        let center = g.center_x();

        // Measure first at y = 0, then shift into place.
        let measured: Vec<(TextBlock, TextBlock, f64)> = centered
            .iter()
            .map(|item| {
                let title = self.block(
                    &item.name.to_uppercase(),
                    FontRole::Display,
                    title_size,
                    center - title_width / 2.0,
                    0.0,
                    title_width,
                    TextAlign::Center,
                );
                let description = self.block(
                    &item.description,
                    FontRole::Body,
                    desc_size,
                    center - desc_width / 2.0,
                    title.height() + title_gap,
                    desc_width,
                    TextAlign::Center,
                );
                let height = title.height() + title_gap + description.height() + spacing_factor;
                (title, description, height)
            })
            .collect();

        let total: f64 = measured.iter().map(|(_, _, h)| h).sum::<f64>()
            + item_spacing * (measured.len().saturating_sub(1)) as f64;

        let min_top = cursor + header_height;
        let top = (g.content_bottom() - total).max(min_top);

        // Back to front: the last item is anchored at the bottom of the block.
        let mut placed = Vec::with_capacity(measured.len());
        let mut item_bottom = top + total;
        for (index, (item, (title, description, height))) in
            centered.iter().zip(measured).enumerate().rev()
        {
            let y = item_bottom - height;
            placed.push(PlacedItem {
                item: (*item).clone(),
                column: Column::Center,
                slot: index,
                x: center - desc_width / 2.0,
                y,
                width: desc_width,
                height,
                image: None,
                title: title.shifted(y),
                description: description.shifted(y),
            });
            item_bottom = y - item_spacing;
        }
        placed.reverse();

        let header_y = top - header_height;
        let header = SectionHeader {
            y: header_y,
            height: header_height,
            baseline: header_y + title_size * 0.8,
            font_size: title_size,
        };
        (placed, header)
    }

    #[allow(clippy::too_many_arguments)]
    fn block(
        &self,
        text: &str,
        role: FontRole,
        font_size: f64,
        x: f64,
        top: f64,
        width: f64,
        align: TextAlign,
    ) -> TextBlock {
        let line_height = self.geometry.line_height(font_size);
        TextBlock {
            lines: wrap_text(self.measure, text, role, font_size, width),
            role,
            font_size,
            line_height,
            x,
            top,
            width,
            first_baseline: top + line_height * BASELINE_RATIO,
            align,
        }
    }
}

impl TextBlock {
    fn shifted(mut self, dy: f64) -> Self {
        self.top += dy;
        self.first_baseline += dy;
        self
    }
}
