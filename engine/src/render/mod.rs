//! # Page Renderer
//!
//! Paints a [`MenuPlan`] into a [`RenderedPage`]: a flat display list in
//! page coordinates (points, top-left origin) that the PDF writer
//! serializes without further decisions.
//!
//! Paint order is fixed: background, grid items (title, description,
//! image), the centered section header, centered items, and the footer.
//! Text alignment is resolved here by measuring each wrapped line with the
//! same [`FontContext`] the planner used.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assets::{AssetCache, AssetRef};
use crate::font::{FontContext, FontKey};
use crate::image_loader::LoadedImage;
use crate::layout::{mm, MenuPlan, PageGeometry, Rect, SectionHeader, TextBlock};
use crate::style::{Color, FontRole, TextAlign};

const FOOTER_FONT_SIZE: f64 = 8.0;
const RULE_WIDTH: f64 = 0.75;

/// A single-page display list.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub width: f64,
    pub height: f64,
    pub ops: Vec<DrawOp>,
}

impl RenderedPage {
    pub fn images(&self) -> impl Iterator<Item = &Arc<LoadedImage>> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Image { image, .. } => Some(image),
            _ => None,
        })
    }

    /// Every text run in paint order.
    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.ops.iter().flat_map(|op| match op {
            DrawOp::Text { runs, .. } => runs.iter(),
            _ => [].iter(),
        })
    }
}

/// One line of text positioned by its left edge and baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f64,
    pub baseline: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum DrawOp {
    Image {
        image: Arc<LoadedImage>,
        rect: Rect,
    },
    Text {
        runs: Vec<TextRun>,
        font: FontKey,
        font_size: f64,
        color: Color,
    },
    Rule {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        width: f64,
        color: Color,
    },
}

/// Footer content: branding, generation date and page index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub branding: String,
    pub generated_on: NaiveDate,
    pub page_index: usize,
    pub page_count: usize,
}

impl Footer {
    pub fn new(branding: impl Into<String>, generated_on: NaiveDate) -> Self {
        Self {
            branding: branding.into(),
            generated_on,
            page_index: 1,
            page_count: 1,
        }
    }

    /// `BRANDING - dd/mm/yyyy`
    pub fn center_text(&self) -> String {
        format!(
            "{} - {}",
            self.branding.to_uppercase(),
            self.generated_on.format("%d/%m/%Y")
        )
    }

    pub fn page_text(&self) -> String {
        format!("Page {} of {}", self.page_index, self.page_count)
    }
}

/// Everything painted around the menu items.
#[derive(Debug, Clone)]
pub struct PageDecor {
    pub background: Option<AssetRef>,
    pub section_title: String,
    pub footer: Footer,
    pub text_color: Color,
}

pub struct Renderer<'a> {
    geometry: &'a PageGeometry,
    fonts: &'a FontContext,
}

impl<'a> Renderer<'a> {
    pub fn new(geometry: &'a PageGeometry, fonts: &'a FontContext) -> Self {
        Self { geometry, fonts }
    }

    pub fn render(&self, plan: &MenuPlan, assets: &AssetCache, decor: &PageDecor) -> RenderedPage {
        let g = self.geometry;
        let mut ops = Vec::new();

        if let Some(bg) = decor.background.as_ref().and_then(|r| assets.image(r)) {
            ops.push(DrawOp::Image {
                image: Arc::clone(bg),
                rect: Rect {
                    x: 0.0,
                    y: 0.0,
                    width: g.width,
                    height: g.height,
                },
            });
        }

        for placed in plan.grid() {
            self.push_block(&mut ops, &placed.title, decor.text_color);
            self.push_block(&mut ops, &placed.description, decor.text_color);
            let image = placed
                .item
                .image
                .as_ref()
                .and_then(|r| assets.image(r))
                .zip(placed.image);
            if let Some((image, slot)) = image {
                ops.push(DrawOp::Image {
                    image: Arc::clone(image),
                    rect: fit_contain(image, slot),
                });
            }
        }

        if let Some(header) = &plan.section_header {
            self.push_section_header(&mut ops, header, &decor.section_title, decor.text_color);
        }

        for placed in plan.centered() {
            self.push_block(&mut ops, &placed.title, decor.text_color);
            self.push_block(&mut ops, &placed.description, decor.text_color);
        }

        self.push_footer(&mut ops, &decor.footer, decor.text_color);

        debug!(ops = ops.len(), "page rendered");
        RenderedPage {
            width: g.width,
            height: g.height,
            ops,
        }
    }

    fn push_block(&self, ops: &mut Vec<DrawOp>, block: &TextBlock, color: Color) {
        if block.is_empty() {
            return;
        }
        let font = self.fonts.key_for(block.role);
        let runs = block
            .baselines()
            .map(|(baseline, line)| {
                let width = self.fonts.measure_string(line, &font, block.font_size);
                TextRun {
                    x: aligned_x(block.x, block.width, width, block.align),
                    baseline,
                    text: line.to_string(),
                }
            })
            .collect();
        ops.push(DrawOp::Text {
            runs,
            font,
            font_size: block.font_size,
            color,
        });
    }

    /// Centered title with a rule on each side. A title too wide for the
    /// content area is set smaller so title and rules stay inside it.
    fn push_section_header(
        &self,
        ops: &mut Vec<DrawOp>,
        header: &SectionHeader,
        title: &str,
        color: Color,
    ) {
        let title = title.to_uppercase();
        let font = self.fonts.key_for(FontRole::Display);
        let center = self.geometry.center_x();
        let gap = mm(3.0);
        let rule_len = mm(15.0);

        let available = self.geometry.content_width() - 2.0 * (gap + rule_len);
        let natural = self.fonts.measure_string(&title, &font, header.font_size);
        let font_size = if natural > available && natural > 0.0 {
            header.font_size * available / natural
        } else {
            header.font_size
        };
        let text_width = self.fonts.measure_string(&title, &font, font_size);
        let rule_y = header.baseline - font_size * 0.3;

        let left_end = center - text_width / 2.0 - gap;
        let right_start = center + text_width / 2.0 + gap;
        for (x1, x2) in [(left_end - rule_len, left_end), (right_start, right_start + rule_len)] {
            ops.push(DrawOp::Rule {
                x1,
                y1: rule_y,
                x2,
                y2: rule_y,
                width: RULE_WIDTH,
                color,
            });
        }

        if !title.is_empty() {
            ops.push(DrawOp::Text {
                runs: vec![TextRun {
                    x: center - text_width / 2.0,
                    baseline: header.baseline,
                    text: title,
                }],
                font,
                font_size,
                color,
            });
        }
    }

    fn push_footer(&self, ops: &mut Vec<DrawOp>, footer: &Footer, color: Color) {
        let g = self.geometry;
        let font = self.fonts.key_for(FontRole::Footer);
        let baseline = g.height - g.footer_baseline;

        let center_text = footer.center_text();
        let center_width = self.fonts.measure_string(&center_text, &font, FOOTER_FONT_SIZE);
        let page_text = footer.page_text();
        let page_width = self.fonts.measure_string(&page_text, &font, FOOTER_FONT_SIZE);

        ops.push(DrawOp::Text {
            runs: vec![
                TextRun {
                    x: g.center_x() - center_width / 2.0,
                    baseline,
                    text: center_text,
                },
                TextRun {
                    x: g.width - g.margin - page_width,
                    baseline,
                    text: page_text,
                },
            ],
            font,
            font_size: FOOTER_FONT_SIZE,
            color,
        });
    }
}

fn aligned_x(x: f64, box_width: f64, line_width: f64, align: TextAlign) -> f64 {
    match align {
        TextAlign::Left => x,
        TextAlign::Right => x + box_width - line_width,
        TextAlign::Center => x + (box_width - line_width) / 2.0,
    }
}

/// Scale an image into `slot` keeping its aspect ratio, centered.
fn fit_contain(image: &LoadedImage, slot: Rect) -> Rect {
    if image.width_px == 0 || image.height_px == 0 {
        return slot;
    }
    let aspect = image.width_px as f64 / image.height_px as f64;
    let (width, height) = if aspect >= slot.width / slot.height {
        (slot.width, slot.width / aspect)
    } else {
        (slot.height * aspect, slot.height)
    };
    Rect {
        x: slot.x + (slot.width - width) / 2.0,
        y: slot.y + (slot.height - height) / 2.0,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetKind, AssetPayload};
    use crate::image_loader::ImagePixelData;
    use crate::layout::plan;
    use crate::model::MenuItem;
    use std::collections::HashSet;

    fn pixel(width_px: u32, height_px: u32) -> Arc<LoadedImage> {
        Arc::new(LoadedImage {
            pixel_data: ImagePixelData::Decoded {
                rgb: vec![0; (width_px * height_px * 3) as usize],
                alpha: None,
            },
            width_px,
            height_px,
        })
    }

    fn decor(background: Option<AssetRef>) -> PageDecor {
        PageDecor {
            background,
            section_title: "Zero proof".to_string(),
            footer: Footer::new("Bar Central", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
            text_color: Color::BLACK,
        }
    }

    #[test]
    fn test_footer_text() {
        let footer = Footer::new("Bar Central", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(footer.center_text(), "BAR CENTRAL - 09/03/2024");
        assert_eq!(footer.page_text(), "Page 1 of 1");
    }

    #[test]
    fn test_empty_plan_paints_background_and_footer() {
        let g = PageGeometry::a4();
        let fonts = FontContext::new();
        let bg = AssetRef::new(AssetKind::Background, "/bg.png");
        let mut assets = AssetCache::new();
        assets.insert(bg.clone(), AssetPayload::Image(pixel(4, 4)));

        let plan = plan(&[], &HashSet::new(), &g, &fonts);
        let page = Renderer::new(&g, &fonts).render(&plan, &assets, &decor(Some(bg)));

        assert_eq!(page.ops.len(), 2);
        match &page.ops[0] {
            DrawOp::Image { rect, .. } => {
                assert_eq!((rect.x, rect.y), (0.0, 0.0));
                assert_eq!((rect.width, rect.height), (g.width, g.height));
            }
            other => panic!("expected background first, got {other:?}"),
        }
        let runs: Vec<_> = page.text_runs().map(|r| r.text.as_str()).collect();
        assert_eq!(runs, vec!["BAR CENTRAL - 09/03/2024", "Page 1 of 1"]);
    }

    #[test]
    fn test_missing_background_is_skipped() {
        let g = PageGeometry::a4();
        let fonts = FontContext::new();
        let plan = plan(&[], &HashSet::new(), &g, &fonts);
        let bg = AssetRef::new(AssetKind::Background, "/bg.png");
        let page = Renderer::new(&g, &fonts).render(&plan, &AssetCache::new(), &decor(Some(bg)));
        assert_eq!(page.images().count(), 0);
    }

    #[test]
    fn test_paint_order() {
        let g = PageGeometry::a4();
        let fonts = FontContext::new();
        let items = vec![
            MenuItem::new("1", "Negroni", "Gin, vermouth", Some("/negroni.png")),
            MenuItem::new("2", "Lemonade", "Lemon, sugar", None),
        ];
        let image_ref = items[0].image.clone().unwrap();
        let mut assets = AssetCache::new();
        assets.insert(image_ref.clone(), AssetPayload::Image(pixel(2, 1)));
        let loaded: HashSet<_> = [image_ref].into_iter().collect();

        let plan = plan(&items, &loaded, &g, &fonts);
        let page = Renderer::new(&g, &fonts).render(&plan, &assets, &decor(None));

        let kinds: Vec<&str> = page
            .ops
            .iter()
            .map(|op| match op {
                DrawOp::Image { .. } => "image",
                DrawOp::Text { .. } => "text",
                DrawOp::Rule { .. } => "rule",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["text", "text", "image", "rule", "rule", "text", "text", "text", "text"]
        );
        let texts: Vec<_> = page.text_runs().map(|r| r.text.as_str()).collect();
        assert_eq!(texts[0], "NEGRONI");
        assert_eq!(texts[2], "ZERO PROOF");
        assert_eq!(texts[3], "LEMONADE");
    }

    #[test]
    fn test_centered_lines_are_centered() {
        let g = PageGeometry::a4();
        let fonts = FontContext::new();
        let items = vec![MenuItem::new("1", "Lemonade", "", None)];
        let plan = plan(&items, &HashSet::new(), &g, &fonts);
        let page = Renderer::new(&g, &fonts).render(&plan, &AssetCache::new(), &decor(None));

        let run = page.text_runs().find(|r| r.text == "LEMONADE").unwrap();
        let key = fonts.key_for(FontRole::Display);
        let width = fonts.measure_string("LEMONADE", &key, 24.0);
        assert!((run.x + width / 2.0 - g.center_x()).abs() < 1e-6);
    }

    #[test]
    fn test_long_section_title_stays_inside_margins() {
        let g = PageGeometry::a4();
        let fonts = FontContext::new();
        let items = vec![MenuItem::new("1", "Lemonade", "", None)];
        let plan = plan(&items, &HashSet::new(), &g, &fonts);
        let mut decor = decor(None);
        decor.section_title = "Drinks sem álcool, sucos naturais, refrigerantes e águas".to_string();
        let page = Renderer::new(&g, &fonts).render(&plan, &AssetCache::new(), &decor);

        let right_limit = g.width - g.margin + 1e-6;
        for op in &page.ops {
            match op {
                DrawOp::Rule { x1, x2, .. } => {
                    assert!(*x1 >= g.margin - 1e-6 && *x2 <= right_limit);
                }
                DrawOp::Text { runs, font, font_size, .. } => {
                    for run in runs.iter().filter(|r| r.text.starts_with("DRINKS SEM")) {
                        let width = fonts.measure_string(&run.text, font, *font_size);
                        assert!(*font_size < plan.section_header.unwrap().font_size);
                        assert!(run.x >= g.margin - 1e-6);
                        assert!(run.x + width <= right_limit);
                    }
                }
                DrawOp::Image { .. } => {}
            }
        }
    }

    #[test]
    fn test_fit_contain_keeps_aspect() {
        let slot = Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 100.0,
        };
        let wide = fit_contain(&pixel(4, 2), slot);
        assert_eq!((wide.width, wide.height), (100.0, 50.0));
        assert_eq!((wide.x, wide.y), (10.0, 45.0));
        let tall = fit_contain(&pixel(1, 2), slot);
        assert_eq!((tall.width, tall.height), (50.0, 100.0));
    }

    #[test]
    fn test_aligned_x() {
        assert_eq!(aligned_x(10.0, 100.0, 40.0, TextAlign::Left), 10.0);
        assert_eq!(aligned_x(10.0, 100.0, 40.0, TextAlign::Right), 70.0);
        assert_eq!(aligned_x(10.0, 100.0, 40.0, TextAlign::Center), 40.0);
    }
}
