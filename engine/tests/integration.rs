//! Integration tests for the menupress export pipeline.
//!
//! These tests run menus from JSON all the way to a delivered PDF file.
//! They verify:
//! - records are validated, ordered and categorized at the boundary
//! - missing assets degrade the page instead of failing the export
//! - the PDF is structurally valid and embeds what was loaded
//! - grid placement follows input order
//! - preview handles are revoked between and after jobs

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use menupress::assets::{AssetCache, AssetError, AssetFetcher};
use menupress::layout::Column;
use menupress::model::Category;
use menupress::output::LogViewer;
use menupress::{ExportConfig, Exporter, LayoutJob, MenuError, MenuItem, MenuRecord};

// ─── Helpers ────────────────────────────────────────────────────

/// Serves assets from memory and remembers what was asked for.
#[derive(Default)]
struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    fn with(files: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            files: files.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, location: &str, _cache_bust: &str) -> Result<Vec<u8>, AssetError> {
        self.requested.lock().unwrap().push(location.to_string());
        self.files.get(location).cloned().ok_or_else(|| AssetError::Status {
            status: 404,
            location: location.to_string(),
        })
    }
}

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
        .unwrap();
    buf
}

fn exporter(dir: &Path, fetcher: Arc<MemoryFetcher>) -> Exporter {
    let config = ExportConfig {
        output_dir: dir.to_path_buf(),
        ..ExportConfig::default()
    };
    Exporter::new(config, fetcher, Arc::new(LogViewer))
}

fn offline(dir: &Path) -> Exporter {
    exporter(dir, Arc::new(MemoryFetcher::default()))
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.starts_with(b"%PDF-1.7"), "missing PDF header");
    assert!(contains(bytes, b"xref"), "missing xref table");
    assert!(contains(bytes, b"trailer"), "missing trailer");
    assert!(
        bytes.ends_with(b"%%EOF\n") || bytes.ends_with(b"%%EOF"),
        "missing EOF marker"
    );
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

const MENU_JSON: &str = r#"{
    "menuId": "m-42",
    "name": "Happy Hour",
    "items": [
        { "id": "b1", "name": "Lemonade", "description": "Lemon and soda", "displayOrder": 3 },
        { "id": "a2", "name": "Spritz", "description": "Aperol, prosecco", "imageUrl": "/spritz.png", "displayOrder": 2 },
        { "id": "a1", "name": "Negroni", "description": "Gin, Campari, vermouth", "imageUrl": "/negroni.png", "displayOrder": 1 },
        { "id": "a3", "name": "Mojito", "description": "Rum, mint, lime", "imageUrl": "/mojito.png", "isAlcoholic": false, "displayOrder": 4 }
    ]
}"#;

// ─── Model boundary ─────────────────────────────────────────────

#[test]
fn test_record_is_ordered_and_categorized() {
    let job = LayoutJob::from_record(MenuRecord::from_json(MENU_JSON).unwrap()).unwrap();
    let ids: Vec<_> = job.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "b1", "a3"]);

    let categories: Vec<_> = job.items.iter().map(|i| i.category).collect();
    assert_eq!(
        categories,
        vec![Category::A, Category::A, Category::B, Category::A],
        "image presence decides the category, isAlcoholic is ignored"
    );
    assert_eq!(job.menu_id.as_deref(), Some("m-42"));
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = MenuRecord::from_json("{ \"name\": ").unwrap_err();
    assert!(matches!(err, MenuError::Parse { .. }));
}

#[test]
fn test_blank_item_name_is_rejected() {
    let record = MenuRecord::from_json(
        r#"{ "name": "Bar", "items": [ { "id": "x", "name": "   " } ] }"#,
    )
    .unwrap();
    match LayoutJob::from_record(record) {
        Err(MenuError::InvalidItem { id, .. }) => assert_eq!(id, "x"),
        other => panic!("expected InvalidItem, got {:?}", other.map(|j| j.items.len())),
    }
}

// ─── Full pipeline ──────────────────────────────────────────────

#[tokio::test]
async fn test_export_with_all_assets() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MemoryFetcher::with(vec![
        ("fundo_menu.png", png(8, 12, [240, 230, 210, 255])),
        ("/negroni.png", png(4, 4, [200, 30, 30, 255])),
        ("/spritz.png", png(4, 6, [250, 120, 20, 255])),
        ("/mojito.png", png(6, 4, [60, 200, 60, 255])),
    ]));
    let exporter = exporter(dir.path(), fetcher.clone());

    let record = MenuRecord::from_json(MENU_JSON).unwrap();
    let outcome = exporter.export_record(record).await.unwrap();

    let bytes = std::fs::read(&outcome.file_path).unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(bytes.len(), outcome.byte_len);
    // Background plus three item images.
    assert_eq!(count(&bytes, b"/Subtype /Image"), 4);
    assert!(outcome.truncated.is_empty());

    let requested = fetcher.requested.lock().unwrap();
    assert!(requested.contains(&"felix.ttf".to_string()));
    assert_eq!(requested.len(), 5, "each asset is fetched once");

    assert_eq!(outcome.record.menu_id.as_deref(), Some("m-42"));
    assert_eq!(outcome.record.item_count, 4);
    assert_eq!(outcome.record.version, "v3");
}

#[tokio::test]
async fn test_export_survives_every_fetch_failing() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = offline(dir.path());

    let outcome = exporter
        .export_record(MenuRecord::from_json(MENU_JSON).unwrap())
        .await
        .unwrap();

    let bytes = std::fs::read(&outcome.file_path).unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(count(&bytes, b"/Subtype /Image"), 0);
    // Standard fallbacks stand in for the display font.
    assert!(contains(&bytes, b"/BaseFont /Times-Bold") || contains(&bytes, b"/BaseFont /Helvetica"));
}

#[tokio::test]
async fn test_file_name_carries_menu_and_token() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = offline(dir.path());
    let job = LayoutJob::new("Happy Hour / Late", vec![MenuItem::new("1", "Tonic", "", None)]);
    let token = job.token();

    let outcome = exporter.export(job).await.unwrap();
    let name = outcome.file_path.file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(name, format!("CardapioV3_Happy_Hour_Late_{token}.pdf"));
    assert_eq!(outcome.record.file_name, name);
}

#[tokio::test]
async fn test_repeated_exports_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = offline(dir.path());
    let items = vec![MenuItem::new("1", "Tonic", "Quinine", None)];

    let first = exporter.export(LayoutJob::new("Bar", items.clone())).await.unwrap();
    let second = exporter.export(LayoutJob::new("Bar", items)).await.unwrap();
    assert_ne!(first.file_path, second.file_path);
    assert_eq!(first.record.checksum, second.record.checksum);
    assert_ne!(first.record.generation_id, second.record.generation_id);
}

#[tokio::test]
async fn test_cleanup_after_export_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = offline(dir.path());
    let outcome = exporter
        .export(LayoutJob::new("Bar", vec![MenuItem::new("1", "Tonic", "", None)]))
        .await
        .unwrap();

    assert!(exporter.registry().contains(outcome.preview.id));
    assert!(outcome.preview.path.exists());
    assert_eq!(exporter.cleanup(), 1);
    assert_eq!(exporter.cleanup(), 0);
    assert!(!outcome.preview.path.exists());
    // The delivered file is not a preview and stays.
    assert!(outcome.file_path.exists());
}

#[tokio::test]
async fn test_unwritable_output_dir_fails_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let exporter = offline(&blocker);
    let err = exporter
        .export(LayoutJob::new("Bar", vec![MenuItem::new("1", "Tonic", "", None)]))
        .await
        .unwrap_err();
    assert!(matches!(err, MenuError::Delivery { .. }));
}

#[tokio::test]
async fn test_export_menu_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let config = ExportConfig {
        output_dir: dir.path().to_path_buf(),
        asset_base: dir.path().join("missing-assets").display().to_string(),
        ..ExportConfig::default()
    };
    let outcome = menupress::export_menu(MENU_JSON, config).await.unwrap();
    assert_valid_pdf(&std::fs::read(&outcome.file_path).unwrap());
}

// ─── Composition ────────────────────────────────────────────────

fn compose(exporter: &Exporter, items: Vec<MenuItem>) -> menupress::job::ComposedDocument {
    let at = Utc.with_ymd_and_hms(2024, 5, 17, 20, 0, 0).unwrap();
    exporter
        .compose(&LayoutJob::new("Bar", items), &AssetCache::new(), at)
        .unwrap()
}

#[test]
fn test_empty_menu_still_renders_a_page() {
    let dir = tempfile::tempdir().unwrap();
    let doc = compose(&offline(dir.path()), vec![]);
    assert_valid_pdf(&doc.bytes);
    assert!(doc.plan.placed.is_empty());
    assert!(doc.plan.section_header.is_none());
    assert_eq!(count(&doc.bytes, b"/Type /Page "), 1);
}

#[test]
fn test_grid_positions_follow_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        MenuItem::new("a1", "Negroni", "Gin", Some("/a1.png")),
        MenuItem::new("a2", "Spritz", "Aperol", Some("/a2.png")),
        MenuItem::new("a3", "Mojito", "Rum", Some("/a3.png")),
    ];
    let doc = compose(&offline(dir.path()), items);
    let slots: Vec<_> = doc
        .plan
        .grid()
        .map(|p| (p.item.id.as_str(), p.column, p.slot))
        .collect();
    assert_eq!(
        slots,
        vec![
            ("a1", Column::Left, 0),
            ("a2", Column::Right, 0),
            ("a3", Column::Left, 1),
        ]
    );
}

#[test]
fn test_compose_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = offline(dir.path());
    let items = vec![
        MenuItem::new("a1", "Negroni", "Gin", Some("/a1.png")),
        MenuItem::new("b1", "Lemonade", "Lemon", None),
    ];
    let a = compose(&exporter, items.clone());
    let b = compose(&exporter, items);
    assert_eq!(a.bytes, b.bytes);
}
