use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::layout::PageGeometry;
use crate::output::{CommandViewer, DeliveryConfig, LogViewer, Viewer};

/// Export settings, read from `MENUPRESS_*` environment variables with
/// defaults for everything. A `.env` file is honoured when present.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory or URL that bare asset paths are resolved against.
    pub asset_base: String,
    pub background: String,
    pub title_font: String,
    pub body_font: Option<String>,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub branding: String,
    pub section_title: String,
    pub handle_ttl: Duration,
    /// Command used to open previews; previews are only logged when unset.
    pub viewer: Option<String>,
    /// Directory for preview files; the system temp dir when unset.
    pub preview_dir: Option<PathBuf>,
    pub geometry: PageGeometry,
    pub rust_log: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            asset_base: "./public".to_string(),
            background: "fundo_menu.png".to_string(),
            title_font: "felix.ttf".to_string(),
            body_font: None,
            output_dir: PathBuf::from("."),
            file_prefix: "CardapioV3".to_string(),
            branding: "Menupress".to_string(),
            section_title: "Drinks não alcoólicos".to_string(),
            handle_ttl: Duration::from_secs(30),
            viewer: None,
            preview_dir: None,
            geometry: PageGeometry::a4(),
            rust_log: "info".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let handle_ttl = match var("MENUPRESS_HANDLE_TTL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .context("MENUPRESS_HANDLE_TTL_SECS must be a whole number of seconds")?,
            ),
            None => defaults.handle_ttl,
        };

        let mut geometry = defaults.geometry.clone();
        if let Some(raw) = var("MENUPRESS_ALTERNATE_SIDES") {
            geometry.alternate_sides = parse_bool(&raw)
                .context("MENUPRESS_ALTERNATE_SIDES must be true or false")?;
        }

        Ok(ExportConfig {
            asset_base: var("MENUPRESS_ASSET_BASE").unwrap_or(defaults.asset_base),
            background: var("MENUPRESS_BACKGROUND").unwrap_or(defaults.background),
            title_font: var("MENUPRESS_TITLE_FONT").unwrap_or(defaults.title_font),
            body_font: var("MENUPRESS_BODY_FONT"),
            output_dir: var("MENUPRESS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            file_prefix: var("MENUPRESS_FILE_PREFIX").unwrap_or(defaults.file_prefix),
            branding: var("MENUPRESS_BRANDING").unwrap_or(defaults.branding),
            section_title: var("MENUPRESS_SECTION_TITLE").unwrap_or(defaults.section_title),
            handle_ttl,
            viewer: var("MENUPRESS_VIEWER"),
            preview_dir: var("MENUPRESS_PREVIEW_DIR").map(PathBuf::from),
            geometry,
            rust_log: var("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            output_dir: self.output_dir.clone(),
            file_prefix: self.file_prefix.clone(),
            handle_ttl: self.handle_ttl,
            preview_dir: self.preview_dir.clone(),
        }
    }

    /// The configured viewer, or [`LogViewer`] when none is set.
    pub fn viewer(&self) -> Arc<dyn Viewer> {
        match self.viewer.as_deref().and_then(CommandViewer::parse) {
            Some(command) => Arc::new(command),
            None => Arc::new(LogViewer),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised boolean '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ExportConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExportConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.file_prefix, "CardapioV3");
        assert_eq!(c.handle_ttl, Duration::from_secs(30));
        assert!(c.body_font.is_none());
        assert!(c.viewer.is_none());
        assert!(!c.geometry.alternate_sides);
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("MENUPRESS_ASSET_BASE", "https://cdn.example"),
            ("MENUPRESS_BODY_FONT", "body.ttf"),
            ("MENUPRESS_HANDLE_TTL_SECS", "5"),
            ("MENUPRESS_OUTPUT_DIR", "/tmp/menus"),
            ("MENUPRESS_ALTERNATE_SIDES", "yes"),
            ("MENUPRESS_VIEWER", "   "),
            ("MENUPRESS_PREVIEW_DIR", "/tmp/previews"),
        ])
        .unwrap();
        assert_eq!(c.asset_base, "https://cdn.example");
        assert_eq!(c.body_font.as_deref(), Some("body.ttf"));
        assert_eq!(c.handle_ttl, Duration::from_secs(5));
        assert_eq!(c.delivery().output_dir, PathBuf::from("/tmp/menus"));
        assert!(c.geometry.alternate_sides);
        assert_eq!(c.delivery().preview_dir, Some(PathBuf::from("/tmp/previews")));
        assert!(c.viewer.is_none(), "blank values fall back to defaults");
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = config(&[("MENUPRESS_HANDLE_TTL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("MENUPRESS_HANDLE_TTL_SECS"));
        assert!(config(&[("MENUPRESS_ALTERNATE_SIDES", "maybe")]).is_err());
    }
}
