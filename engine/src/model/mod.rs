//! # Menu Model
//!
//! The input representation for an export. A [`MenuRecord`] is the JSON
//! document handed over by the backend; [`MenuRecord::into_items`] validates
//! it at the boundary and produces the immutable [`MenuItem`]s a job works on.
//!
//! ## Category rule
//!
//! An item's category is derived from image presence and nothing else:
//! an item with a non-blank `imageUrl` is [`Category::A`] (image-paired grid),
//! every other item is [`Category::B`] (centered, text only). The legacy
//! `isAlcoholic` flag is accepted for compatibility but never consulted; when
//! it disagrees with the image rule the disagreement is logged and the image
//! rule wins.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::assets::{AssetKind, AssetRef};
use crate::error::MenuError;

/// A menu as delivered by the backend, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuRecord {
    /// Backend identifier of the menu, used only for the export record.
    #[serde(default)]
    pub menu_id: Option<String>,
    /// Display name, also embedded in the output file name.
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

/// One drink as stored in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Legacy flag. Ignored for categorization.
    #[serde(default)]
    pub is_alcoholic: Option<bool>,
    /// Position within the menu. Items without one keep their input order
    /// after all ordered items.
    #[serde(default)]
    pub display_order: Option<i64>,
}

/// The two rendering buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Image-paired items, laid out in a two-column grid.
    A,
    /// Text-only items, centered beneath the grid.
    B,
}

/// A validated, immutable menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub image: Option<AssetRef>,
}

impl MenuItem {
    /// Build an item, deriving its category from the image reference.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        image_url: Option<&str>,
    ) -> Self {
        let image = image_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| AssetRef::new(AssetKind::ItemImage, url));
        let category = if image.is_some() { Category::A } else { Category::B };
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category,
            image,
        }
    }
}

impl MenuRecord {
    /// Parse a menu record from JSON.
    pub fn from_json(json: &str) -> Result<Self, MenuError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the record and convert it into ordered menu items.
    pub fn into_items(self) -> Result<Vec<MenuItem>, MenuError> {
        let mut records: Vec<(usize, ItemRecord)> = self.items.into_iter().enumerate().collect();
        // Stable: equal orders keep input order, missing orders go last.
        records.sort_by_key(|(idx, r)| (r.display_order.is_none(), r.display_order, *idx));

        records
            .into_iter()
            .map(|(_, record)| record.into_item())
            .collect()
    }
}

impl ItemRecord {
    fn into_item(self) -> Result<MenuItem, MenuError> {
        if self.name.trim().is_empty() {
            return Err(MenuError::InvalidItem {
                id: self.id,
                reason: "name must not be empty".to_string(),
            });
        }

        let item = MenuItem::new(
            self.id,
            self.name.trim(),
            self.description.trim(),
            self.image_url.as_deref(),
        );

        if let Some(flag) = self.is_alcoholic {
            if flag != (item.category == Category::A) {
                debug!(
                    item = %item.name,
                    is_alcoholic = flag,
                    category = ?item.category,
                    "isAlcoholic disagrees with image presence; using image rule"
                );
            }
        }

        Ok(item)
    }
}

/// One export request: a menu and its items, tagged with a unique token.
#[derive(Debug, Clone)]
pub struct LayoutJob {
    pub menu_name: String,
    pub menu_id: Option<String>,
    pub items: Vec<MenuItem>,
    pub job_id: Uuid,
}

impl LayoutJob {
    pub fn new(menu_name: impl Into<String>, items: Vec<MenuItem>) -> Self {
        Self {
            menu_name: menu_name.into(),
            menu_id: None,
            items,
            job_id: Uuid::new_v4(),
        }
    }

    pub fn with_menu_id(mut self, menu_id: Option<String>) -> Self {
        self.menu_id = menu_id;
        self
    }

    /// Build a job from a backend record.
    pub fn from_record(record: MenuRecord) -> Result<Self, MenuError> {
        let name = record.name.clone();
        let menu_id = record.menu_id.clone();
        let items = record.into_items()?;
        Ok(Self::new(name, items).with_menu_id(menu_id))
    }

    /// The job token as embedded in file names and cache-busting queries.
    pub fn token(&self) -> String {
        self.job_id.simple().to_string()
    }

    /// Content checksum of the menu items: a 32-bit rolling hash over their
    /// JSON form, printed as hex. Identical menus give identical checksums.
    pub fn checksum(&self) -> String {
        let json = serde_json::to_string(&self.items).unwrap_or_default();
        let mut hash: i32 = 0;
        for unit in json.encode_utf16() {
            hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32);
        }
        format!("{:x}", hash.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> MenuRecord {
        MenuRecord::from_json(json).unwrap()
    }

    #[test]
    fn test_category_follows_image_presence() {
        let with = MenuItem::new("1", "Negroni", "", Some("https://cdn/negroni.png"));
        let without = MenuItem::new("2", "Lemonade", "", None);
        let blank = MenuItem::new("3", "Water", "", Some("   "));
        assert_eq!(with.category, Category::A);
        assert_eq!(without.category, Category::B);
        assert_eq!(blank.category, Category::B);
        assert!(blank.image.is_none());
    }

    #[test]
    fn test_legacy_flag_is_ignored() {
        let items = record(
            r#"{ "name": "Bar", "items": [
                { "id": "1", "name": "Mojito", "imageUrl": null, "isAlcoholic": true },
                { "id": "2", "name": "Soda", "imageUrl": "/soda.png", "isAlcoholic": false }
            ] }"#,
        )
        .into_items()
        .unwrap();
        assert_eq!(items[0].category, Category::B);
        assert_eq!(items[1].category, Category::A);
    }

    #[test]
    fn test_display_order_is_stable() {
        let items = record(
            r#"{ "name": "Bar", "items": [
                { "id": "a", "name": "A", "displayOrder": 2 },
                { "id": "b", "name": "B" },
                { "id": "c", "name": "C", "displayOrder": 1 },
                { "id": "d", "name": "D", "displayOrder": 2 }
            ] }"#,
        )
        .into_items()
        .unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = record(r#"{ "name": "Bar", "items": [ { "id": "x", "name": "  " } ] }"#)
            .into_items()
            .unwrap_err();
        assert!(matches!(err, MenuError::InvalidItem { ref id, .. } if id == "x"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = MenuRecord::from_json(r#"{ "items": [] }"#).unwrap_err();
        assert!(matches!(err, MenuError::Parse { .. }));
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let items = vec![MenuItem::new("1", "Negroni", "Gin, Campari", None)];
        let a = LayoutJob::new("Bar", items.clone());
        let b = LayoutJob::new("Bar", items);
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.checksum(), b.checksum());
        assert!(u32::from_str_radix(&a.checksum(), 16).is_ok());
    }

    #[test]
    fn test_token_is_filename_safe() {
        let job = LayoutJob::new("Bar", vec![]);
        assert_eq!(job.token().len(), 32);
        assert!(job.token().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
