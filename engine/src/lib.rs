//! # menupress
//!
//! Single-page menu PDF export.
//!
//! A menu is a name plus an ordered list of drinks. Drinks with an image go
//! into a two-column grid under the page header; drinks without one are
//! centered in a block anchored just above the footer. Everything lands on
//! one portrait A4 page: when the content is too tall the planner shrinks it
//! uniformly and, as a last resort, drops trailing items and says so.
//!
//! ## Architecture
//!
//! ```text
//! MenuRecord (JSON)
//!       ↓
//!   [model]    : validate, order and categorize items
//!       ↓
//!   [assets]   : fetch background, fonts and item images concurrently
//!       ↓
//!   [layout]   : place every item on the page (pure, deterministic)
//!       ↓
//!   [render]   : paint the plan into a display list
//!       ↓
//!   [pdf]      : serialize to PDF bytes
//!       ↓
//!   [output]   : atomic file write, preview handle, viewer
//! ```
//!
//! [`job::Exporter`] drives the pipeline; [`export_menu`] wraps it for the
//! common case of one JSON record and an environment-derived config.

pub mod assets;
pub mod config;
pub mod error;
pub mod font;
pub mod image_loader;
pub mod job;
pub mod layout;
pub mod model;
pub mod output;
pub mod pdf;
pub mod render;
pub mod style;
pub mod text;

pub use config::ExportConfig;
pub use error::MenuError;
pub use job::Exporter;
pub use model::{LayoutJob, MenuItem, MenuRecord};
pub use output::ExportOutcome;

/// Export a menu given as JSON.
///
/// Parses and validates the record, then runs it through an [`Exporter`]
/// built from `config`.
pub async fn export_menu(json: &str, config: ExportConfig) -> Result<ExportOutcome, MenuError> {
    let record = MenuRecord::from_json(json)?;
    let exporter = Exporter::from_config(config)?;
    exporter.export_record(record).await
}
