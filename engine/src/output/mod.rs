//! # Output & Delivery
//!
//! Persists finished PDF bytes and hands them out.
//!
//! - The named file is written through a temp file in the target directory
//!   and renamed into place, so a failed export never leaves a partial PDF.
//! - Each export also gets a transient preview handle: a temp copy tracked
//!   in the [`HandleRegistry`]. Handles are revoked by a timer after the
//!   configured TTL or by the next job's cleanup, whichever comes first.
//!   Revoking deletes the temp file and is idempotent.
//! - A [`Viewer`] is asked to open the preview.
//!
//! The preview is created before the named file, so an export that fails
//! at any delivery step leaves nothing in the output directory.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MenuError;
use crate::model::LayoutJob;

/// Version tag written into every export record.
pub const FORMAT_VERSION: &str = "v3";

/// Build `<prefix>_<menu name>_<token>.pdf`.
pub fn file_name(prefix: &str, menu_name: &str, token: &str) -> String {
    format!("{}_{}_{}.pdf", prefix, sanitize_name(menu_name), token)
}

/// Make a menu name safe for a file name: path separators, reserved
/// characters and control characters are dropped and whitespace runs
/// become a single `_`.
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_whitespace() || !c.is_control())
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let trimmed = joined.trim_matches('.');
    if trimmed.is_empty() {
        "menu".to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Preview handles ─────────────────────────────────────────────

/// A transient, revocable copy of an exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewHandle {
    pub id: Uuid,
    pub path: PathBuf,
}

/// Live preview handles, shared with their revocation timers.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<Mutex<HashMap<Uuid, NamedTempFile>>>,
    /// Where preview files go; the system temp dir when unset.
    dir: Option<PathBuf>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Write `bytes` to a fresh temp file and track it.
    pub fn register(&self, bytes: &[u8]) -> std::io::Result<PreviewHandle> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("menupress-preview-").suffix(".pdf");
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;

        let handle = PreviewHandle {
            id: Uuid::new_v4(),
            path: file.path().to_path_buf(),
        };
        self.lock().insert(handle.id, file);
        debug!(id = %handle.id, path = %handle.path.display(), "preview handle registered");
        Ok(handle)
    }

    /// Revoke one handle. Returns whether it was still live.
    pub fn revoke(&self, id: Uuid) -> bool {
        // Dropping the temp file deletes it.
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            debug!(%id, "preview handle revoked");
        }
        removed.is_some()
    }

    /// Revoke every live handle. Returns how many were revoked.
    pub fn revoke_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "preview handles revoked");
        }
        drained.len()
    }

    /// Revoke `id` after `ttl` on the current tokio runtime.
    ///
    /// Without a runtime the handle stays live until the next cleanup.
    pub fn schedule_revoke(&self, id: Uuid, ttl: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(%id, "no runtime; handle revoked at next cleanup");
            return;
        };
        let registry = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            registry.revoke(id);
        });
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, NamedTempFile>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Viewers ─────────────────────────────────────────────────────

/// Opens a finished preview for the user.
#[async_trait]
pub trait Viewer: Send + Sync {
    async fn open(&self, path: &Path) -> std::io::Result<()>;
}

/// Logs the preview path and does nothing else.
#[derive(Debug, Default, Clone)]
pub struct LogViewer;

#[async_trait]
impl Viewer for LogViewer {
    async fn open(&self, path: &Path) -> std::io::Result<()> {
        info!(path = %path.display(), "preview ready");
        Ok(())
    }
}

/// Spawns an external program with the preview path as its last argument.
#[derive(Debug, Clone)]
pub struct CommandViewer {
    program: String,
    args: Vec<String>,
}

impl CommandViewer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line such as `xdg-open` or
    /// `open -a Preview`.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl Viewer for CommandViewer {
    async fn open(&self, path: &Path) -> std::io::Result<()> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .kill_on_drop(false)
            .spawn()?;
        debug!(program = %self.program, pid = ?child.id(), "viewer launched");
        Ok(())
    }
}

// ── Delivery ────────────────────────────────────────────────────

/// Summary of one export, suitable for an audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub generation_id: String,
    pub menu_id: Option<String>,
    pub menu_name: String,
    pub timestamp: DateTime<Utc>,
    pub item_count: usize,
    pub file_name: String,
    pub checksum: String,
    pub version: String,
}

impl ExportRecord {
    pub fn for_job(job: &LayoutJob, file_name: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            generation_id: job.token(),
            menu_id: job.menu_id.clone(),
            menu_name: job.menu_name.clone(),
            timestamp,
            item_count: job.items.len(),
            file_name: file_name.to_string(),
            checksum: job.checksum(),
            version: FORMAT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub file_path: PathBuf,
    pub byte_len: usize,
    pub preview: PreviewHandle,
    pub record: ExportRecord,
    /// Ids of items that did not fit on the page.
    pub truncated: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub handle_ttl: Duration,
    pub preview_dir: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "CardapioV3".to_string(),
            handle_ttl: Duration::from_secs(30),
            preview_dir: None,
        }
    }
}

pub struct Delivery {
    config: DeliveryConfig,
    registry: HandleRegistry,
    viewer: Arc<dyn Viewer>,
}

impl Delivery {
    pub fn new(config: DeliveryConfig, viewer: Arc<dyn Viewer>) -> Self {
        let registry = match &config.preview_dir {
            Some(dir) => HandleRegistry::in_dir(dir),
            None => HandleRegistry::new(),
        };
        Self {
            config,
            registry,
            viewer,
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Revoke every outstanding preview handle. Safe to call repeatedly.
    pub fn cleanup(&self) -> usize {
        self.registry.revoke_all()
    }

    /// Write the document, register its preview and open it.
    ///
    /// Failure to create the preview or write the named file aborts with
    /// [`MenuError::Delivery`] and leaves no file behind; a viewer that fails
    /// to launch is only logged.
    pub async fn finalize(&self, bytes: Vec<u8>, job: &LayoutJob) -> Result<ExportOutcome, MenuError> {
        let name = file_name(&self.config.file_prefix, &job.menu_name, &job.token());

        let preview = self
            .registry
            .register(&bytes)
            .map_err(|e| MenuError::delivery("failed to create preview handle", e))?;
        let file_path = match write_atomic(&self.config.output_dir, &name, &bytes) {
            Ok(path) => path,
            Err(e) => {
                self.registry.revoke(preview.id);
                return Err(e);
            }
        };
        self.registry.schedule_revoke(preview.id, self.config.handle_ttl);

        if let Err(e) = self.viewer.open(&preview.path).await {
            warn!(error = %e, path = %preview.path.display(), "viewer failed to open preview");
        }

        let record = ExportRecord::for_job(job, &name, Utc::now());
        info!(
            file = %file_path.display(),
            bytes = bytes.len(),
            checksum = %record.checksum,
            "document delivered"
        );

        Ok(ExportOutcome {
            file_path,
            byte_len: bytes.len(),
            preview,
            record,
            truncated: Vec::new(),
        })
    }
}

/// Write `bytes` to `dir/name` via a sibling temp file and an atomic rename.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, MenuError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| MenuError::delivery(format!("cannot create '{}'", dir.display()), e))?;

    let target = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| MenuError::delivery(format!("cannot stage file in '{}'", dir.display()), e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| MenuError::delivery(format!("cannot write '{}'", target.display()), e))?;
    tmp.persist(&target)
        .map_err(|e| MenuError::delivery(format!("cannot persist '{}'", target.display()), e.error))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MenuItem;

    fn job(name: &str) -> LayoutJob {
        LayoutJob::new(name, vec![MenuItem::new("1", "Negroni", "Gin", None)])
    }

    fn delivery(dir: &Path, ttl: Duration) -> Delivery {
        Delivery::new(
            DeliveryConfig {
                output_dir: dir.to_path_buf(),
                file_prefix: "CardapioV3".to_string(),
                handle_ttl: ttl,
                preview_dir: None,
            },
            Arc::new(LogViewer),
        )
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Bar  Central"), "Bar_Central");
        assert_eq!(sanitize_name("Rooftop / Summer\tMenu"), "Rooftop_Summer_Menu");
        assert_eq!(sanitize_name("../../etc"), "etc");
        assert_eq!(sanitize_name("Bar\u{0}\u{7}"), "Bar");
        assert_eq!(sanitize_name("   "), "menu");
        assert_eq!(sanitize_name("Cardápio"), "Cardápio");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name("CardapioV3", "Happy Hour", "abc123"),
            "CardapioV3_Happy_Hour_abc123.pdf"
        );
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let registry = HandleRegistry::new();
        let handle = registry.register(b"%PDF-1.7").unwrap();
        assert!(handle.path.exists());
        assert!(registry.revoke(handle.id));
        assert!(!handle.path.exists());
        assert!(!registry.revoke(handle.id));
        assert_eq!(registry.revoke_all(), 0);
        assert_eq!(registry.revoke_all(), 0);
    }

    #[tokio::test]
    async fn test_finalize_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = delivery(dir.path(), Duration::from_secs(30));
        let job = job("Happy Hour");
        let outcome = delivery.finalize(b"%PDF-1.7 test".to_vec(), &job).await.unwrap();

        let expected = format!("CardapioV3_Happy_Hour_{}.pdf", job.token());
        assert_eq!(outcome.file_path, dir.path().join(&expected));
        assert_eq!(std::fs::read(&outcome.file_path).unwrap(), b"%PDF-1.7 test");
        assert_eq!(outcome.record.file_name, expected);
        assert_eq!(outcome.record.checksum, job.checksum());
        assert_eq!(outcome.record.item_count, 1);
        assert!(delivery.registry().contains(outcome.preview.id));

        // Only the named file remains in the output directory.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_revoked_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = delivery(dir.path(), Duration::from_secs(30));
        let outcome = delivery.finalize(b"%PDF".to_vec(), &job("Bar")).await.unwrap();
        let id = outcome.preview.id;

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(delivery.registry().contains(id));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!delivery.registry().contains(id));
        assert!(!outcome.preview.path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_twice() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = delivery(dir.path(), Duration::from_secs(30));
        delivery.finalize(b"%PDF".to_vec(), &job("A")).await.unwrap();
        delivery.finalize(b"%PDF".to_vec(), &job("B")).await.unwrap();
        assert_eq!(delivery.cleanup(), 2);
        assert_eq!(delivery.cleanup(), 0);
        assert!(delivery.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_target_is_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let delivery = delivery(&blocker.join("nested"), Duration::from_secs(30));
        let err = delivery.finalize(b"%PDF".to_vec(), &job("Bar")).await.unwrap_err();
        assert!(matches!(err, MenuError::Delivery { .. }));
    }

    #[tokio::test]
    async fn test_failed_preview_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = Delivery::new(
            DeliveryConfig {
                output_dir: dir.path().to_path_buf(),
                preview_dir: Some(dir.path().join("missing")),
                ..DeliveryConfig::default()
            },
            Arc::new(LogViewer),
        );
        let err = delivery.finalize(b"%PDF".to_vec(), &job("Bar")).await.unwrap_err();
        assert!(matches!(err, MenuError::Delivery { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(delivery.registry().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_revokes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let previews = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let delivery = Delivery::new(
            DeliveryConfig {
                output_dir: blocker.join("nested"),
                preview_dir: Some(previews.path().to_path_buf()),
                ..DeliveryConfig::default()
            },
            Arc::new(LogViewer),
        );
        assert!(delivery.finalize(b"%PDF".to_vec(), &job("Bar")).await.is_err());
        assert!(delivery.registry().is_empty());
        assert_eq!(std::fs::read_dir(previews.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_command_viewer_parse() {
        let viewer = CommandViewer::parse("open -a Preview").unwrap();
        assert_eq!(viewer.program, "open");
        assert_eq!(viewer.args, vec!["-a", "Preview"]);
        assert!(CommandViewer::parse("  ").is_none());
    }
}
