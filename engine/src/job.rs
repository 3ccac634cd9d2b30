//! # Export Jobs
//!
//! [`Exporter::export`] is the single entry point that runs one menu
//! through the whole pipeline:
//!
//! 1. revoke previews left over from earlier jobs
//! 2. load every referenced asset concurrently
//! 3. register the loaded fonts
//! 4. plan, render and serialize the page
//! 5. deliver the file
//!
//! Everything a job loads lives in a [`JobContext`] that is dropped when
//! the job ends, on success or failure. Nothing is cached across jobs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::assets::{
    AssetBase, AssetCache, AssetFetcher, AssetKind, AssetLoader, AssetRef, AssetRequest, FontSlot,
    SourceFetcher,
};
use crate::config::ExportConfig;
use crate::error::MenuError;
use crate::font::FontContext;
use crate::layout::{self, MenuPlan};
use crate::model::{LayoutJob, MenuRecord};
use crate::output::{Delivery, ExportOutcome, HandleRegistry, Viewer};
use crate::pdf::{DocumentInfo, PdfWriter};
use crate::render::{Footer, PageDecor, Renderer};
use crate::style::{Color, FontRole};

/// Assets owned by one running job. Released on drop.
pub struct JobContext {
    token: String,
    pub assets: AssetCache,
}

impl JobContext {
    fn new(token: String, assets: AssetCache) -> Self {
        Self { token, assets }
    }
}

impl Drop for JobContext {
    fn drop(&mut self) {
        debug!(job = %self.token, assets = self.assets.len(), "job context released");
        self.assets.clear();
    }
}

/// A finished document before delivery.
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub plan: MenuPlan,
}

pub struct Exporter {
    config: ExportConfig,
    loader: AssetLoader,
    delivery: Delivery,
    writer: PdfWriter,
}

impl Exporter {
    pub fn new(config: ExportConfig, fetcher: Arc<dyn AssetFetcher>, viewer: Arc<dyn Viewer>) -> Self {
        let delivery = Delivery::new(config.delivery(), viewer);
        Self {
            config,
            loader: AssetLoader::new(fetcher),
            delivery,
            writer: PdfWriter::new(),
        }
    }

    /// An exporter that fetches from the configured asset base and opens
    /// previews with the configured viewer.
    pub fn from_config(config: ExportConfig) -> Result<Self, MenuError> {
        let fetcher = SourceFetcher::new(AssetBase::parse(&config.asset_base))
            .map_err(|e| MenuError::Config(format!("cannot build asset fetcher: {e}")))?;
        let viewer = config.viewer();
        Ok(Self::new(config, Arc::new(fetcher), viewer))
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        self.delivery.registry()
    }

    /// Revoke every outstanding preview. Idempotent.
    pub fn cleanup(&self) -> usize {
        self.delivery.cleanup()
    }

    /// Validate a backend record and export it.
    pub async fn export_record(&self, record: MenuRecord) -> Result<ExportOutcome, MenuError> {
        let job = LayoutJob::from_record(record)?;
        self.export(job).await
    }

    /// Run one job end to end.
    pub async fn export(&self, job: LayoutJob) -> Result<ExportOutcome, MenuError> {
        let revoked = self.cleanup();
        let token = job.token();
        info!(
            job = %token,
            menu = %job.menu_name,
            items = job.items.len(),
            revoked,
            "export started"
        );

        let assets = self.loader.load(self.asset_requests(&job), &token).await;
        let context = JobContext::new(token.clone(), assets);

        let document = self.compose(&job, &context.assets, Utc::now())?;
        drop(context);

        let mut outcome = self.delivery.finalize(document.bytes, &job).await?;
        outcome.truncated = document.plan.truncated;

        info!(
            job = %token,
            file = %outcome.file_path.display(),
            bytes = outcome.byte_len,
            scale = document.plan.scale,
            truncated = outcome.truncated.len(),
            checksum = %outcome.record.checksum,
            "export finished"
        );
        Ok(outcome)
    }

    /// Plan, render and serialize a job against already-loaded assets.
    ///
    /// Pure apart from logging: the same job, assets and timestamp always
    /// give the same bytes.
    pub fn compose(
        &self,
        job: &LayoutJob,
        assets: &AssetCache,
        generated_at: DateTime<Utc>,
    ) -> Result<ComposedDocument, MenuError> {
        let fonts = self.font_context(assets);
        let geometry = &self.config.geometry;

        let loaded_images: HashSet<AssetRef> = job
            .items
            .iter()
            .filter_map(|item| item.image.as_ref())
            .filter(|image| assets.image(image).is_some())
            .cloned()
            .collect();
        for item in &job.items {
            if let Some(image) = item.image.as_ref().filter(|i| !loaded_images.contains(*i)) {
                debug!(item = %item.name, location = %image.location, "rendering without image");
            }
        }

        let plan = layout::plan(&job.items, &loaded_images, geometry, &fonts);

        let decor = PageDecor {
            background: Some(self.background_ref()),
            section_title: self.config.section_title.clone(),
            footer: Footer::new(&self.config.branding, generated_at.date_naive()),
            text_color: Color::BLACK,
        };
        let page = Renderer::new(geometry, &fonts).render(&plan, assets, &decor);

        let info = DocumentInfo {
            title: Some(format!("Menu - {}", job.menu_name)),
            subject: Some(format!("Drink menu {}", job.menu_name)),
            author: Some(self.config.branding.clone()),
            creator: Some(format!("menupress {}", env!("CARGO_PKG_VERSION"))),
            keywords: vec![
                "menu".to_string(),
                job.menu_name.clone(),
                job.token(),
                job.checksum(),
            ],
            created_at: Some(generated_at),
        };
        let bytes = self.writer.write(&page, &info, &fonts)?;

        Ok(ComposedDocument { bytes, plan })
    }

    fn background_ref(&self) -> AssetRef {
        AssetRef::new(AssetKind::Background, self.config.background.as_str())
    }

    fn font_ref(slot: FontSlot, location: &str) -> AssetRef {
        AssetRef::new(AssetKind::Font(slot), location)
    }

    fn asset_requests(&self, job: &LayoutJob) -> Vec<AssetRequest> {
        let mut requests = vec![
            AssetRequest::new(self.background_ref()),
            AssetRequest::new(Self::font_ref(FontSlot::Display, &self.config.title_font)),
        ];
        if let Some(body) = &self.config.body_font {
            requests.push(AssetRequest::new(Self::font_ref(FontSlot::Body, body)));
        }
        requests.extend(job.items.iter().filter_map(|item| {
            item.image
                .clone()
                .map(|image| AssetRequest::owned_by(image, item.name.clone()))
        }));
        requests
    }

    /// Standard fonts plus whatever custom fonts loaded and parsed.
    fn font_context(&self, assets: &AssetCache) -> FontContext {
        let mut fonts = FontContext::new();
        let slots = [
            (FontSlot::Display, FontRole::Display, Some(self.config.title_font.as_str())),
            (FontSlot::Body, FontRole::Body, self.config.body_font.as_deref()),
        ];
        for (slot, role, location) in slots {
            let Some(location) = location else { continue };
            let Some(data) = assets.font(&Self::font_ref(slot, location)) else {
                warn!(?role, %location, "font unavailable, using standard fallback");
                continue;
            };
            let family = font_family(location);
            if let Err(e) = fonts.register_custom(role, &family, data.to_vec()) {
                warn!(?role, %location, error = %e, "font rejected, using standard fallback");
            }
        }
        fonts
    }
}

/// Family name for a font file: its file stem, e.g. `felix.ttf` → `felix`.
fn font_family(location: &str) -> String {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("CustomFont")
        .to_string()
}
