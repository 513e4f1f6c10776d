//! Application state for the docfield API

use anyhow::{Context, Result};
use docfield_core::{DocumentPipeline, ExtractionConfig, TemplateStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::remote::{Endpoint, RemoteOcr, RemoteParser, RemoteQa, RemoteRasterizer};

/// Base URLs of the backend services
#[derive(Clone, Debug)]
pub struct ServiceUrls {
    pub ocr: String,
    pub qa: String,
    pub parser: String,
    pub rasterizer: String,
}

pub struct AppState {
    pub pipeline: DocumentPipeline,
    pub templates: TemplateStore,
}

impl AppState {
    pub fn new(pipeline: DocumentPipeline, templates: TemplateStore) -> Self {
        Self { pipeline, templates }
    }

    /// State backed by the remote OCR, Q&A, parser and rasterizer services.
    ///
    /// Model handles connect on first use, so the server starts even when a
    /// backend is still down.
    pub fn with_remote_services(
        config: ExtractionConfig,
        urls: &ServiceUrls,
        timeout: Duration,
        template_dir: &Path,
    ) -> Result<Self> {
        let templates = TemplateStore::open(template_dir).with_context(|| {
            format!("Failed to open template directory {}", template_dir.display())
        })?;
        tracing::info!("Templates stored in {}", templates.root().display());

        let pipeline = DocumentPipeline::new(
            config,
            Arc::new(RemoteOcr::new(Endpoint::new("ocr", &urls.ocr, timeout))),
            Arc::new(RemoteQa::lazy(Endpoint::new("layoutlm", &urls.qa, timeout))),
            Arc::new(RemoteParser::lazy(Endpoint::new("donut", &urls.parser, timeout))),
            Arc::new(RemoteRasterizer::new(Endpoint::new("rasterizer", &urls.rasterizer, timeout))),
        );
        Ok(Self::new(pipeline, templates))
    }
}
