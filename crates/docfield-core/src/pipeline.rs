//! Request processing: document in, normalized fields out
//!
//! The pipeline owns the injected collaborators and the configuration. Each
//! call rasterizes the document if needed, runs OCR once, and hands the page
//! and its [`OcrIndex`] to the orchestrator, the transfer engine or the
//! parser flattening.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::batch::{self, BatchState};
use crate::collaborators::{DocumentParser, LazyModel, OcrEngine, PageImage, QaModel, Rasterizer};
use crate::config::ExtractionConfig;
use crate::donut;
use crate::error::DocFieldError;
use crate::ocr_index::OcrIndex;
use crate::orchestrator::patterns::compile_custom;
use crate::orchestrator::{default_requests, Orchestrator, Strategy};
use crate::templates::VendorTemplate;
use crate::transfer::{
    validate_examples, ModelAccess, TransferEngine, TransferOptions, TransferResult,
};
use crate::types::{DocumentFormat, ExtractionReport, FieldRequest, ImageSize, TemplateExample};

/// Uploaded document bytes and their declared format
#[derive(Clone, Debug)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

impl Document {
    pub fn new(bytes: Vec<u8>, format: DocumentFormat) -> Self {
        Self { bytes, format }
    }
}

/// What to extract and how
#[derive(Clone, Debug, Default)]
pub struct ExtractRequest {
    pub strategy: Strategy,
    /// `None` uses the standard invoice questions (or only built-in patterns)
    pub requests: Option<Vec<FieldRequest>>,
    pub batch_size: Option<usize>,
    pub batch_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtractionOutput {
    #[serde(flatten)]
    pub report: ExtractionReport,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchState>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferOutput {
    #[serde(flatten)]
    pub result: TransferResult,
    pub image_size: ImageSize,
}

/// Page ready for extraction
pub struct PreparedPage {
    pub page: PageImage,
    pub index: OcrIndex,
}

pub struct DocumentPipeline {
    config: ExtractionConfig,
    ocr: Arc<dyn OcrEngine>,
    qa: Arc<LazyModel<dyn QaModel>>,
    parser: Arc<LazyModel<dyn DocumentParser>>,
    rasterizer: Arc<dyn Rasterizer>,
}

impl DocumentPipeline {
    pub fn new(
        config: ExtractionConfig,
        ocr: Arc<dyn OcrEngine>,
        qa: Arc<LazyModel<dyn QaModel>>,
        parser: Arc<LazyModel<dyn DocumentParser>>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            config,
            ocr,
            qa,
            parser,
            rasterizer,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Whether the Q&A model handle has been loaded
    pub fn model_loaded(&self) -> bool {
        self.qa.is_loaded()
    }

    pub fn parser_loaded(&self) -> bool {
        self.parser.is_loaded()
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.config.orchestrator.clone(), self.config.matcher())
    }

    fn transfer_engine(&self) -> TransferEngine {
        TransferEngine::new(self.config.transfer.clone(), self.config.matcher())
    }

    /// Rasterize (PDF) or probe (image) the document, then run OCR
    pub fn prepare(&self, document: &Document) -> Result<PreparedPage, DocFieldError> {
        if document.bytes.is_empty() {
            return Err(DocFieldError::InvalidInput("Document is empty".into()));
        }
        let page = match document.format {
            DocumentFormat::Pdf => self.rasterizer.rasterize(&document.bytes)?,
            format => PageImage::from_raster(document.bytes.clone(), format)?,
        };
        let tokens = self.ocr.recognize(&page)?;
        let size = (!page.size.is_empty()).then_some(page.size);
        let index = OcrIndex::from_raw(tokens, size);
        debug!(
            "Prepared {} page {}x{} with {} OCR words",
            document.format,
            index.image_size().width,
            index.image_size().height,
            index.words().len()
        );
        Ok(PreparedPage { page, index })
    }

    /// Extract fields with the requested strategy.
    ///
    /// # Errors
    ///
    /// Invalid requests, unreadable documents and unavailable collaborators
    /// fail the whole call; individual unanswerable fields are dropped.
    /// Requests and caller patterns are checked before any collaborator runs.
    pub fn extract(
        &self,
        document: &Document,
        request: &ExtractRequest,
    ) -> Result<ExtractionOutput, DocFieldError> {
        if let Some(requests) = &request.requests {
            for r in requests {
                r.validate()?;
            }
        }
        let requests = match (&request.requests, request.strategy) {
            (Some(requests), _) => requests.clone(),
            (None, Strategy::Pattern) => Vec::new(),
            (None, _) => default_requests(),
        };
        if request.strategy == Strategy::Pattern {
            for r in &requests {
                compile_custom(r.question())?;
            }
        }

        let (requests, batch) = match (request.batch_size, request.batch_index) {
            (None, None) => (requests, None),
            (size, index) => {
                let size = size.unwrap_or(self.config.batch.default_batch_size);
                let (slice, state) = batch::schedule(&requests, size, index.unwrap_or(0));
                (slice, Some(state))
            }
        };

        let prepared = self.prepare(document)?;
        let orchestrator = self.orchestrator();
        let fields = match request.strategy {
            Strategy::ModelQa => {
                let qa = self.qa.ensure_loaded()?;
                orchestrator.extract_with_model(&*qa, &prepared.page, &prepared.index, &requests)?
            }
            Strategy::Pattern => {
                // Built-in patterns belong to the first batch only
                let builtins = batch.as_ref().map_or(true, |b| b.batch_index == 0);
                orchestrator.extract_with_patterns(&prepared.index, &requests, builtins)?
            }
            Strategy::OcrLine => orchestrator.extract_from_lines(&prepared.index, &requests),
        };

        info!("Extracted {} fields using {}", fields.len(), request.strategy);
        Ok(ExtractionOutput {
            report: ExtractionReport::success(fields, prepared.index.image_size()),
            strategy: request.strategy,
            batch,
        })
    }

    /// End-to-end parser extraction with OCR placement of unboxed values
    pub fn extract_donut(&self, document: &Document) -> Result<ExtractionReport, DocFieldError> {
        let prepared = self.prepare(document)?;
        let parser = self.parser.ensure_loaded()?;
        let raw = parser.parse(&prepared.page)?;
        let flat = donut::flatten(&raw);
        debug!("Parser produced {} flat fields", flat.len());
        let fields = donut::enrich(flat, &prepared.index, &self.config.matcher());
        info!("Donut extraction returned {} fields", fields.len());
        Ok(ExtractionReport::success(fields, prepared.index.image_size()))
    }

    fn with_model<T>(
        &self,
        options: TransferOptions,
        page: &PageImage,
        run: impl FnOnce(Option<ModelAccess<'_>>) -> Result<T, DocFieldError>,
    ) -> Result<T, DocFieldError> {
        if options.ai_header_fallback || options.qa_fallback {
            let qa = self.qa.ensure_loaded()?;
            run(Some(ModelAccess { qa: &*qa, page }))
        } else {
            run(None)
        }
    }

    /// Transfer examples labeled on this document to the rest of it
    pub fn transfer(
        &self,
        document: &Document,
        examples: &[TemplateExample],
        options: TransferOptions,
    ) -> Result<TransferOutput, DocFieldError> {
        validate_examples(examples)?;
        let prepared = self.prepare(document)?;
        let engine = self.transfer_engine();
        let result = self.with_model(options, &prepared.page, |model| {
            engine.transfer(examples, &prepared.index, options, model)
        })?;
        Ok(TransferOutput {
            result,
            image_size: prepared.index.image_size(),
        })
    }

    /// Apply a stored vendor template to a new document
    pub fn apply_template(
        &self,
        document: &Document,
        template: &VendorTemplate,
        options: TransferOptions,
    ) -> Result<TransferOutput, DocFieldError> {
        validate_examples(&template.fields)?;
        let prepared = self.prepare(document)?;
        let engine = self.transfer_engine();
        let result = self.with_model(options, &prepared.page, |model| {
            engine.apply_template(&template.fields, &prepared.index, options, model)
        })?;
        info!(
            "Applied template {} v{}: {} fields",
            template.vendor_name,
            template.version,
            result.fields.len()
        );
        Ok(TransferOutput {
            result,
            image_size: prepared.index.image_size(),
        })
    }
}

/// Convert a failed request into an error report
pub fn failure_report(error: &DocFieldError) -> ExtractionReport {
    ExtractionReport::failure(error.to_string(), ImageSize::new(0, 0))
}
