//! DocField Core - Field-to-evidence matching and template transfer over OCR
//!
//! This crate provides:
//! - Bbox normalization to the 0-1000 coordinate space
//! - An OCR word index with line grouping
//! - Evidence matching of free-form answers to OCR words
//! - Field extraction via document Q&A, regex patterns or OCR line heuristics
//! - Column/template transfer from user-labeled examples
//! - Batch scheduling, Donut output flattening and vendor template storage
//!
//! OCR, Q&A, parsing and rasterization are external collaborators injected
//! through the traits in [`collaborators`].

pub mod batch;
pub mod bbox;
pub mod collaborators;
pub mod config;
pub mod donut;
pub mod error;
pub mod evidence;
pub mod ocr_index;
pub mod orchestrator;
pub mod pipeline;
pub mod templates;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use batch::BatchState;
pub use bbox::{NormBox, PixelBox, SENTINEL_BOX};
pub use collaborators::{
    DocumentParser, LazyModel, OcrEngine, PageImage, QaAnswer, QaModel, Rasterizer,
};
pub use config::ExtractionConfig;
pub use error::{CollaboratorError, DocFieldError, SkipReason, TemplateError};
pub use evidence::{Evidence, EvidenceMatcher, MatchKind};
pub use ocr_index::{OcrIndex, RawBox, RawOcrToken, TextBlock};
pub use orchestrator::{Orchestrator, Strategy};
pub use pipeline::{Document, DocumentPipeline, ExtractRequest, ExtractionOutput, TransferOutput};
pub use templates::{TemplateStore, TemplateSummary, VendorTemplate};
pub use transfer::{LayoutMode, TransferEngine, TransferOptions, TransferResult};
pub use types::{
    DocumentFormat, ExtractedField, ExtractionReport, FieldCategory, FieldRequest, FieldSource,
    FieldSpec, ImageSize, Line, OcrWord, ReportStatus, TemplateExample,
};
