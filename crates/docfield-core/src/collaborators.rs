//! Interfaces to the external engines the core depends on
//!
//! The core never talks to a model runtime directly. OCR, document Q&A,
//! end-to-end parsing and PDF rasterization are injected as trait objects so
//! the pipeline can be driven by remote services in production and by
//! deterministic stubs in tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CollaboratorError, DocFieldError};
use crate::ocr_index::RawOcrToken;
use crate::types::{DocumentFormat, ImageSize};

/// A single raster page plus its probed dimensions
#[derive(Clone, Debug, PartialEq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub size: ImageSize,
}

impl PageImage {
    /// Wrap raster bytes, reading the dimensions from the image header
    pub fn from_raster(bytes: Vec<u8>, format: DocumentFormat) -> Result<Self, DocFieldError> {
        if !format.is_raster() {
            return Err(DocFieldError::InvalidInput(format!(
                "Expected a raster image, got {}",
                format
            )));
        }
        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| DocFieldError::InvalidInput(format!("Unreadable image: {}", e)))?
            .into_dimensions()
            .map_err(|e| DocFieldError::InvalidInput(format!("Unreadable image: {}", e)))?;
        Ok(Self {
            bytes,
            format,
            size: ImageSize::new(width, height),
        })
    }

    /// Wrap bytes whose size is already known (rasterizer output, tests)
    pub fn with_size(bytes: Vec<u8>, format: DocumentFormat, size: ImageSize) -> Self {
        Self {
            bytes,
            format,
            size,
        }
    }
}

/// One ranked answer from the Q&A model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    pub score: f64,
}

/// Text recognition over one page
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page: &PageImage) -> Result<Vec<RawOcrToken>, CollaboratorError>;
}

/// Visual document question answering
pub trait QaModel: Send + Sync {
    /// Up to `top_k` answers, best first
    fn ask(
        &self,
        page: &PageImage,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<QaAnswer>, CollaboratorError>;
}

/// End-to-end document parser producing a nested JSON tree
pub trait DocumentParser: Send + Sync {
    fn parse(&self, page: &PageImage) -> Result<serde_json::Value, CollaboratorError>;
}

/// Renders the first page of a PDF to a raster image
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf: &[u8]) -> Result<PageImage, CollaboratorError>;
}

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>, CollaboratorError> + Send + Sync>;

/// A model handle created on first use and shared afterwards.
///
/// Concurrent first uses serialize on the inner lock, so the loader runs at
/// most once per successful load. A failed load is retried on the next call.
/// `is_loaded` reads a separate flag and never waits on a running load.
pub struct LazyModel<T: ?Sized> {
    name: &'static str,
    loaded: AtomicBool,
    slot: Mutex<Option<Arc<T>>>,
    loader: Loader<T>,
}

impl<T: ?Sized> LazyModel<T> {
    pub fn new(
        name: &'static str,
        loader: impl Fn() -> Result<Arc<T>, CollaboratorError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            loaded: AtomicBool::new(false),
            slot: Mutex::new(None),
            loader: Box::new(loader),
        }
    }

    /// Handle that is loaded from the start
    pub fn ready(name: &'static str, model: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let handle = model.clone();
        Self {
            name,
            loaded: AtomicBool::new(true),
            slot: Mutex::new(Some(model)),
            loader: Box::new(move || Ok(handle.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Load on first call, return the shared handle afterwards
    pub fn ensure_loaded(&self) -> Result<Arc<T>, CollaboratorError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CollaboratorError::unavailable(self.name, "model lock poisoned"))?;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }
        info!("Loading {} model", self.name);
        let model = (self.loader)()?;
        *slot = Some(model.clone());
        self.loaded.store(true, Ordering::Release);
        Ok(model)
    }
}

impl<T: ?Sized> std::fmt::Debug for LazyModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyModel")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
