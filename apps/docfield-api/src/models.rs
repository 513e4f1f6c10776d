//! Request and response bodies

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use docfield_core::{
    DocFieldError, Document, DocumentFormat, ExtractRequest, FieldRequest, Strategy,
    TemplateExample, TemplateSummary, TransferOptions, VendorTemplate,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Base64 document as uploaded by clients
#[derive(Debug, Deserialize)]
pub struct DocumentPayload {
    /// Base64-encoded PDF, PNG or JPEG
    pub document: String,
    /// Explicit format; wins over the filename extension
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DocumentPayload {
    /// Format from `format`, else the filename extension, else PNG
    pub fn format(&self) -> Result<DocumentFormat, ApiError> {
        if let Some(format) = &self.format {
            return format
                .parse()
                .map_err(|e: DocFieldError| ApiError::InvalidRequest(e.to_string()));
        }
        let extension = self
            .filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        Ok(extension
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(DocumentFormat::Png))
    }

    pub fn decode(&self) -> Result<Document, ApiError> {
        let format = self.format()?;
        let bytes = BASE64
            .decode(self.document.trim())
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid document base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(ApiError::InvalidRequest("No document provided".into()));
        }
        Ok(Document::new(bytes, format))
    }
}

/// POST /api/extract
#[derive(Debug, Deserialize)]
pub struct ExtractApiRequest {
    #[serde(flatten)]
    pub document: DocumentPayload,
    /// `model_qa` (default), `pattern` or `ocr_line`
    #[serde(default)]
    pub strategy: Option<String>,
    /// Questions (or regex patterns); the standard invoice set when absent
    #[serde(default)]
    pub fields: Option<Vec<FieldRequest>>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub batch_index: Option<usize>,
}

impl ExtractApiRequest {
    pub fn extract_request(&self) -> Result<ExtractRequest, ApiError> {
        let strategy = match &self.strategy {
            Some(s) => s
                .parse::<Strategy>()
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
            None => Strategy::default(),
        };
        Ok(ExtractRequest {
            strategy,
            requests: self.fields.clone(),
            batch_size: self.batch_size,
            batch_index: self.batch_index,
        })
    }
}

/// POST /api/transfer
#[derive(Debug, Deserialize)]
pub struct TransferApiRequest {
    #[serde(flatten)]
    pub document: DocumentPayload,
    pub examples: Vec<TemplateExample>,
    #[serde(default)]
    pub options: TransferOptions,
}

/// POST /api/templates/:vendor/apply
#[derive(Debug, Deserialize)]
pub struct ApplyTemplateRequest {
    #[serde(flatten)]
    pub document: DocumentPayload,
    #[serde(default)]
    pub options: TransferOptions,
}

/// PUT /api/templates/:vendor
#[derive(Debug, Deserialize)]
pub struct SaveTemplateRequest {
    pub fields: Vec<TemplateExample>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub parser_loaded: bool,
}

#[derive(Serialize)]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateSummary>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct TemplateResponse {
    pub success: bool,
    pub template: VendorTemplate,
}

#[derive(Serialize)]
pub struct DeleteTemplateResponse {
    pub success: bool,
    pub vendor_name: String,
}
