//! Common types shared by the matcher, orchestrator and transfer engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bbox::{NormBox, PixelBox};
use crate::error::DocFieldError;

/// A single OCR token in pixel space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: PixelBox,
    pub confidence: f64,
}

impl OcrWord {
    pub fn new(text: impl Into<String>, bbox: PixelBox, confidence: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Words sharing (nearly) the same top edge, merged left to right
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub bbox: PixelBox,
    pub avg_confidence: f64,
    pub word_count: usize,
}

/// Raster dimensions in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Declared format of an uploaded document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentFormat {
    pub fn is_raster(&self) -> bool {
        !matches!(self, DocumentFormat::Pdf)
    }
}

impl FromStr for DocumentFormat {
    type Err = DocFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "png" => Ok(DocumentFormat::Png),
            "jpg" | "jpeg" => Ok(DocumentFormat::Jpeg),
            other => Err(DocFieldError::InvalidInput(format!(
                "Unsupported format '{}'. Must be 'pdf', 'png', 'jpg' or 'jpeg'",
                other
            ))),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => write!(f, "pdf"),
            DocumentFormat::Png => write!(f, "png"),
            DocumentFormat::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// Key, question (or regex pattern) and required flag of a field request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    #[serde(alias = "pattern")]
    pub question: String,
    #[serde(default)]
    pub required: bool,
}

/// A field the caller wants extracted.
///
/// `LineItem` requests are answered with several ranked candidates
/// (`{key}_row_{n}`), `Generic` ones with a single value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum FieldRequest {
    Generic(FieldSpec),
    LineItem(FieldSpec),
}

/// Category of a [`FieldRequest`] without its payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Generic,
    LineItem,
}

impl FieldRequest {
    pub fn generic(key: &str, question: &str, required: bool) -> Self {
        FieldRequest::Generic(FieldSpec {
            key: key.to_string(),
            question: question.to_string(),
            required,
        })
    }

    pub fn line_item(key: &str, question: &str, required: bool) -> Self {
        FieldRequest::LineItem(FieldSpec {
            key: key.to_string(),
            question: question.to_string(),
            required,
        })
    }

    pub fn spec(&self) -> &FieldSpec {
        match self {
            FieldRequest::Generic(spec) | FieldRequest::LineItem(spec) => spec,
        }
    }

    pub fn key(&self) -> &str {
        &self.spec().key
    }

    pub fn question(&self) -> &str {
        &self.spec().question
    }

    pub fn required(&self) -> bool {
        self.spec().required
    }

    pub fn category(&self) -> FieldCategory {
        match self {
            FieldRequest::Generic(_) => FieldCategory::Generic,
            FieldRequest::LineItem(_) => FieldCategory::LineItem,
        }
    }

    /// Reject requests the core cannot act on
    pub fn validate(&self) -> Result<(), DocFieldError> {
        let spec = self.spec();
        if spec.key.trim().is_empty() {
            return Err(DocFieldError::InvalidInput(
                "Field request key must not be empty".into(),
            ));
        }
        if spec.question.trim().is_empty() {
            return Err(DocFieldError::InvalidInput(format!(
                "Field request '{}' has no question or pattern",
                spec.key
            )));
        }
        Ok(())
    }
}

/// Where an extracted value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    ModelQa,
    OcrPattern,
    OcrLine,
    ColumnSuggestion,
    TemplateMatch,
    LayoutlmQa,
    Donut,
}

/// A resolved field, the unit returned to the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub id: u32,
    pub label: String,
    pub value: String,
    /// Normalized to [0, 1000] on both axes
    pub bbox: NormBox,
    pub confidence: f64,
    pub source: FieldSource,
    /// Set on degraded-mode preview output; never on genuine extraction
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
}

/// A user-labeled example used to seed template transfer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateExample {
    pub field_name: String,
    pub value: String,
    pub bbox: NormBox,
}

impl TemplateExample {
    pub fn center(&self) -> (f64, f64) {
        crate::bbox::center(&self.bbox)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Response mapping produced for every request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub status: ReportStatus,
    pub fields: Vec<ExtractedField>,
    pub image_size: ImageSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionReport {
    pub fn success(fields: Vec<ExtractedField>, image_size: ImageSize) -> Self {
        Self {
            status: ReportStatus::Success,
            fields,
            image_size,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, image_size: ImageSize) -> Self {
        Self {
            status: ReportStatus::Error,
            fields: Vec::new(),
            image_size,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_request_deserializes_tagged() {
        let json = r#"{"category":"line_item","key":"description","question":"What items are listed?"}"#;
        let req: FieldRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.category(), FieldCategory::LineItem);
        assert_eq!(req.key(), "description");
        assert!(!req.required());
    }

    #[test]
    fn test_field_request_accepts_pattern_alias() {
        let json = r#"{"category":"generic","key":"po","pattern":"PO\\s*(\\d+)","required":true}"#;
        let req: FieldRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.question(), r"PO\s*(\d+)");
        assert!(req.required());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let req = FieldRequest::generic("  ", "What is it?", false);
        assert!(matches!(
            req.validate(),
            Err(DocFieldError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_document_format_parse() {
        assert_eq!("JPG".parse::<DocumentFormat>().unwrap(), DocumentFormat::Jpeg);
        assert_eq!("pdf".parse::<DocumentFormat>().unwrap(), DocumentFormat::Pdf);
        assert!("docx".parse::<DocumentFormat>().is_err());
    }

    #[test]
    fn test_simulated_flag_omitted_when_false() {
        let field = ExtractedField {
            id: 1,
            label: "total".into(),
            value: "10.00".into(),
            bbox: [1, 2, 3, 4],
            confidence: 0.9,
            source: FieldSource::OcrPattern,
            simulated: false,
        };
        let json = serde_json::to_value(&field).unwrap();
        assert!(json.get("simulated").is_none());
        assert_eq!(json["source"], "ocr_pattern");
    }
}
