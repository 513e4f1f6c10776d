//! Field extraction orchestrator
//!
//! Drives field requests through one of three strategies and resolves every
//! answer against the OCR words:
//!
//! - [`Strategy::ModelQa`]: ask the document Q&A model one question per field
//! - [`Strategy::Pattern`]: built-in invoice regexes, then caller patterns
//! - [`Strategy::OcrLine`]: label lookup in the grouped OCR lines
//!
//! A field that cannot be answered is skipped with a [`SkipReason`]; only an
//! unreachable collaborator fails the whole request.

pub mod patterns;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::collaborators::{PageImage, QaModel};
use crate::config::OrchestratorConfig;
use crate::error::{DocFieldError, SkipReason};
use crate::evidence::EvidenceMatcher;
use crate::ocr_index::OcrIndex;
use crate::types::{ExtractedField, FieldRequest, FieldSource, Line};

use self::patterns::{capture, compile_custom, first_match, INVOICE_PATTERNS};

/// Outcome of a single field request
pub type FieldOutcome = Result<Vec<ExtractedField>, SkipReason>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    ModelQa,
    Pattern,
    OcrLine,
}

impl FromStr for Strategy {
    type Err = DocFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model_qa" | "qa" => Ok(Strategy::ModelQa),
            "pattern" | "regex" => Ok(Strategy::Pattern),
            "ocr_line" => Ok(Strategy::OcrLine),
            other => Err(DocFieldError::InvalidInput(format!(
                "Unknown strategy '{}'. Must be 'model_qa', 'pattern' or 'ocr_line'",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ModelQa => write!(f, "model_qa"),
            Strategy::Pattern => write!(f, "pattern"),
            Strategy::OcrLine => write!(f, "ocr_line"),
        }
    }
}

/// Standard invoice questions used when the caller sends none
pub fn default_requests() -> Vec<FieldRequest> {
    vec![
        FieldRequest::generic("invoice_number", "What is the invoice number?", true),
        FieldRequest::generic("invoice_date", "What is the invoice date?", true),
        FieldRequest::generic("due_date", "What is the due date?", false),
        FieldRequest::generic("vendor_name", "What is the vendor or seller name?", true),
        FieldRequest::generic("vendor_address", "What is the vendor address?", false),
        FieldRequest::generic("customer_name", "Who is the bill to customer?", false),
        FieldRequest::generic("subtotal", "What is the subtotal?", false),
        FieldRequest::generic("tax_amount", "What is the tax amount?", false),
        FieldRequest::generic("total_amount", "What is the total amount?", true),
        FieldRequest::line_item("description", "What are the line item descriptions?", false),
        FieldRequest::line_item("quantity", "What are the line item quantities?", false),
        FieldRequest::line_item("amount", "What are the line item amounts?", false),
    ]
}

/// Give fields sequential ids starting at 1
pub fn number_fields(fields: &mut [ExtractedField]) {
    for (i, field) in fields.iter_mut().enumerate() {
        field.id = i as u32 + 1;
    }
}

/// Keep successful outcomes, log and drop skipped ones
pub(crate) fn fold_outcomes(outcomes: Vec<(String, FieldOutcome)>) -> Vec<ExtractedField> {
    let mut fields = Vec::new();
    for (key, outcome) in outcomes {
        match outcome {
            Ok(found) => fields.extend(found),
            Err(reason) => debug!("Skipping field {}: {}", key, reason),
        }
    }
    number_fields(&mut fields);
    fields
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    matcher: EvidenceMatcher,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, matcher: EvidenceMatcher) -> Self {
        Self { config, matcher }
    }

    fn field(
        &self,
        index: &OcrIndex,
        label: String,
        value: String,
        confidence: f64,
        source: FieldSource,
    ) -> ExtractedField {
        let evidence = self.matcher.locate(&value, index.words());
        let confidence = match source {
            FieldSource::ModelQa => ((confidence + evidence.confidence) / 2.0).clamp(0.0, 1.0),
            _ => evidence.confidence,
        };
        ExtractedField {
            id: 0,
            label,
            value,
            bbox: evidence.normalized(index.image_size()),
            confidence,
            source,
            simulated: false,
        }
    }

    fn pattern_field(&self, index: &OcrIndex, label: &str, value: String) -> ExtractedField {
        self.field(index, label.to_string(), value, 0.0, FieldSource::OcrPattern)
    }

    /// Ask the Q&A model one question per request.
    ///
    /// # Errors
    ///
    /// Returns an error only when the model is unavailable
    pub fn extract_with_model(
        &self,
        qa: &dyn QaModel,
        page: &PageImage,
        index: &OcrIndex,
        requests: &[FieldRequest],
    ) -> Result<Vec<ExtractedField>, DocFieldError> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.ask_field(qa, page, index, request)?;
            outcomes.push((request.key().to_string(), outcome));
        }
        let fields = fold_outcomes(outcomes);
        info!("Model Q&A extracted {} fields from {} requests", fields.len(), requests.len());
        Ok(fields)
    }

    fn ask_field(
        &self,
        qa: &dyn QaModel,
        page: &PageImage,
        index: &OcrIndex,
        request: &FieldRequest,
    ) -> Result<FieldOutcome, DocFieldError> {
        let top_k = match request {
            FieldRequest::Generic(_) => 1,
            FieldRequest::LineItem(_) => self.config.line_item_top_k.max(1),
        };
        let answers = match qa.ask(page, request.question(), top_k) {
            Ok(answers) => answers,
            Err(e) if e.is_unavailable() => return Err(e.into()),
            Err(e) => {
                warn!("Q&A failed for field {}: {}", request.key(), e);
                return Ok(Err(SkipReason::ModelFailed(e.to_string())));
            }
        };

        let threshold = self.config.qa_min_confidence;
        let Some(best) = answers.iter().find(|a| !a.answer.trim().is_empty()) else {
            return Ok(Err(SkipReason::NoAnswer));
        };
        if best.score < threshold {
            return Ok(Err(SkipReason::LowConfidence {
                score: best.score,
                threshold,
            }));
        }

        let fields = match request {
            FieldRequest::Generic(spec) => vec![self.field(
                index,
                spec.key.clone(),
                best.answer.trim().to_string(),
                best.score,
                FieldSource::ModelQa,
            )],
            FieldRequest::LineItem(spec) => {
                let mut seen = HashSet::new();
                answers
                    .iter()
                    .filter(|a| a.score >= threshold)
                    .map(|a| (a.answer.trim(), a.score))
                    .filter(|(text, _)| !text.is_empty() && seen.insert(*text))
                    .take(top_k)
                    .enumerate()
                    .map(|(n, (text, score))| {
                        self.field(
                            index,
                            format!("{}_row_{}", spec.key, n + 1),
                            text.to_string(),
                            score,
                            FieldSource::ModelQa,
                        )
                    })
                    .collect()
            }
        };
        Ok(Ok(fields))
    }

    /// Built-in invoice patterns (when `builtins` is set), then caller
    /// patterns, over the page text.
    ///
    /// With built-ins enabled and nothing matching at all, falls back to a
    /// simulated preview of the first OCR lines.
    ///
    /// # Errors
    ///
    /// Returns an error when a caller pattern does not compile
    pub fn extract_with_patterns(
        &self,
        index: &OcrIndex,
        requests: &[FieldRequest],
        builtins: bool,
    ) -> Result<Vec<ExtractedField>, DocFieldError> {
        let custom = requests
            .iter()
            .map(|r| compile_custom(r.question()).map(|re| (r.key(), re)))
            .collect::<Result<Vec<_>, _>>()?;

        let text = index.full_text();
        let mut outcomes = Vec::new();
        let builtin_patterns = INVOICE_PATTERNS.iter().filter(|_| builtins);
        for pattern in builtin_patterns {
            let outcome = first_match(&pattern.candidates, &text)
                .map(|value| vec![self.pattern_field(index, pattern.field, value)])
                .ok_or(SkipReason::NoMatch);
            outcomes.push((pattern.field.to_string(), outcome));
        }
        for (key, re) in &custom {
            let outcome = capture(re, &text)
                .map(|value| vec![self.pattern_field(index, key, value)])
                .ok_or(SkipReason::NoMatch);
            outcomes.push((key.to_string(), outcome));
        }

        let fields = fold_outcomes(outcomes);
        if fields.is_empty() && builtins {
            warn!("No pattern matched, returning simulated preview");
            return Ok(self.simulated_preview(index));
        }
        info!("Pattern extraction found {} fields", fields.len());
        Ok(fields)
    }

    /// Preview built from the first OCR lines, flagged as simulated
    pub fn simulated_preview(&self, index: &OcrIndex) -> Vec<ExtractedField> {
        let mut fields: Vec<ExtractedField> = index
            .group_into_lines()
            .into_iter()
            .take(self.config.simulation_max_lines)
            .enumerate()
            .map(|(n, line)| ExtractedField {
                id: 0,
                label: format!("line_{}", n + 1),
                value: line.text,
                bbox: index.normalize(&line.bbox),
                confidence: line.avg_confidence,
                source: FieldSource::OcrLine,
                simulated: true,
            })
            .collect();
        number_fields(&mut fields);
        fields
    }

    /// Find each request's label in the OCR lines and take the value after it
    pub fn extract_from_lines(
        &self,
        index: &OcrIndex,
        requests: &[FieldRequest],
    ) -> Vec<ExtractedField> {
        let lines = index.group_into_lines();
        let outcomes = requests
            .iter()
            .map(|request| {
                let outcome = value_after_label(&lines, request.key())
                    .map(|value| {
                        let label = request.key().to_string();
                        vec![self.field(index, label, value, 0.0, FieldSource::OcrLine)]
                    })
                    .ok_or(SkipReason::NoMatch);
                (request.key().to_string(), outcome)
            })
            .collect();
        let fields = fold_outcomes(outcomes);
        info!("OCR line heuristics found {} fields", fields.len());
        fields
    }
}

/// Label words for a request key (`invoice_number` -> `["invoice", "number"]`)
fn label_words(key: &str) -> Vec<String> {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

/// Text following the label on the first line containing every label word,
/// or the next line when the label ends its line
fn value_after_label(lines: &[Line], key: &str) -> Option<String> {
    let words = label_words(key);
    if words.is_empty() {
        return None;
    }
    for (i, line) in lines.iter().enumerate() {
        let lower = line.text.to_ascii_lowercase();
        if !words.iter().all(|w| lower.contains(w.as_str())) {
            continue;
        }
        let label_end = words
            .iter()
            .filter_map(|w| lower.find(w.as_str()).map(|p| p + w.len()))
            .max()
            .unwrap_or(0);
        let remainder = line.text[label_end..]
            .trim_start_matches(|c: char| matches!(c, ':' | '#' | '.' | '-') || c.is_whitespace())
            .trim();
        if !remainder.is_empty() {
            return Some(remainder.to_string());
        }
        return lines
            .get(i + 1)
            .map(|next| next.text.trim().to_string())
            .filter(|t| !t.is_empty());
    }
    None
}
