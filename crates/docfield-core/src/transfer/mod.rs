//! Template transfer: propagate user-labeled examples to the rest of a page
//! or to another page
//!
//! Examples whose X-centers line up (variance below the configured limit) are
//! treated as one table column. With column mode enabled the engine then finds
//! the neighbouring columns, names them from the headers above the data, and
//! reads each column's value on every example row. Anything else is matched
//! by proximity to the example positions, with an optional per-field Q&A
//! fallback.

pub mod column;
pub mod headers;
pub mod scattered;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::{PageImage, QaModel};
use crate::config::TransferConfig;
use crate::error::{CollaboratorError, DocFieldError, SkipReason};
use crate::evidence::EvidenceMatcher;
use crate::ocr_index::{OcrIndex, TextBlock};
use crate::orchestrator::{fold_outcomes, FieldOutcome};
use crate::types::{ExtractedField, FieldSource, TemplateExample};

use self::column::{cluster_by_x, value_for_row, x_variance, ColumnSummary};
use self::headers::{best_header, fallback_name, field_name, header_candidates, merge_fragments};
use self::scattered::{fallback_question, nearest_block};

/// Question used when too few columns found a header
pub const HEADER_QUESTION: &str = "What are all the column headers in the table?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    Column,
    Scattered,
}

/// Caller switches for the optional transfer behaviors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Run column transfer when the examples form a column
    #[serde(default)]
    pub column_mode: bool,
    /// Ask the model for headers when most columns have none
    #[serde(default)]
    pub ai_header_fallback: bool,
    /// Ask the model for fields with no nearby block
    #[serde(default)]
    pub qa_fallback: bool,
}

/// Q&A model plus the page it should look at
#[derive(Clone, Copy)]
pub struct ModelAccess<'a> {
    pub qa: &'a dyn QaModel,
    pub page: &'a PageImage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferResult {
    /// Mode actually used
    pub mode: LayoutMode,
    /// Header inferred for the examples' own column (column mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_column: Option<ColumnSummary>,
    pub columns: Vec<ColumnSummary>,
    pub fields: Vec<ExtractedField>,
}

pub struct TransferEngine {
    config: TransferConfig,
    matcher: EvidenceMatcher,
}

impl TransferEngine {
    pub fn new(config: TransferConfig, matcher: EvidenceMatcher) -> Self {
        Self { config, matcher }
    }

    /// Column when the example X-centers barely vary, scattered otherwise
    pub fn detect_layout(&self, examples: &[TemplateExample]) -> LayoutMode {
        if x_variance(examples) < self.config.column_variance {
            LayoutMode::Column
        } else {
            LayoutMode::Scattered
        }
    }

    /// Transfer examples labeled on this page to the rest of the page.
    ///
    /// # Errors
    ///
    /// Fails on invalid examples or an unavailable Q&A model
    pub fn transfer(
        &self,
        examples: &[TemplateExample],
        index: &OcrIndex,
        options: TransferOptions,
        model: Option<ModelAccess<'_>>,
    ) -> Result<TransferResult, DocFieldError> {
        validate_examples(examples)?;
        let layout = self.detect_layout(examples);
        debug!("Detected {:?} layout for {} examples", layout, examples.len());

        if layout == LayoutMode::Column && options.column_mode {
            self.column_transfer(examples, index, options, model)
        } else {
            self.scattered_transfer(examples, index, options, model)
        }
    }

    /// Apply a stored template's examples to a different page by position
    pub fn apply_template(
        &self,
        examples: &[TemplateExample],
        index: &OcrIndex,
        options: TransferOptions,
        model: Option<ModelAccess<'_>>,
    ) -> Result<TransferResult, DocFieldError> {
        validate_examples(examples)?;
        self.scattered_transfer(examples, index, options, model)
    }

    fn summarize(&self, center_x: f64, headers: &[TextBlock]) -> ColumnSummary {
        match best_header(headers, center_x, &self.config) {
            Some((header, score)) if !field_name(&header.text).is_empty() => ColumnSummary {
                name: field_name(&header.text),
                center_x,
                header: Some(header.text.clone()),
                header_score: Some(score),
            },
            _ => ColumnSummary {
                name: fallback_name(center_x),
                center_x,
                header: None,
                header_score: None,
            },
        }
    }

    fn column_transfer(
        &self,
        examples: &[TemplateExample],
        index: &OcrIndex,
        options: TransferOptions,
        model: Option<ModelAccess<'_>>,
    ) -> Result<TransferResult, DocFieldError> {
        let cfg = &self.config;
        let blocks = index.blocks();
        let top_y = examples
            .iter()
            .map(|e| e.center().1)
            .fold(f64::INFINITY, f64::min);
        let template_x = examples.iter().map(|e| e.center().0).sum::<f64>() / examples.len() as f64;

        let mut headers = merge_fragments(
            header_candidates(&blocks, top_y, cfg.header_gap),
            cfg.row_tolerance,
            cfg.merge_gap,
        );

        let data: Vec<TextBlock> = blocks
            .iter()
            .filter(|b| b.center_y >= top_y - cfg.header_gap)
            .filter(|b| (b.center_x - template_x).abs() > cfg.column_tolerance)
            .cloned()
            .collect();
        let columns = cluster_by_x(data, cfg.column_tolerance);
        let mut summaries: Vec<ColumnSummary> = columns
            .iter()
            .map(|c| self.summarize(c.center_x, &headers))
            .collect();

        let named = summaries.iter().filter(|s| s.header.is_some()).count();
        let too_few_named = (named as f64) < columns.len() as f64 * cfg.ai_fallback_ratio;
        if options.ai_header_fallback && !columns.is_empty() && too_few_named {
            if let Some(model) = model {
                let extra = self.ask_headers(model, index)?;
                if !extra.is_empty() {
                    info!("Model suggested {} header candidates", extra.len());
                    headers.extend(extra);
                    summaries = columns
                        .iter()
                        .map(|c| self.summarize(c.center_x, &headers))
                        .collect();
                }
            }
        }
        let template_column = self.summarize(template_x, &headers);

        let mut rows: Vec<&TemplateExample> = examples.iter().collect();
        rows.sort_by(|a, b| a.center().1.total_cmp(&b.center().1));
        let multi_row = rows.len() > 1;

        let mut fields = Vec::new();
        for (n, example) in rows.iter().enumerate() {
            for (column, summary) in columns.iter().zip(&summaries) {
                let Some(block) = value_for_row(column, example, cfg.row_match_distance) else {
                    continue;
                };
                let label = if multi_row {
                    format!("{}_item_{}", summary.name, n + 1)
                } else {
                    summary.name.clone()
                };
                fields.push(block_field(label, block, FieldSource::ColumnSuggestion));
            }
        }
        crate::orchestrator::number_fields(&mut fields);

        info!(
            "Column transfer: {} columns, {} rows, {} suggestions",
            columns.len(),
            rows.len(),
            fields.len()
        );
        Ok(TransferResult {
            mode: LayoutMode::Column,
            template_column: Some(template_column),
            columns: summaries,
            fields,
        })
    }

    /// Header tokens from the model, placed on their OCR words
    fn ask_headers(
        &self,
        model: ModelAccess<'_>,
        index: &OcrIndex,
    ) -> Result<Vec<TextBlock>, DocFieldError> {
        let answers = match model.qa.ask(model.page, HEADER_QUESTION, 1) {
            Ok(answers) => answers,
            Err(e) => return skip_unless_unavailable(e).map(|_| Vec::new()),
        };
        let Some(answer) = answers.first() else {
            return Ok(Vec::new());
        };

        let mut seen = std::collections::HashSet::new();
        let mut found = Vec::new();
        for token in answer.answer.split(|c: char| c == ',' || c.is_whitespace()) {
            let token = token.trim();
            if token.is_empty() || !seen.insert(token.to_lowercase()) {
                continue;
            }
            let evidence = self.matcher.locate(token, index.words());
            if evidence.is_matched() {
                let bbox = evidence.normalized(index.image_size());
                found.push(TextBlock::new(token, bbox, evidence.confidence));
            }
        }
        Ok(found)
    }

    fn scattered_transfer(
        &self,
        examples: &[TemplateExample],
        index: &OcrIndex,
        options: TransferOptions,
        model: Option<ModelAccess<'_>>,
    ) -> Result<TransferResult, DocFieldError> {
        let blocks = index.blocks();
        let mut outcomes: Vec<(String, FieldOutcome)> = Vec::with_capacity(examples.len());

        for example in examples {
            let outcome = match nearest_block(example, &blocks, index.image_size(), &self.config) {
                Some((block, _)) => {
                    let label = example.field_name.clone();
                    Ok(vec![block_field(label, block, FieldSource::TemplateMatch)])
                }
                None => match model.filter(|_| options.qa_fallback) {
                    Some(model) => self.ask_field(model, index, example)?,
                    None => Err(SkipReason::NoMatch),
                },
            };
            outcomes.push((example.field_name.clone(), outcome));
        }

        let fields = fold_outcomes(outcomes);
        info!("Template match placed {} of {} fields", fields.len(), examples.len());
        Ok(TransferResult {
            mode: LayoutMode::Scattered,
            template_column: None,
            columns: Vec::new(),
            fields,
        })
    }

    fn ask_field(
        &self,
        model: ModelAccess<'_>,
        index: &OcrIndex,
        example: &TemplateExample,
    ) -> Result<FieldOutcome, DocFieldError> {
        let answers = match model.qa.ask(model.page, &fallback_question(&example.field_name), 1) {
            Ok(answers) => answers,
            Err(e) => return skip_unless_unavailable(e),
        };
        let Some(best) = answers.into_iter().find(|a| !a.answer.trim().is_empty()) else {
            return Ok(Err(SkipReason::NoAnswer));
        };
        let threshold = self.config.qa_fallback_confidence;
        if best.score <= threshold {
            return Ok(Err(SkipReason::LowConfidence {
                score: best.score,
                threshold,
            }));
        }

        let value = best.answer.trim().to_string();
        let evidence = self.matcher.locate(&value, index.words());
        Ok(Ok(vec![ExtractedField {
            id: 0,
            label: example.field_name.clone(),
            value,
            bbox: evidence.normalized(index.image_size()),
            confidence: best.score.clamp(0.0, 1.0),
            source: FieldSource::LayoutlmQa,
            simulated: false,
        }]))
    }
}

fn skip_unless_unavailable(e: CollaboratorError) -> Result<FieldOutcome, DocFieldError> {
    if e.is_unavailable() {
        return Err(e.into());
    }
    warn!("Transfer Q&A call failed: {}", e);
    Ok(Err(SkipReason::ModelFailed(e.to_string())))
}

fn block_field(label: String, block: &TextBlock, source: FieldSource) -> ExtractedField {
    ExtractedField {
        id: 0,
        label,
        value: block.text.clone(),
        bbox: block.bbox,
        confidence: block.confidence,
        source,
        simulated: false,
    }
}

/// Reject empty example lists, unnamed examples and degenerate boxes
pub fn validate_examples(examples: &[TemplateExample]) -> Result<(), DocFieldError> {
    if examples.is_empty() {
        return Err(DocFieldError::InvalidInput(
            "At least one template example is required".into(),
        ));
    }
    for example in examples {
        if example.field_name.trim().is_empty() {
            return Err(DocFieldError::InvalidInput(
                "Template example field_name must not be empty".into(),
            ));
        }
        if !crate::bbox::is_valid(&example.bbox) {
            return Err(DocFieldError::InvalidInput(format!(
                "Template example '{}' has an invalid bbox {:?}",
                example.field_name, example.bbox
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::QaAnswer;
    use crate::types::{DocumentFormat, ImageSize, OcrWord};
    use pretty_assertions::assert_eq;

    struct FixedQa(Result<Vec<QaAnswer>, CollaboratorError>);

    impl QaModel for FixedQa {
        fn ask(
            &self,
            _page: &PageImage,
            _question: &str,
            _top_k: usize,
        ) -> Result<Vec<QaAnswer>, CollaboratorError> {
            self.0.clone()
        }
    }

    fn answer(text: &str, score: f64) -> FixedQa {
        FixedQa(Ok(vec![QaAnswer {
            answer: text.into(),
            score,
        }]))
    }

    fn page() -> PageImage {
        PageImage::with_size(Vec::new(), DocumentFormat::Png, ImageSize::new(1000, 1000))
    }

    fn word(text: &str, bbox: [f64; 4]) -> OcrWord {
        OcrWord::new(text, bbox, 0.9)
    }

    fn example(name: &str, value: &str, bbox: [u32; 4]) -> TemplateExample {
        TemplateExample {
            field_name: name.into(),
            value: value.into(),
            bbox,
        }
    }

    fn engine() -> TransferEngine {
        TransferEngine::new(TransferConfig::default(), EvidenceMatcher::default())
    }

    /// Item column at x=500, a price column at x=710, header row at y=50
    fn table_page(price_header_y: f64) -> OcrIndex {
        let words = vec![
            word("Weight", [455.0, 40.0, 505.0, 60.0]),
            word("Price", [690.0, price_header_y - 10.0, 730.0, price_header_y + 10.0]),
            word("12.5", [480.0, 90.0, 520.0, 110.0]),
            word("8.0", [480.0, 190.0, 520.0, 210.0]),
            word("3.2", [480.0, 290.0, 520.0, 310.0]),
            word("10.00", [690.0, 92.0, 730.0, 112.0]),
            word("20.00", [690.0, 190.0, 730.0, 210.0]),
            word("30.00", [690.0, 288.0, 730.0, 308.0]),
        ];
        OcrIndex::new(words, ImageSize::new(1000, 1000))
    }

    fn column_examples() -> Vec<TemplateExample> {
        vec![
            example("item", "12.5", [480, 90, 520, 110]),
            example("item", "8.0", [480, 190, 520, 210]),
            example("item", "3.2", [480, 290, 520, 310]),
        ]
    }

    fn column_options() -> TransferOptions {
        TransferOptions {
            column_mode: true,
            ..TransferOptions::default()
        }
    }

    #[test]
    fn test_column_transfer_names_template_column_from_header() {
        let result = engine()
            .transfer(&column_examples(), &table_page(50.0), column_options(), None)
            .unwrap();

        assert_eq!(result.mode, LayoutMode::Column);
        let template = result.template_column.unwrap();
        assert_eq!(template.name, "weight");
        assert_eq!(template.header.as_deref(), Some("Weight"));
    }

    #[test]
    fn test_column_transfer_reads_each_row() {
        let result = engine()
            .transfer(&column_examples(), &table_page(50.0), column_options(), None)
            .unwrap();

        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.columns[0].name, "price");
        let pairs: Vec<(&str, &str)> = result
            .fields
            .iter()
            .map(|f| (f.label.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("price_item_1", "10.00"),
                ("price_item_2", "20.00"),
                ("price_item_3", "30.00"),
            ]
        );
        assert!(result.fields.iter().all(|f| f.source == FieldSource::ColumnSuggestion));
        assert_eq!(result.fields[0].bbox, [690, 92, 730, 112]);
    }

    #[test]
    fn test_single_row_uses_plain_column_name() {
        let examples = vec![example("item", "12.5", [480, 90, 520, 110])];
        let result = engine()
            .transfer(&examples, &table_page(50.0), column_options(), None)
            .unwrap();
        assert_eq!(result.fields[0].label, "price");
    }

    #[test]
    fn test_column_without_header_gets_placeholder_then_model_header() {
        // Header too close to the data to count as a header row
        let index = table_page(88.0);
        let result = engine()
            .transfer(&column_examples(), &index, column_options(), None)
            .unwrap();
        assert_eq!(result.columns[0].name, "column_710");
        assert_eq!(result.fields[0].label, "column_710_item_1");
        assert_eq!(result.fields[0].value, "10.00");

        let qa = answer("Weight, Price", 0.9);
        let page = page();
        let options = TransferOptions {
            ai_header_fallback: true,
            ..column_options()
        };
        let model = Some(ModelAccess { qa: &qa, page: &page });
        let result = engine()
            .transfer(&column_examples(), &index, options, model)
            .unwrap();
        assert_eq!(result.columns[0].name, "price");
        assert_eq!(result.fields[0].label, "price_item_1");
    }

    #[test]
    fn test_column_layout_without_opt_in_uses_proximity() {
        let result = engine()
            .transfer(&column_examples(), &table_page(50.0), TransferOptions::default(), None)
            .unwrap();
        assert_eq!(result.mode, LayoutMode::Scattered);
        assert!(result.fields.iter().all(|f| f.source == FieldSource::TemplateMatch));
    }

    fn invoice_examples() -> Vec<TemplateExample> {
        vec![
            example("invoice_number", "INV-1", [100, 50, 200, 70]),
            example("total", "120.00", [700, 800, 800, 820]),
        ]
    }

    fn second_invoice() -> OcrIndex {
        OcrIndex::new(
            vec![
                word("INV-9", [105.0, 55.0, 205.0, 75.0]),
                word("Total:", [600.0, 805.0, 690.0, 825.0]),
                word("55.00", [710.0, 805.0, 790.0, 825.0]),
                word("PO-77", [900.0, 50.0, 980.0, 70.0]),
            ],
            ImageSize::new(1000, 1000),
        )
    }

    #[test]
    fn test_apply_template_matches_by_position() {
        let result = engine()
            .apply_template(
                &invoice_examples(),
                &second_invoice(),
                TransferOptions::default(),
                None,
            )
            .unwrap();

        assert_eq!(result.mode, LayoutMode::Scattered);
        let values: Vec<(&str, &str)> = result
            .fields
            .iter()
            .map(|f| (f.label.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(values, vec![("invoice_number", "INV-9"), ("total", "55.00")]);
        assert_eq!(result.fields[1].id, 2);
    }

    #[test]
    fn test_qa_fallback_for_fields_without_candidates() {
        let mut examples = invoice_examples();
        examples.push(example("po_number", "PO-1", [400, 400, 450, 420]));
        let options = TransferOptions {
            qa_fallback: true,
            ..TransferOptions::default()
        };
        let page = page();

        let qa = answer("PO-77", 0.8);
        let model = Some(ModelAccess { qa: &qa, page: &page });
        let result = engine()
            .apply_template(&examples, &second_invoice(), options, model)
            .unwrap();
        let po = result.fields.iter().find(|f| f.label == "po_number").unwrap();
        assert_eq!(po.source, FieldSource::LayoutlmQa);
        assert_eq!(po.bbox, [900, 50, 980, 70]);
        assert_eq!(po.confidence, 0.8);

        let weak = answer("PO-77", 0.3);
        let model = Some(ModelAccess { qa: &weak, page: &page });
        let result = engine()
            .apply_template(&examples, &second_invoice(), options, model)
            .unwrap();
        assert!(result.fields.iter().all(|f| f.label != "po_number"));
    }

    #[test]
    fn test_unavailable_model_fails_transfer() {
        let mut examples = invoice_examples();
        examples.push(example("po_number", "PO-1", [400, 400, 450, 420]));
        let options = TransferOptions {
            qa_fallback: true,
            ..TransferOptions::default()
        };
        let qa = FixedQa(Err(CollaboratorError::unavailable("qa", "down")));
        let page = page();
        let model = Some(ModelAccess { qa: &qa, page: &page });
        let err = engine()
            .apply_template(&examples, &second_invoice(), options, model)
            .unwrap_err();
        assert!(matches!(err, DocFieldError::Collaborator(_)));
    }

    #[test]
    fn test_invalid_examples_are_rejected() {
        let index = second_invoice();
        assert!(engine().transfer(&[], &index, TransferOptions::default(), None).is_err());
        let inverted = vec![example("x", "1", [500, 10, 400, 20])];
        assert!(engine().transfer(&inverted, &index, TransferOptions::default(), None).is_err());
    }

    #[test]
    fn test_detect_layout() {
        assert_eq!(engine().detect_layout(&column_examples()), LayoutMode::Column);
        assert_eq!(engine().detect_layout(&invoice_examples()), LayoutMode::Scattered);
    }
}
