//! Flattening of end-to-end parser output (Donut, CORD schema)
//!
//! The parser returns a nested JSON tree. It is converted into a typed
//! [`DonutNode`] tree once, then walked to produce flat labeled fields. Fields
//! the parser could not place are located on the page with the strict fuzzy
//! evidence matcher.

use serde_json::Value;
use tracing::debug;

use crate::bbox::PixelBox;
use crate::evidence::EvidenceMatcher;
use crate::ocr_index::{OcrIndex, RawBox};
use crate::orchestrator::number_fields;
use crate::types::{ExtractedField, FieldSource, OcrWord};

/// Confidence of leaf objects that carry none
pub const LEAF_CONFIDENCE: f64 = 0.9;
/// Confidence of plain values inside arrays
pub const ARRAY_ITEM_CONFIDENCE: f64 = 0.8;
/// Confidence of plain values
pub const SCALAR_CONFIDENCE: f64 = 0.85;

/// CORD receipt keys mapped onto invoice field names
const CORD_FIELD_MAP: &[(&str, &str)] = &[
    ("menu", "line_items"),
    ("total", "total_amount"),
    ("subtotal", "subtotal"),
    ("tax", "tax_amount"),
    ("store_name", "vendor_name"),
    ("store_addr", "vendor_address"),
    ("total.total_price", "total_amount"),
    ("total.subtotal_price", "subtotal"),
    ("total.tax_price", "tax_amount"),
];

fn mapped_name(full_key: &str) -> &str {
    CORD_FIELD_MAP
        .iter()
        .find(|(from, _)| *from == full_key)
        .map(|(_, to)| *to)
        .unwrap_or(full_key)
}

/// Parser output as a typed tree
#[derive(Clone, Debug, PartialEq)]
pub enum DonutNode {
    /// Object with a `text` or `value` entry
    Leaf {
        text: String,
        bbox: Option<PixelBox>,
        confidence: Option<f64>,
    },
    Object(Vec<(String, DonutNode)>),
    Array(Vec<DonutNode>),
    Scalar(String),
    Null,
}

impl DonutNode {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => DonutNode::Null,
            Value::Bool(b) => DonutNode::Scalar(b.to_string()),
            Value::Number(n) => DonutNode::Scalar(n.to_string()),
            Value::String(s) => DonutNode::Scalar(s.clone()),
            Value::Array(items) => {
                DonutNode::Array(items.iter().map(DonutNode::from_value).collect())
            }
            Value::Object(map) => {
                if map.contains_key("text") || map.contains_key("value") {
                    let text = map
                        .get("text")
                        .map(scalar_text)
                        .filter(|t| !t.is_empty())
                        .or_else(|| map.get("value").map(scalar_text))
                        .unwrap_or_default();
                    let bbox = map
                        .get("bounding_box")
                        .or_else(|| map.get("bbox"))
                        .and_then(|b| serde_json::from_value::<RawBox>(b.clone()).ok())
                        .and_then(|b| b.to_rect());
                    let confidence = map.get("confidence").and_then(Value::as_f64);
                    DonutNode::Leaf {
                        text,
                        bbox,
                        confidence,
                    }
                } else {
                    DonutNode::Object(
                        map.iter()
                            .map(|(k, v)| (k.clone(), DonutNode::from_value(v)))
                            .collect(),
                    )
                }
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A flattened field before it is placed on the page
#[derive(Clone, Debug, PartialEq)]
pub struct DonutField {
    pub label: String,
    pub value: String,
    pub bbox: Option<PixelBox>,
    pub confidence: f64,
}

/// Flatten parser output into labeled fields, in the parser's key order
pub fn flatten(root: &Value) -> Vec<DonutField> {
    let mut fields = Vec::new();
    match DonutNode::from_value(root) {
        DonutNode::Object(entries) => {
            for (key, node) in &entries {
                walk(key, node, "", &mut fields);
            }
        }
        other => walk("document", &other, "", &mut fields),
    }
    fields
}

fn walk(key: &str, node: &DonutNode, parent: &str, out: &mut Vec<DonutField>) {
    let full_key = if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    };
    let name = mapped_name(&full_key).to_string();

    match node {
        DonutNode::Null => {}
        DonutNode::Leaf {
            text,
            bbox,
            confidence,
        } => out.push(DonutField {
            label: name,
            value: text.clone(),
            bbox: *bbox,
            confidence: confidence.unwrap_or(LEAF_CONFIDENCE),
        }),
        DonutNode::Object(entries) => {
            for (child_key, child) in entries {
                walk(child_key, child, &full_key, out);
            }
        }
        DonutNode::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                match item {
                    DonutNode::Object(entries) => {
                        let item_key = format!("{}_item_{}", name, idx + 1);
                        for (child_key, child) in entries {
                            walk(child_key, child, &item_key, out);
                        }
                    }
                    DonutNode::Leaf { .. } => {
                        walk(&format!("{}_item_{}", name, idx + 1), item, "", out)
                    }
                    DonutNode::Array(_) => walk(&format!("{}_{}", name, idx + 1), item, "", out),
                    DonutNode::Scalar(value) => out.push(DonutField {
                        label: format!("{}_{}", name, idx + 1),
                        value: value.clone(),
                        bbox: None,
                        confidence: ARRAY_ITEM_CONFIDENCE,
                    }),
                    DonutNode::Null => {}
                }
            }
        }
        DonutNode::Scalar(value) => out.push(DonutField {
            label: name,
            value: value.clone(),
            bbox: None,
            confidence: SCALAR_CONFIDENCE,
        }),
    }
}

/// Normalize parser boxes and place unboxed fields on OCR evidence.
///
/// Both single words and grouped lines are candidates for the fuzzy match, so
/// multi-word values like vendor names can be found.
pub fn enrich(
    fields: Vec<DonutField>,
    index: &OcrIndex,
    matcher: &EvidenceMatcher,
) -> Vec<ExtractedField> {
    let mut entries: Vec<OcrWord> = index.words().to_vec();
    entries.extend(
        index
            .group_into_lines()
            .into_iter()
            .filter(|l| l.word_count > 1)
            .map(|l| OcrWord::new(l.text, l.bbox, l.avg_confidence)),
    );

    let mut out: Vec<ExtractedField> = fields
        .into_iter()
        .filter(|f| !f.value.trim().is_empty())
        .map(|f| {
            let (bbox, confidence) = match f.bbox {
                Some(px) => (index.normalize(&px), f.confidence.clamp(0.0, 1.0)),
                None => {
                    let evidence = matcher.locate_fuzzy(&f.value, &entries, f.confidence);
                    debug!("Donut field {} placed via {:?}", f.label, evidence.kind);
                    (evidence.normalized(index.image_size()), evidence.confidence)
                }
            };
            ExtractedField {
                id: 0,
                label: f.label,
                value: f.value,
                bbox,
                confidence,
                source: FieldSource::Donut,
                simulated: false,
            }
        })
        .collect();
    number_fields(&mut out);
    out
}
