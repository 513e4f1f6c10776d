//! Tunable thresholds for extraction and template transfer
//!
//! Every value has a default, so an empty TOML document (or no file at all)
//! yields the stock behavior. Individual sections can be overridden:
//!
//! ```toml
//! [evidence]
//! fuzzy_threshold = 0.5
//!
//! [transfer]
//! column_tolerance = 45.0
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::evidence::EvidenceMatcher;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ExtractionConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    pub fn matcher(&self) -> EvidenceMatcher {
        EvidenceMatcher::new(self.evidence.fallback_confidence, self.evidence.fuzzy_threshold)
    }
}

/// Evidence matcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Confidence of values without supporting OCR words (default: 0.3)
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    /// Minimum similarity for the fuzzy step (default: 0.45)
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: default_fallback_confidence(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

fn default_fallback_confidence() -> f64 {
    crate::evidence::DEFAULT_FALLBACK_CONFIDENCE
}

fn default_fuzzy_threshold() -> f64 {
    crate::evidence::DEFAULT_FUZZY_THRESHOLD
}

/// Field extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model answers below this score are dropped (default: 0.1)
    #[serde(default = "default_qa_min_confidence")]
    pub qa_min_confidence: f64,
    /// Ranked answers requested for line-item fields (default: 5)
    #[serde(default = "default_line_item_top_k")]
    pub line_item_top_k: usize,
    /// OCR lines used for the simulated preview (default: 10)
    #[serde(default = "default_simulation_max_lines")]
    pub simulation_max_lines: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            qa_min_confidence: default_qa_min_confidence(),
            line_item_top_k: default_line_item_top_k(),
            simulation_max_lines: default_simulation_max_lines(),
        }
    }
}

fn default_qa_min_confidence() -> f64 {
    0.1
}

fn default_line_item_top_k() -> usize {
    5
}

fn default_simulation_max_lines() -> usize {
    10
}

/// Template transfer settings, all distances in normalized units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// X-center variance below which examples form a column (default: 100)
    #[serde(default = "default_column_variance")]
    pub column_variance: f64,
    /// Headers must sit this far above the first example (default: 20)
    #[serde(default = "default_header_gap")]
    pub header_gap: f64,
    /// Max vertical offset for merging header fragments (default: 10)
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,
    /// Max horizontal gap for merging header fragments (default: 30)
    #[serde(default = "default_merge_gap")]
    pub merge_gap: f64,
    /// X-center clustering tolerance (default: 60)
    #[serde(default = "default_column_tolerance")]
    pub column_tolerance: f64,
    /// Headers farther than this from a column center are ignored (default: 80)
    #[serde(default = "default_header_radius")]
    pub header_radius: f64,
    /// Max Y distance between a template row and a column value (default: 60)
    #[serde(default = "default_row_match_distance")]
    pub row_match_distance: f64,
    #[serde(default = "default_spatial_weight")]
    pub spatial_weight: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy_weight: f64,
    /// Ask the model for headers when fewer columns than this share have one (default: 0.5)
    #[serde(default = "default_ai_fallback_ratio")]
    pub ai_fallback_ratio: f64,
    /// Scattered mode search radius around each example (default: 200)
    #[serde(default = "default_scattered_radius")]
    pub scattered_radius: f64,
    /// Distance bonus for candidates whose numeric-ness matches (default: 50)
    #[serde(default = "default_numeric_bonus")]
    pub numeric_bonus: f64,
    /// Minimum model score for the per-field fallback (default: 0.3)
    #[serde(default = "default_qa_fallback_confidence")]
    pub qa_fallback_confidence: f64,
    /// Header vocabulary used for fuzzy header scoring
    #[serde(default = "default_known_field_names")]
    pub known_field_names: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            column_variance: default_column_variance(),
            header_gap: default_header_gap(),
            row_tolerance: default_row_tolerance(),
            merge_gap: default_merge_gap(),
            column_tolerance: default_column_tolerance(),
            header_radius: default_header_radius(),
            row_match_distance: default_row_match_distance(),
            spatial_weight: default_spatial_weight(),
            fuzzy_weight: default_fuzzy_weight(),
            ai_fallback_ratio: default_ai_fallback_ratio(),
            scattered_radius: default_scattered_radius(),
            numeric_bonus: default_numeric_bonus(),
            qa_fallback_confidence: default_qa_fallback_confidence(),
            known_field_names: default_known_field_names(),
        }
    }
}

fn default_column_variance() -> f64 {
    100.0
}

fn default_header_gap() -> f64 {
    20.0
}

fn default_row_tolerance() -> f64 {
    10.0
}

fn default_merge_gap() -> f64 {
    30.0
}

fn default_column_tolerance() -> f64 {
    60.0
}

fn default_header_radius() -> f64 {
    80.0
}

fn default_row_match_distance() -> f64 {
    60.0
}

fn default_spatial_weight() -> f64 {
    0.6
}

fn default_fuzzy_weight() -> f64 {
    0.4
}

fn default_ai_fallback_ratio() -> f64 {
    0.5
}

fn default_scattered_radius() -> f64 {
    200.0
}

fn default_numeric_bonus() -> f64 {
    50.0
}

fn default_qa_fallback_confidence() -> f64 {
    0.3
}

fn default_known_field_names() -> Vec<String> {
    [
        "description",
        "item",
        "product",
        "quantity",
        "qty",
        "unit",
        "unit price",
        "price",
        "amount",
        "total",
        "weight",
        "net weight",
        "gross weight",
        "value",
        "origin",
        "country of origin",
        "hs code",
        "tariff",
        "sku",
        "part number",
        "date",
        "currency",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Batch scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Fields per batch when the caller does not say (default: 5)
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = ExtractionConfig::from_str("").unwrap();
        assert_eq!(config, ExtractionConfig::default());
        assert_eq!(config.orchestrator.line_item_top_k, 5);
        assert_eq!(config.transfer.column_tolerance, 60.0);
        assert_eq!(config.batch.default_batch_size, 5);
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
            [evidence]
            fuzzy_threshold = 0.6

            [transfer]
            known_field_names = ["weight"]
        "#;
        let config = ExtractionConfig::from_str(toml).unwrap();
        assert_eq!(config.evidence.fuzzy_threshold, 0.6);
        assert_eq!(config.evidence.fallback_confidence, 0.3);
        assert_eq!(config.transfer.known_field_names, vec!["weight".to_string()]);
        assert_eq!(config.transfer.header_radius, 80.0);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nqa_min_confidence = 0.25").unwrap();
        let config = ExtractionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.orchestrator.qa_min_confidence, 0.25);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(ExtractionConfig::from_str("[evidence\nfuzzy = ").is_err());
        assert!(ExtractionConfig::from_file("/nonexistent/docfield.toml").is_err());
    }
}
