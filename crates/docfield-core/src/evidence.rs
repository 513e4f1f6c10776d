//! Evidence matching: resolve a text value to the OCR words that justify it
//!
//! Resolution order, first success wins:
//! 1. exact case-insensitive match with one word
//! 2. every word that is a substring of the value (or contains it)
//! 3. a sliding window of as many words as the value has tokens
//! 4. sentinel box with a fixed low confidence
//!
//! [`EvidenceMatcher::locate_fuzzy`] is the stricter similarity-ratio variant
//! used to place values produced by an end-to-end document parser.

use serde::Serialize;
use strsim::normalized_levenshtein;

use crate::bbox::{self, NormBox, PixelBox};
use crate::types::{ImageSize, OcrWord};

/// Confidence assigned when nothing on the page supports a value
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.3;

/// Minimum similarity ratio for the fuzzy variant
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.45;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Substring,
    Sequence,
    Fuzzy,
    Unmatched,
}

/// Location and confidence backing a value
#[derive(Clone, Debug, PartialEq)]
pub struct Evidence {
    /// Pixel box, `None` when unmatched
    pub bbox: Option<PixelBox>,
    pub confidence: f64,
    pub kind: MatchKind,
}

impl Evidence {
    fn from_words(words: &[&OcrWord], kind: MatchKind) -> Self {
        let bbox = bbox::union_all(words.iter().map(|w| &w.bbox));
        let confidence =
            words.iter().map(|w| w.confidence).sum::<f64>() / words.len().max(1) as f64;
        Self {
            bbox,
            confidence,
            kind,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.kind != MatchKind::Unmatched
    }

    /// Normalized box; the sentinel when unmatched
    pub fn normalized(&self, size: ImageSize) -> NormBox {
        bbox::normalize(
            self.bbox.as_ref().map(|b| b.as_slice()),
            size.width,
            size.height,
        )
    }
}

/// Case-insensitive similarity ratio in `[0, 1]`
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvidenceMatcher {
    fallback_confidence: f64,
    fuzzy_threshold: f64,
}

impl Default for EvidenceMatcher {
    fn default() -> Self {
        Self {
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl EvidenceMatcher {
    pub fn new(fallback_confidence: f64, fuzzy_threshold: f64) -> Self {
        Self {
            fallback_confidence,
            fuzzy_threshold,
        }
    }

    fn unmatched(&self) -> Evidence {
        Evidence {
            bbox: None,
            confidence: self.fallback_confidence,
            kind: MatchKind::Unmatched,
        }
    }

    /// Locate `value` among `words` using the exact/substring/sequence chain
    pub fn locate(&self, value: &str, words: &[OcrWord]) -> Evidence {
        self.locate_exact(value, words).unwrap_or_else(|| self.unmatched())
    }

    fn locate_exact(&self, value: &str, words: &[OcrWord]) -> Option<Evidence> {
        let needle = value.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let lowered: Vec<String> = words.iter().map(|w| w.text.trim().to_lowercase()).collect();

        if let Some(i) = lowered.iter().position(|t| *t == needle) {
            return Some(Evidence::from_words(&[&words[i]], MatchKind::Exact));
        }

        let overlapping: Vec<&OcrWord> = words
            .iter()
            .zip(&lowered)
            .filter(|(_, t)| !t.is_empty() && (needle.contains(t.as_str()) || t.contains(&needle)))
            .map(|(w, _)| w)
            .collect();
        if !overlapping.is_empty() {
            return Some(Evidence::from_words(&overlapping, MatchKind::Substring));
        }

        let span = needle.split_whitespace().count();
        if span >= 2 && span <= words.len() {
            for start in 0..=words.len() - span {
                let joined = lowered[start..start + span].join(" ");
                if needle.contains(&joined) || joined.contains(&needle) {
                    let window: Vec<&OcrWord> = words[start..start + span].iter().collect();
                    return Some(Evidence::from_words(&window, MatchKind::Sequence));
                }
            }
        }

        None
    }

    /// Strict similarity variant.
    ///
    /// Scores every entry, keeps the best only if it beats the fuzzy threshold.
    /// The confidence is the mean of the source confidence and the entry's OCR
    /// confidence, clamped to `[0, 1]`.
    pub fn locate_fuzzy(
        &self,
        value: &str,
        entries: &[OcrWord],
        source_confidence: f64,
    ) -> Evidence {
        if value.trim().is_empty() {
            return self.unmatched();
        }
        let mut best: Option<(&OcrWord, f64)> = None;
        for entry in entries {
            let score = similarity(value, &entry.text);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }
        match best {
            Some((entry, score)) if score > self.fuzzy_threshold => Evidence {
                bbox: Some(entry.bbox),
                confidence: ((source_confidence + entry.confidence) / 2.0).clamp(0.0, 1.0),
                kind: MatchKind::Fuzzy,
            },
            _ => self.unmatched(),
        }
    }

    /// Full chain: exact, substring, sequence, then similarity, then fallback
    pub fn resolve(&self, value: &str, words: &[OcrWord], source_confidence: f64) -> Evidence {
        self.locate_exact(value, words)
            .unwrap_or_else(|| self.locate_fuzzy(value, words, source_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(text: &str, bbox: PixelBox, conf: f64) -> OcrWord {
        OcrWord::new(text, bbox, conf)
    }

    fn invoice_words() -> Vec<OcrWord> {
        vec![
            word("INV-2024-100", [10.0, 10.0, 120.0, 30.0], 0.97),
            word("Total", [10.0, 200.0, 60.0, 220.0], 0.91),
            word("$500.00", [70.0, 200.0, 140.0, 220.0], 0.88),
        ]
    }

    #[test]
    fn test_exact_match_returns_word_box_and_confidence() {
        let evidence = EvidenceMatcher::default().locate("INV-2024-100", &invoice_words());
        assert_eq!(evidence.kind, MatchKind::Exact);
        assert_eq!(evidence.bbox, Some([10.0, 10.0, 120.0, 30.0]));
        assert_eq!(evidence.confidence, 0.97);
    }

    #[test]
    fn test_exact_match_ignores_case() {
        let evidence = EvidenceMatcher::default().locate("total", &invoice_words());
        assert_eq!(evidence.kind, MatchKind::Exact);
        assert_eq!(evidence.confidence, 0.91);
    }

    #[test]
    fn test_multi_word_value_returns_union_and_mean() {
        let words = vec![
            word("Ship", [0.0, 0.0, 40.0, 20.0], 0.5),
            word("123", [10.0, 100.0, 40.0, 120.0], 0.9),
            word("Main", [45.0, 101.0, 90.0, 121.0], 0.8),
            word("Street", [95.0, 99.0, 160.0, 119.0], 0.7),
        ];
        let evidence = EvidenceMatcher::default().locate("123 Main Street", &words);
        assert_eq!(evidence.bbox, Some([10.0, 99.0, 160.0, 121.0]));
        assert!((evidence.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_substring_collects_every_overlapping_word() {
        let words = vec![
            word("Amount:", [0.0, 0.0, 50.0, 10.0], 0.6),
            word("1,250.00", [60.0, 0.0, 120.0, 10.0], 1.0),
        ];
        let evidence = EvidenceMatcher::default().locate("USD 1,250.00", &words);
        assert_eq!(evidence.kind, MatchKind::Substring);
        assert_eq!(evidence.bbox, Some([60.0, 0.0, 120.0, 10.0]));
        assert_eq!(evidence.confidence, 1.0);
    }

    #[test]
    fn test_sequence_window_matches_joined_text() {
        // Value straddles two words without containing either one
        let words = vec![
            word("Due", [0.0, 0.0, 30.0, 10.0], 0.5),
            word("Net-30", [40.0, 0.0, 80.0, 10.0], 0.9),
            word("terms", [85.0, 0.0, 130.0, 10.0], 0.7),
        ];
        let evidence = EvidenceMatcher::default().locate("et-30 ter", &words);
        assert_eq!(evidence.kind, MatchKind::Sequence);
        assert_eq!(evidence.bbox, Some([40.0, 0.0, 130.0, 10.0]));
        assert!((evidence.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_unmatched_value_gets_sentinel() {
        let evidence = EvidenceMatcher::default().locate("Nowhere", &invoice_words());
        assert_eq!(evidence.kind, MatchKind::Unmatched);
        assert_eq!(evidence.confidence, 0.3);
        assert_eq!(evidence.normalized(ImageSize::new(500, 500)), bbox::SENTINEL_BOX);
    }

    #[test]
    fn test_empty_value_is_unmatched() {
        let evidence = EvidenceMatcher::default().locate("   ", &invoice_words());
        assert!(!evidence.is_matched());
    }

    #[test]
    fn test_fuzzy_without_candidate_gives_sentinel() {
        let evidence = EvidenceMatcher::default().locate_fuzzy("ACME Corp", &invoice_words(), 0.9);
        assert_eq!(evidence.kind, MatchKind::Unmatched);
        assert_eq!(evidence.bbox, None);
        assert_eq!(evidence.confidence, 0.3);
    }

    #[test]
    fn test_fuzzy_accepts_close_entry_and_averages_confidence() {
        let mut entries = invoice_words();
        entries.push(word("ACME Corp.", [300.0, 10.0, 400.0, 30.0], 0.8));
        let evidence = EvidenceMatcher::default().locate_fuzzy("ACME Corp", &entries, 0.9);
        assert_eq!(evidence.kind, MatchKind::Fuzzy);
        assert_eq!(evidence.bbox, Some([300.0, 10.0, 400.0, 30.0]));
        assert!((evidence.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_confidence_is_clamped() {
        let entries = vec![word("Total", [0.0, 0.0, 1.0, 1.0], 1.0)];
        let evidence = EvidenceMatcher::default().locate_fuzzy("Totals", &entries, 3.0);
        assert_eq!(evidence.confidence, 1.0);
    }

    #[test]
    fn test_resolve_prefers_exact_chain_then_fuzzy() {
        let words = vec![word("Acme", [0.0, 0.0, 10.0, 10.0], 0.9)];
        let exact = EvidenceMatcher::default().resolve("ACME", &words, 0.5);
        assert_eq!(exact.kind, MatchKind::Exact);

        let words = vec![word("Invoise", [0.0, 0.0, 10.0, 10.0], 0.9)];
        let fuzzy = EvidenceMatcher::default().resolve("Invoice", &words, 0.5);
        assert_eq!(fuzzy.kind, MatchKind::Fuzzy);
        assert!((fuzzy.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_is_case_insensitive() {
        assert_eq!(similarity("Weight", "WEIGHT"), 1.0);
        assert!(similarity("Weight", "Quantity") < 0.45);
    }
}
