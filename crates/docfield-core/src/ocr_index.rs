//! Request-scoped index over one page of OCR output
//!
//! Raw tokens arrive in whatever shape the OCR backend produces (rectangles or
//! four-corner polygons, optional confidence). [`OcrIndex`] normalizes them
//! once and serves the word list, line grouping, full text and normalized
//! text blocks to the rest of the pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::bbox::{self, NormBox, PixelBox};
use crate::types::{ImageSize, Line, OcrWord};

/// Lines never use a tolerance smaller than this many pixels
pub const LINE_MIN_TOLERANCE_PX: f64 = 10.0;

/// Line tolerance as a fraction of the image height
pub const LINE_TOLERANCE_RATIO: f64 = 0.01;

/// Box shapes reported by OCR backends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBox {
    /// `[x1, y1, x2, y2]`
    Rect(Vec<f64>),
    /// Corner points, usually four
    Polygon(Vec<[f64; 2]>),
}

impl RawBox {
    /// Axis-aligned rectangle, `None` for malformed boxes
    pub fn to_rect(&self) -> Option<PixelBox> {
        match self {
            RawBox::Rect(coords) => match coords.as_slice() {
                &[x1, y1, x2, y2] if [x1, y1, x2, y2].iter().all(|v| v.is_finite()) => {
                    Some([x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)])
                }
                _ => None,
            },
            RawBox::Polygon(points) => bbox::from_polygon(points),
        }
    }
}

/// One token as produced by an OCR backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawOcrToken {
    pub text: String,
    #[serde(default)]
    pub bbox: Option<RawBox>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// An OCR token in normalized space with its derived features
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub bbox: NormBox,
    pub center_x: f64,
    pub center_y: f64,
    pub confidence: f64,
    pub numeric: bool,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, bbox: NormBox, confidence: f64) -> Self {
        let text = text.into();
        let (center_x, center_y) = bbox::center(&bbox);
        let numeric = is_numeric(&text);
        Self {
            text,
            bbox,
            center_x,
            center_y,
            confidence,
            numeric,
        }
    }
}

/// True for amounts, counts and similar values (`$1,234.50`, `12%`, `-3`)
pub fn is_numeric(text: &str) -> bool {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '%') && !c.is_whitespace())
        .collect();
    cleaned.chars().any(|c| c.is_ascii_digit()) && cleaned.parse::<f64>().is_ok()
}

/// OCR words of one page plus the page's pixel size
#[derive(Clone, Debug, PartialEq)]
pub struct OcrIndex {
    words: Vec<OcrWord>,
    image: ImageSize,
}

impl OcrIndex {
    /// Index already-clean words.
    ///
    /// Blank words are dropped. An empty `image` is replaced by an estimate
    /// from the word boxes.
    pub fn new(words: Vec<OcrWord>, image: ImageSize) -> Self {
        let words: Vec<OcrWord> = words
            .into_iter()
            .filter(|w| !w.text.trim().is_empty())
            .map(|w| OcrWord::new(w.text.trim(), w.bbox, w.confidence))
            .collect();
        let image = if image.is_empty() {
            bbox::estimate_image_size(words.iter().map(|w| &w.bbox))
        } else {
            image
        };
        Self { words, image }
    }

    /// Index raw backend tokens, dropping blank or unlocatable ones
    pub fn from_raw(tokens: Vec<RawOcrToken>, image: Option<ImageSize>) -> Self {
        let mut words = Vec::with_capacity(tokens.len());
        for token in tokens {
            let Some(rect) = token.bbox.as_ref().and_then(RawBox::to_rect) else {
                debug!("Dropping OCR token without usable box: {:?}", token.text);
                continue;
            };
            words.push(OcrWord::new(
                token.text,
                rect,
                token.confidence.unwrap_or(0.0),
            ));
        }
        Self::new(words, image.unwrap_or(ImageSize::new(0, 0)))
    }

    pub fn words(&self) -> &[OcrWord] {
        &self.words
    }

    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Normalize a pixel box against this page
    pub fn normalize(&self, bbox: &PixelBox) -> NormBox {
        bbox::normalize_px(bbox, self.image)
    }

    /// Group words into lines.
    ///
    /// Words are sorted by `(y1, x1)`. A new line starts when a word's top edge
    /// is more than `max(10px, 1% of image height)` away from the top edge of
    /// the current line's first word.
    pub fn group_into_lines(&self) -> Vec<Line> {
        let tolerance =
            (f64::from(self.image.height) * LINE_TOLERANCE_RATIO).max(LINE_MIN_TOLERANCE_PX);

        let mut sorted: Vec<&OcrWord> = self.words.iter().collect();
        sorted.sort_by(|a, b| reading_order(&a.bbox, &b.bbox));

        let mut lines = Vec::new();
        let mut current: Vec<&OcrWord> = Vec::new();
        for word in sorted {
            if let Some(first) = current.first() {
                if (word.bbox[1] - first.bbox[1]).abs() > tolerance {
                    lines.push(merge_line(&mut current));
                }
            }
            current.push(word);
        }
        if !current.is_empty() {
            lines.push(merge_line(&mut current));
        }
        lines
    }

    /// Page text, one OCR line per text line
    pub fn full_text(&self) -> String {
        self.group_into_lines()
            .into_iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Words as normalized text blocks, in document order
    pub fn blocks(&self) -> Vec<TextBlock> {
        self.words
            .iter()
            .map(|w| TextBlock::new(w.text.clone(), self.normalize(&w.bbox), w.confidence))
            .collect()
    }
}

fn reading_order(a: &PixelBox, b: &PixelBox) -> Ordering {
    a[1].total_cmp(&b[1]).then(a[0].total_cmp(&b[0]))
}

/// Drain `words` into one line, ordered left to right
fn merge_line(words: &mut Vec<&OcrWord>) -> Line {
    words.sort_by(|a, b| a.bbox[0].total_cmp(&b.bbox[0]));
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let bbox = bbox::union_all(words.iter().map(|w| &w.bbox)).unwrap_or([0.0; 4]);
    let word_count = words.len();
    let avg_confidence = words.iter().map(|w| w.confidence).sum::<f64>() / word_count.max(1) as f64;
    words.clear();
    Line {
        text,
        bbox,
        avg_confidence,
        word_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(text: &str, x1: f64, y1: f64, x2: f64, y2: f64, conf: f64) -> OcrWord {
        OcrWord::new(text, [x1, y1, x2, y2], conf)
    }

    #[test]
    fn test_group_into_lines_splits_on_vertical_gap() {
        let index = OcrIndex::new(
            vec![
                word("Invoice", 10.0, 10.0, 80.0, 30.0, 0.9),
                word("#123", 90.0, 12.0, 140.0, 30.0, 0.7),
                word("Total", 10.0, 60.0, 60.0, 80.0, 0.8),
            ],
            ImageSize::new(500, 500),
        );
        let lines = index.group_into_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Invoice #123");
        assert_eq!(lines[0].bbox, [10.0, 10.0, 140.0, 30.0]);
        assert_eq!(lines[0].word_count, 2);
        assert!((lines[0].avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(lines[1].text, "Total");
    }

    #[test]
    fn test_line_tolerance_scales_with_tall_images() {
        // 3000 px tall: tolerance is 30 px, so a 25 px offset stays on one line
        let index = OcrIndex::new(
            vec![
                word("Amount", 10.0, 100.0, 90.0, 130.0, 0.9),
                word("Due", 100.0, 125.0, 150.0, 150.0, 0.9),
            ],
            ImageSize::new(2000, 3000),
        );
        assert_eq!(index.group_into_lines().len(), 1);

        let small = OcrIndex::new(index.words().to_vec(), ImageSize::new(200, 300));
        assert_eq!(small.group_into_lines().len(), 2);
    }

    #[test]
    fn test_words_in_a_line_read_left_to_right() {
        let index = OcrIndex::new(
            vec![
                word("Street", 200.0, 10.0, 260.0, 30.0, 0.9),
                word("Main", 100.0, 12.0, 150.0, 30.0, 0.9),
            ],
            ImageSize::new(500, 500),
        );
        assert_eq!(index.full_text(), "Main Street");
    }

    #[test]
    fn test_from_raw_handles_polygons_and_rects() {
        let json = r#"[
            {"text": "Total", "bbox": [[10,10],[60,10],[60,30],[10,30]], "confidence": 0.95},
            {"text": "$5.00", "bbox": [70, 10, 120, 30]},
            {"text": "   ", "bbox": [0, 0, 1, 1]},
            {"text": "lost"}
        ]"#;
        let tokens: Vec<RawOcrToken> = serde_json::from_str(json).unwrap();
        let index = OcrIndex::from_raw(tokens, Some(ImageSize::new(200, 100)));
        assert_eq!(index.words().len(), 2);
        assert_eq!(index.words()[0].bbox, [10.0, 10.0, 60.0, 30.0]);
        assert_eq!(index.words()[1].confidence, 0.0);
    }

    #[test]
    fn test_missing_image_size_is_estimated() {
        let index = OcrIndex::new(
            vec![word("x", 0.0, 0.0, 640.0, 480.0, 1.0)],
            ImageSize::new(0, 0),
        );
        assert_eq!(index.image_size(), ImageSize::new(640, 480));
    }

    #[test]
    fn test_blocks_are_normalized() {
        let index = OcrIndex::new(
            vec![word("42.50", 100.0, 50.0, 200.0, 100.0, 0.9)],
            ImageSize::new(1000, 500),
        );
        let blocks = index.blocks();
        assert_eq!(blocks[0].bbox, [100, 100, 200, 200]);
        assert_eq!(blocks[0].center_x, 150.0);
        assert!(blocks[0].numeric);
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("$1,234.50"));
        assert!(is_numeric("15%"));
        assert!(is_numeric("-3"));
        assert!(!is_numeric("INV-100"));
        assert!(!is_numeric("$"));
    }
}
