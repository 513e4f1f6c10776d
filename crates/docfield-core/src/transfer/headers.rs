//! Column header detection and naming

use std::cmp::Ordering;

use crate::bbox;
use crate::config::TransferConfig;
use crate::evidence::similarity;
use crate::ocr_index::TextBlock;

/// Blocks whose center lies more than `gap` above `top_y`
pub fn header_candidates(blocks: &[TextBlock], top_y: f64, gap: f64) -> Vec<TextBlock> {
    blocks
        .iter()
        .filter(|b| b.center_y < top_y - gap)
        .cloned()
        .collect()
}

/// Join header fragments that belong to one label ("Net" + "Weight").
///
/// Fragments on the same row (`|dy| < row_tolerance`) are merged left to right
/// while the horizontal gap to the next fragment is in `[0, merge_gap)`.
pub fn merge_fragments(
    mut blocks: Vec<TextBlock>,
    row_tolerance: f64,
    merge_gap: f64,
) -> Vec<TextBlock> {
    blocks.sort_by(|a, b| {
        a.center_y
            .total_cmp(&b.center_y)
            .then(a.bbox[0].cmp(&b.bbox[0]))
    });

    let mut rows: Vec<Vec<TextBlock>> = Vec::new();
    for block in blocks {
        match rows.last_mut() {
            Some(row) if (block.center_y - row[0].center_y).abs() < row_tolerance => {
                row.push(block)
            }
            _ => rows.push(vec![block]),
        }
    }

    let mut merged = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| a.bbox[0].cmp(&b.bbox[0]));
        let mut iter = row.into_iter();
        let Some(mut current) = iter.next() else {
            continue;
        };
        for next in iter {
            let gap = f64::from(next.bbox[0]) - f64::from(current.bbox[2]);
            if (0.0..merge_gap).contains(&gap) {
                current = TextBlock::new(
                    format!("{} {}", current.text, next.text),
                    bbox::union_norm(&current.bbox, &next.bbox),
                    (current.confidence + next.confidence) / 2.0,
                );
            } else {
                merged.push(std::mem::replace(&mut current, next));
            }
        }
        merged.push(current);
    }
    merged
}

/// Best fuzzy match of `text` against the known header vocabulary
pub fn vocabulary_score(text: &str, known: &[String]) -> f64 {
    known
        .iter()
        .map(|name| similarity(text, name))
        .fold(0.0, f64::max)
}

/// Header for a column centered at `center_x`.
///
/// Each header within `header_radius` is scored as
/// `spatial_weight * (1 - dx / radius) + fuzzy_weight * vocabulary_score`;
/// the highest score wins.
pub fn best_header<'a>(
    headers: &'a [TextBlock],
    center_x: f64,
    config: &TransferConfig,
) -> Option<(&'a TextBlock, f64)> {
    headers
        .iter()
        .filter_map(|h| {
            let dx = (h.center_x - center_x).abs();
            if dx > config.header_radius {
                return None;
            }
            let spatial = 1.0 - dx / config.header_radius.max(f64::EPSILON);
            let fuzzy = vocabulary_score(&h.text, &config.known_field_names);
            Some((h, config.spatial_weight * spatial + config.fuzzy_weight * fuzzy))
        })
        .fold(None, |best: Option<(&TextBlock, f64)>, candidate| match best {
            Some(b) if b.1.partial_cmp(&candidate.1) != Some(Ordering::Less) => Some(b),
            _ => Some(candidate),
        })
}

/// Field name for a header: lowercase, separators to `_`, runs collapsed, ends trimmed
pub fn field_name(header: &str) -> String {
    let mut name = String::with_capacity(header.len());
    for c in header.trim().to_lowercase().chars() {
        let c = if matches!(c, ' ' | '/' | '.' | '-') || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }
    name.trim_matches('_').to_string()
}

/// Placeholder name for a column without a header
pub fn fallback_name(center_x: f64) -> String {
    format!("column_{}", center_x.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(text: &str, bbox: [u32; 4]) -> TextBlock {
        TextBlock::new(text, bbox, 0.9)
    }

    #[test]
    fn test_field_name() {
        assert_eq!(field_name("Net Weight"), "net_weight");
        assert_eq!(field_name("  Unit/Price. "), "unit_price");
        assert_eq!(field_name("H.S. - Code"), "h_s_code");
        assert_eq!(field_name("Qty"), "qty");
    }

    #[test]
    fn test_merge_fragments_on_one_row() {
        let merged = merge_fragments(
            vec![
                block("Weight", [455, 42, 500, 58]),
                block("Net", [420, 44, 445, 60]),
                block("Price", [700, 42, 740, 58]),
            ],
            10.0,
            30.0,
        );
        let texts: Vec<&str> = merged.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Net Weight", "Price"]);
        assert_eq!(merged[0].bbox, [420, 42, 500, 60]);
    }

    #[test]
    fn test_fragments_on_different_rows_stay_apart() {
        let merged = merge_fragments(
            vec![block("Gross", [100, 10, 150, 20]), block("Weight", [155, 40, 200, 50])],
            10.0,
            30.0,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_best_header_prefers_vocabulary_and_proximity() {
        let config = TransferConfig::default();
        let headers = vec![
            block("Weight", [450, 40, 510, 60]),
            block("Remarks", [560, 40, 600, 60]),
        ];
        let (header, score) = best_header(&headers, 500.0, &config).unwrap();
        assert_eq!(header.text, "Weight");
        assert!((score - (0.6 * (1.0 - 20.0 / 80.0) + 0.4)).abs() < 1e-9);

        assert!(best_header(&headers, 900.0, &config).is_none());
    }

    #[test]
    fn test_header_candidates_sit_above_the_data() {
        let blocks = vec![block("Weight", [450, 40, 510, 60]), block("12.5", [450, 90, 510, 110])];
        let headers = header_candidates(&blocks, 100.0, 20.0);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].text, "Weight");
    }
}
