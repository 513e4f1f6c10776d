//! Column clustering and per-row value assignment

use serde::Serialize;

use crate::ocr_index::TextBlock;
use crate::types::TemplateExample;

/// A column of data blocks sharing an X-center
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub center_x: f64,
    pub blocks: Vec<TextBlock>,
}

/// Column name and how it was derived
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub center_x: f64,
    /// Header text the name came from, `None` for `column_{x}` placeholders
    pub header: Option<String>,
    pub header_score: Option<f64>,
}

/// Group blocks into columns by X-center.
///
/// Blocks are sorted by center and chained while each center is within
/// `tolerance` of the previous one.
pub fn cluster_by_x(mut blocks: Vec<TextBlock>, tolerance: f64) -> Vec<Column> {
    blocks.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));

    let mut groups: Vec<Vec<TextBlock>> = Vec::new();
    let mut last: Option<f64> = None;
    for block in blocks {
        match (groups.last_mut(), last) {
            (Some(group), Some(prev)) if block.center_x <= prev + tolerance => {
                last = Some(block.center_x);
                group.push(block);
            }
            _ => {
                last = Some(block.center_x);
                groups.push(vec![block]);
            }
        }
    }

    groups
        .into_iter()
        .map(|blocks| {
            let center_x = blocks.iter().map(|b| b.center_x).sum::<f64>() / blocks.len() as f64;
            Column { center_x, blocks }
        })
        .collect()
}

/// Block of `column` on the same row as `example`, if any lies within `max_dy`
pub fn value_for_row<'a>(
    column: &'a Column,
    example: &TemplateExample,
    max_dy: f64,
) -> Option<&'a TextBlock> {
    let (_, row_y) = example.center();
    column
        .blocks
        .iter()
        .map(|b| (b, (b.center_y - row_y).abs()))
        .filter(|(_, dy)| *dy <= max_dy)
        .fold(None, |best: Option<(&TextBlock, f64)>, (b, dy)| match best {
            Some((_, best_dy)) if best_dy <= dy => best,
            _ => Some((b, dy)),
        })
        .map(|(b, _)| b)
}

/// Population variance of the example X-centers
pub fn x_variance(examples: &[TemplateExample]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let n = examples.len() as f64;
    let xs: Vec<f64> = examples.iter().map(|e| e.center().0).collect();
    let mean = xs.iter().sum::<f64>() / n;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str, bbox: [u32; 4]) -> TextBlock {
        TextBlock::new(text, bbox, 0.9)
    }

    fn example(bbox: [u32; 4]) -> TemplateExample {
        TemplateExample {
            field_name: "item".into(),
            value: "x".into(),
            bbox,
        }
    }

    #[test]
    fn test_cluster_by_x() {
        let columns = cluster_by_x(
            vec![
                block("a", [100, 100, 140, 120]),
                block("b", [700, 100, 740, 120]),
                block("c", [110, 200, 160, 220]),
            ],
            60.0,
        );
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].blocks.len(), 2);
        assert_eq!(columns[0].center_x, 127.5);
        assert_eq!(columns[1].blocks[0].text, "b");
    }

    #[test]
    fn test_value_for_row_picks_closest_within_limit() {
        let column = Column {
            center_x: 700.0,
            blocks: vec![block("1.0", [680, 95, 720, 105]), block("2.0", [680, 190, 720, 210])],
        };
        let found = value_for_row(&column, &example([480, 190, 520, 214]), 60.0).unwrap();
        assert_eq!(found.text, "2.0");
        assert!(value_for_row(&column, &example([480, 400, 520, 420]), 60.0).is_none());
    }

    #[test]
    fn test_x_variance() {
        let aligned = [example([490, 0, 510, 10]), example([488, 50, 508, 60])];
        assert!(x_variance(&aligned) < 100.0);
        let spread = [example([100, 0, 120, 10]), example([800, 0, 820, 10])];
        assert!(x_variance(&spread) > 100.0);
        assert_eq!(x_variance(&[]), 0.0);
    }
}
