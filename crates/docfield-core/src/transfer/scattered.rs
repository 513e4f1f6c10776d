//! Proximity matching for scattered (non-tabular) templates and cross-page transfer

use crate::config::TransferConfig;
use crate::ocr_index::{is_numeric, TextBlock};
use crate::types::{ImageSize, TemplateExample};

/// Nearest block to an example's position.
///
/// Only blocks within `scattered_radius` on both axes are considered. The
/// score is the Euclidean distance in pixels, reduced by `numeric_bonus` when
/// the block and the example agree on being numeric. Lowest score wins; the
/// earlier block wins ties.
pub fn nearest_block<'a>(
    example: &TemplateExample,
    blocks: &'a [TextBlock],
    image: ImageSize,
    config: &TransferConfig,
) -> Option<(&'a TextBlock, f64)> {
    let (ex, ey) = example.center();
    let wants_numeric = is_numeric(&example.value);
    let sx = f64::from(image.width) / 1000.0;
    let sy = f64::from(image.height) / 1000.0;

    let radius = config.scattered_radius;
    blocks
        .iter()
        .filter(|b| (b.center_x - ex).abs() <= radius && (b.center_y - ey).abs() <= radius)
        .map(|b| {
            let dx = (b.center_x - ex) * sx;
            let dy = (b.center_y - ey) * sy;
            let mut score = (dx * dx + dy * dy).sqrt();
            if b.numeric == wants_numeric {
                score -= config.numeric_bonus;
            }
            (b, score)
        })
        .fold(None, |best: Option<(&TextBlock, f64)>, (b, score)| match best {
            Some((_, best_score)) if best_score <= score => best,
            _ => Some((b, score)),
        })
}

/// Question asked when no block is near an example (`net_weight` -> `What is the net weight?`)
pub fn fallback_question(field_name: &str) -> String {
    let words = field_name
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("What is the {}?", words)
}
