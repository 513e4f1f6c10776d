//! Coordinate transformation between pixel space and the 0-1000 normalized space
//!
//! Every box that leaves the core is normalized. A consumer scales it back with
//! `box / 1000 * image_dimension`, independent of the source resolution.

use crate::types::ImageSize;

/// `[x1, y1, x2, y2]` in pixels (OCR engines report fractional coordinates)
pub type PixelBox = [f64; 4];

/// `[x1, y1, x2, y2]` on the fixed 0-1000 scale
pub type NormBox = [u32; 4];

/// Side length of the normalized coordinate space
pub const NORMALIZED_SCALE: u32 = 1000;

/// Returned for every box that is missing, malformed or degenerate
pub const SENTINEL_BOX: NormBox = [0, 0, 100, 100];

/// Page size assumed when neither the raster nor the OCR output tells us (A4 in points)
pub const DEFAULT_PAGE_SIZE: ImageSize = ImageSize {
    width: 595,
    height: 842,
};

/// Convert a pixel box to normalized coordinates.
///
/// Truncates, never rounds. Absent boxes, boxes that are not exactly four
/// values long, non-finite values and empty images all yield [`SENTINEL_BOX`];
/// so does a box that is inverted after clamping to `[0, 1000]`.
pub fn normalize(bbox: Option<&[f64]>, img_w: u32, img_h: u32) -> NormBox {
    let Some(&[x1, y1, x2, y2]) = bbox else {
        return SENTINEL_BOX;
    };
    if img_w == 0 || img_h == 0 || ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
        return SENTINEL_BOX;
    }

    let nx1 = scale_down(x1, img_w);
    let ny1 = scale_down(y1, img_h);
    let nx2 = scale_down(x2, img_w);
    let ny2 = scale_down(y2, img_h);

    if nx1 > nx2 || ny1 > ny2 {
        return SENTINEL_BOX;
    }
    [nx1, ny1, nx2, ny2]
}

/// [`normalize`] for a well-formed pixel box
pub fn normalize_px(bbox: &PixelBox, size: ImageSize) -> NormBox {
    normalize(Some(bbox.as_slice()), size.width, size.height)
}

/// Inverse of [`normalize`], truncating to whole pixels.
///
/// A round trip loses at most one normalized unit, i.e. `ceil(dim / 1000)`
/// pixels per coordinate.
pub fn denormalize(bbox: &NormBox, img_w: u32, img_h: u32) -> [u32; 4] {
    let [x1, y1, x2, y2] = *bbox;
    [
        scale_up(x1, img_w),
        scale_up(y1, img_h),
        scale_up(x2, img_w),
        scale_up(y2, img_h),
    ]
}

fn scale_down(value: f64, dim: u32) -> u32 {
    let scaled = (value * f64::from(NORMALIZED_SCALE) / f64::from(dim)).floor();
    scaled.clamp(0.0, f64::from(NORMALIZED_SCALE)) as u32
}

fn scale_up(value: u32, dim: u32) -> u32 {
    (u64::from(value) * u64::from(dim) / u64::from(NORMALIZED_SCALE)) as u32
}

/// True when the box satisfies the output invariant
pub fn is_valid(bbox: &NormBox) -> bool {
    bbox.iter().all(|v| *v <= NORMALIZED_SCALE) && bbox[0] <= bbox[2] && bbox[1] <= bbox[3]
}

/// Smallest box containing both inputs
pub fn union(a: &PixelBox, b: &PixelBox) -> PixelBox {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

/// Union of every box, or `None` for an empty input
pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a PixelBox>) -> Option<PixelBox> {
    boxes.into_iter().fold(None, |acc, b| match acc {
        None => Some(*b),
        Some(acc) => Some(union(&acc, b)),
    })
}

/// Union in normalized space
pub fn union_norm(a: &NormBox, b: &NormBox) -> NormBox {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

/// Center point of a normalized box
pub fn center(bbox: &NormBox) -> (f64, f64) {
    (
        (f64::from(bbox[0]) + f64::from(bbox[2])) / 2.0,
        (f64::from(bbox[1]) + f64::from(bbox[3])) / 2.0,
    )
}

/// Axis-aligned rectangle around a polygon such as a four-corner OCR quad
pub fn from_polygon(points: &[[f64; 2]]) -> Option<PixelBox> {
    if points.len() < 2 {
        return None;
    }
    let mut rect = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for [x, y] in points {
        rect[0] = rect[0].min(*x);
        rect[1] = rect[1].min(*y);
        rect[2] = rect[2].max(*x);
        rect[3] = rect[3].max(*y);
    }
    rect.iter().all(|v| v.is_finite()).then_some(rect)
}

/// Estimate page size from the furthest OCR box edges.
///
/// Used when the raster size is unknown. Falls back to [`DEFAULT_PAGE_SIZE`]
/// when there are no usable boxes.
pub fn estimate_image_size<'a>(boxes: impl IntoIterator<Item = &'a PixelBox>) -> ImageSize {
    let (max_x, max_y) = boxes
        .into_iter()
        .fold((0.0_f64, 0.0_f64), |(mx, my), b| (mx.max(b[2]), my.max(b[3])));
    if max_x < 1.0 || max_y < 1.0 {
        return DEFAULT_PAGE_SIZE;
    }
    ImageSize::new(max_x.ceil() as u32, max_y.ceil() as u32)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn norm(b: &[f64], w: u32, h: u32) -> NormBox {
        normalize(Some(b), w, h)
    }

    fn pixel_box_within(w: u32, h: u32) -> impl Strategy<Value = [u32; 4]> {
        (0..=w, 0..=w, 0..=h, 0..=h)
            .prop_map(|(a, b, c, d)| [a.min(b), c.min(d), a.max(b), c.max(d)])
    }

    proptest! {
        /// Property: round trip is exact to one pixel for rasters up to 1000 px
        #[test]
        fn round_trip_within_one_pixel(
            (w, h, b) in (1u32..=1000, 1u32..=1000)
                .prop_flat_map(|(w, h)| (Just(w), Just(h), pixel_box_within(w, h)))
        ) {
            let px = [f64::from(b[0]), f64::from(b[1]), f64::from(b[2]), f64::from(b[3])];
            let back = denormalize(&norm(&px, w, h), w, h);
            for i in 0..4 {
                prop_assert!(b[i].abs_diff(back[i]) <= 1, "coord {} : {} -> {}", i, b[i], back[i]);
            }
        }

        /// Property: large rasters lose at most one normalized unit per coordinate
        #[test]
        fn round_trip_within_one_unit(
            (w, h, b) in (1u32..=8000, 1u32..=8000)
                .prop_flat_map(|(w, h)| (Just(w), Just(h), pixel_box_within(w, h)))
        ) {
            let px = [f64::from(b[0]), f64::from(b[1]), f64::from(b[2]), f64::from(b[3])];
            let back = denormalize(&norm(&px, w, h), w, h);
            let tol = [w.div_ceil(1000), h.div_ceil(1000), w.div_ceil(1000), h.div_ceil(1000)];
            for i in 0..4 {
                prop_assert!(b[i].abs_diff(back[i]) <= tol[i]);
            }
        }

        /// Property: normalized output always satisfies the box invariant
        #[test]
        fn normalized_boxes_are_valid(
            coords in prop::collection::vec(-5000.0f64..5000.0, 0..6),
            w in 0u32..5000,
            h in 0u32..5000,
        ) {
            let out = norm(&coords, w, h);
            prop_assert!(is_valid(&out));
            if coords.len() != 4 || w == 0 || h == 0 {
                prop_assert_eq!(out, SENTINEL_BOX);
            }
        }
    }
}
