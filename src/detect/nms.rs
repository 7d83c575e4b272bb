//! Decoding of YOLO-style detector output.
//!
//! The model sees the frame resized to `input_size` x `input_size` and emits one
//! row per anchor: `cx, cy, w, h` in input pixels followed by one score per
//! class. Exporters disagree on the axis order, so both `[1, 4 + nc, N]` and
//! `[1, N, 4 + nc]` are accepted.

use anyhow::{anyhow, Result};

use super::result::PlateRegion;
use crate::frame::BoundingBox;

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub input_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub plate_class: usize,
    pub confidence_threshold: f32,
}

/// Turn a raw output tensor into frame-space regions above the threshold.
pub fn decode_output(data: &[f32], shape: &[usize], opts: &DecodeOptions) -> Result<Vec<PlateRegion>> {
    let dims: Vec<usize> = shape.iter().copied().filter(|&d| d != 1).collect();
    let (rows, attrs, attrs_major) = match dims.as_slice() {
        [a, b] if a < b => (*b, *a, true),
        [a, b] => (*a, *b, false),
        _ => return Err(anyhow!("unexpected detector output shape {:?}", shape)),
    };
    if data.len() != rows * attrs {
        return Err(anyhow!(
            "detector output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * attrs
        ));
    }
    let score_index = 4 + opts.plate_class;
    if score_index >= attrs {
        return Err(anyhow!(
            "plate class {} out of range for {} output attributes",
            opts.plate_class,
            attrs
        ));
    }

    let at = |row: usize, attr: usize| {
        if attrs_major {
            data[attr * rows + row]
        } else {
            data[row * attrs + attr]
        }
    };
    let scale_x = opts.frame_width as f32 / opts.input_size as f32;
    let scale_y = opts.frame_height as f32 / opts.input_size as f32;

    let mut regions = Vec::new();
    for row in 0..rows {
        let score = at(row, score_index);
        if !score.is_finite() || score < opts.confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(row, 0), at(row, 1), at(row, 2), at(row, 3));
        let bbox = BoundingBox::new(
            ((cx - w / 2.0) * scale_x).max(0.0),
            ((cy - h / 2.0) * scale_y).max(0.0),
            ((cx + w / 2.0) * scale_x).min(opts.frame_width as f32),
            ((cy + h / 2.0) * scale_y).min(opts.frame_height as f32),
        );
        if bbox.area() > 0.0 {
            regions.push(PlateRegion::new(bbox, score));
        }
    }
    Ok(regions)
}

/// Greedy non-maximum suppression. Output is sorted by descending confidence.
pub fn non_max_suppression(mut regions: Vec<PlateRegion>, iou_threshold: f32) -> Vec<PlateRegion> {
    regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<PlateRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&region.bbox) <= iou_threshold)
        {
            kept.push(region);
        }
    }
    kept
}
