#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::PlateDetector;
use crate::detect::nms::{decode_output, non_max_suppression, DecodeOptions};
use crate::detect::result::PlateRegion;
use crate::frame::Frame;

/// YOLO-style plate detector running an ONNX model through tract.
///
/// Frames are resized to a square `input_size` input, scaled to `0..1` and fed
/// as NCHW. Boxes are mapped back to frame coordinates before suppression.
pub struct TractDetector {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    plate_class: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            plate_class: 0,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    pub fn with_plate_class(mut self, class: usize) -> Self {
        self.plate_class = class;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl PlateDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<PlateRegion>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let data: Vec<f32> = view.iter().copied().collect();

        let regions = decode_output(
            &data,
            view.shape(),
            &DecodeOptions {
                input_size: self.input_size,
                frame_width: frame.width(),
                frame_height: frame.height(),
                plate_class: self.plate_class,
                confidence_threshold: self.confidence_threshold,
            },
        )?;
        Ok(non_max_suppression(regions, self.iou_threshold))
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::<f32>::zeros((1, 3, side, side)).into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("detector warm-up failed")?;
        Ok(())
    }
}
