#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GrayImage;
use tract_onnx::prelude::*;

use crate::ocr::ctc::greedy_decode;
use crate::ocr::{Recognition, TextRecognizer};

/// CRNN plate recognizer running an ONNX model through tract.
///
/// Input is the plate crop resized to `input_width` x `input_height`, one
/// channel scaled to `0..1`. Output is a `[steps, alphabet + 1]` score matrix
/// (any extra unit axes are ignored, and `[classes, steps]` is transposed),
/// decoded with greedy CTC.
pub struct TractRecognizer {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    alphabet: Vec<char>,
    input_width: u32,
    input_height: u32,
}

impl TractRecognizer {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        alphabet: &str,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 1, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            alphabet: alphabet.chars().collect(),
            input_width,
            input_height,
        })
    }

    fn build_input(&self, plate: &GrayImage) -> Tensor {
        let resized =
            image::imageops::resize(plate, self.input_width, self.input_height, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 1, self.input_height as usize, self.input_width as usize),
            |(_, _, y, x)| resized.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl TextRecognizer for TractRecognizer {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn recognize(&mut self, plate: &GrayImage) -> Result<Option<Recognition>> {
        if plate.width() == 0 || plate.height() == 0 {
            return Ok(None);
        }
        let input = self.build_input(plate);
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

        let classes = self.alphabet.len() + 1;
        let dims: Vec<usize> = view.shape().iter().copied().filter(|&d| d != 1).collect();
        let scores: Vec<f32> = match dims.as_slice() {
            [_, c] if *c == classes => view.iter().copied().collect(),
            [c, steps] if *c == classes => {
                let flat: Vec<f32> = view.iter().copied().collect();
                (0..*steps)
                    .flat_map(|t| (0..classes).map(move |k| (t, k)))
                    .map(|(t, k)| flat[k * steps + t])
                    .collect()
            }
            _ => {
                return Err(anyhow!(
                    "recognizer output shape {:?} does not fit {} classes",
                    view.shape(),
                    classes
                ))
            }
        };
        Ok(greedy_decode(&scores, classes, &self.alphabet))
    }
}
