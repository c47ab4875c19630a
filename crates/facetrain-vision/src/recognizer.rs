//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns an aligned 112x112 crop into an L2-normalized embedding.

use crate::alignment::ALIGNED_SIZE;
use facetrain_core::{AlignedFace, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
// ArcFace normalizes symmetrically, unlike SCRFD.
const ARCFACE_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("aligned face is {0}x{0}, expected 112x112")]
    WrongCropSize(u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
    dim: usize,
}

impl FaceRecognizer {
    /// Load the ArcFace model. Every embedding it produces must have `dim` components.
    pub fn load(model_path: &Path, dim: usize) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            outputs = ?session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            dim,
            "loaded ArcFace model"
        );

        Ok(Self { session, dim })
    }

    pub fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, RecognizerError> {
        if face.size != ALIGNED_SIZE {
            return Err(RecognizerError::WrongCropSize(face.size));
        }
        let input = preprocess(face);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != self.dim {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                self.dim,
                raw.len()
            )));
        }
        Ok(Embedding::from_values(l2_normalize(raw)))
    }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

/// Grayscale crop → 1x3xSxS tensor, luma replicated across channels.
fn preprocess(face: &AlignedFace) -> Array4<f32> {
    let size = face.size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = face.pixels.get(y * size + x).copied().unwrap_or(0) as f32;
            let v = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
            for c in 0..3 {
                tensor[[0, c, y, x]] = v;
            }
        }
    }
    tensor
}
