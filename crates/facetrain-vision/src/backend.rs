//! ONNX-backed [`Vision`] implementation.

use crate::alignment::align_face;
use crate::detector::{DetectorError, FaceDetector};
use crate::fingerprint::phash;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use facetrain_core::{AlignedFace, BoundingBox, Embedding, Fingerprint, Frame, Vision, VisionError};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// SCRFD detection, similarity alignment, ArcFace embedding and pHash keys.
pub struct OnnxVision {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxVision {
    pub fn load(
        detector_path: &Path,
        recognizer_path: &Path,
        detect_threshold: f32,
        dim: usize,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path, detect_threshold)?,
            recognizer: FaceRecognizer::load(recognizer_path, dim)?,
        })
    }
}

impl Vision for OnnxVision {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
        self.detector
            .detect(frame)
            .map_err(|e| VisionError::Detection(e.to_string()))
    }

    fn align(&self, frame: &Frame, face: &BoundingBox) -> Option<AlignedFace> {
        align_face(frame, face)
    }

    fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, VisionError> {
        self.recognizer
            .embed(face)
            .map_err(|e| VisionError::Embedding(e.to_string()))
    }

    fn fingerprint(&self, face: &AlignedFace) -> Fingerprint {
        phash(face)
    }
}
