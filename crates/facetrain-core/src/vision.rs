//! Interfaces to the vision models and the diagnostic renderer.
//!
//! The session never runs a model itself; it is handed implementations of
//! these traits. `facetrain-vision` provides the ONNX-backed ones.

use crate::balancer::TrainingSet;
use crate::frame::Frame;
use crate::registry::PersonRegistry;
use crate::types::{AlignedFace, BoundingBox, Embedding, Fingerprint, Label};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vision backend unavailable")]
    Unavailable,
}

/// Detection, alignment, embedding and fingerprinting of faces.
pub trait Vision {
    /// All faces in `frame`, in any order.
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError>;

    /// Canonical crop of one detected face; `None` if it cannot be aligned.
    fn align(&self, frame: &Frame, face: &BoundingBox) -> Option<AlignedFace>;

    fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, VisionError>;

    /// Deterministic, content-derived key for an aligned crop.
    fn fingerprint(&self, face: &AlignedFace) -> Fingerprint;
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("nothing to render")]
    Empty,
    #[error("image encoding failed: {0}")]
    Encode(String),
}

/// A processed face and the identity it was given.
#[derive(Debug, Clone)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    pub label: Label,
}

/// Produces encoded diagnostic images (as `data:` URLs).
pub trait Renderer {
    /// 2-D projection of a training set, colored by label.
    fn scatter(&self, set: &TrainingSet<'_>, people: &PersonRegistry) -> Result<String, RenderError>;

    /// Copy of `frame` with each face outlined.
    fn annotate(
        &self,
        frame: &Frame,
        faces: &[FaceAnnotation],
        people: &PersonRegistry,
    ) -> Result<String, RenderError>;
}
