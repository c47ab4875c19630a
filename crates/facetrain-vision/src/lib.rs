//! facetrain-vision — ONNX models and image rendering behind the
//! `facetrain-core` vision traits.
//!
//! SCRFD finds faces and their landmarks, a similarity warp aligns them to
//! 112x112, ArcFace embeds them and a DCT perceptual hash keys them.

pub mod alignment;
pub mod backend;
pub mod detector;
pub mod fingerprint;
pub mod recognizer;
pub mod render;

pub use backend::{BackendError, OnnxVision};
pub use render::PngRenderer;
