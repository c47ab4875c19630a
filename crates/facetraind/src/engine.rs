//! Vision engine thread shared by every session.
//!
//! The ONNX sessions are loaded once and owned by a dedicated OS thread.
//! Session threads talk to it through [`EngineHandle`], which implements
//! [`Vision`]: detection and embedding round-trip to the engine, alignment and
//! fingerprinting run on the caller's thread.

use facetrain_core::{AlignedFace, BoundingBox, Embedding, Fingerprint, Frame, Vision, VisionError};
use facetrain_vision::{alignment, fingerprint, BackendError, OnnxVision};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

const ENGINE_QUEUE: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model load failed: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from session threads to the engine thread.
enum EngineRequest {
    Detect {
        frame: Frame,
        reply: oneshot::Sender<Result<Vec<BoundingBox>, VisionError>>,
    },
    Embed {
        face: AlignedFace,
        reply: oneshot::Sender<Result<Embedding, VisionError>>,
    },
}

/// Clone-safe handle to the engine thread. Must be used from a plain OS
/// thread, never from inside the async runtime.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, VisionError>>) -> EngineRequest,
    ) -> Result<T, VisionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(build(reply_tx))
            .map_err(|_| VisionError::Unavailable)?;
        reply_rx.blocking_recv().map_err(|_| VisionError::Unavailable)?
    }
}

impl Vision for EngineHandle {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
        let frame = frame.clone();
        self.call(|reply| EngineRequest::Detect { frame, reply })
    }

    fn align(&self, frame: &Frame, face: &BoundingBox) -> Option<AlignedFace> {
        alignment::align_face(frame, face)
    }

    fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, VisionError> {
        let face = face.clone();
        self.call(|reply| EngineRequest::Embed { face, reply })
    }

    fn fingerprint(&self, face: &AlignedFace) -> Fingerprint {
        fingerprint::phash(face)
    }
}

/// Load both ONNX models (fail-fast) and start the engine thread.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let vision = OnnxVision::load(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        config.detect_threshold,
        config.embedding_dim,
    )?;
    tracing::info!(model_dir = %config.model_dir.display(), "vision models loaded");
    start(vision)
}

/// Run `vision` on a dedicated thread until every handle is dropped.
pub fn start<V: Vision + Send + 'static>(mut vision: V) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE);

    std::thread::Builder::new()
        .name("facetrain-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { frame, reply } => {
                        let _ = reply.send(vision.detect_faces(&frame));
                    }
                    EngineRequest::Embed { face, reply } => {
                        let _ = reply.send(vision.embed(&face));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Finds no faces; embeds every crop as its first pixel repeated.
    pub(crate) struct StubVision;

    impl Vision for StubVision {
        fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, VisionError> {
            if frame.width == 0 {
                return Err(VisionError::Detection("empty frame".into()));
            }
            Ok(Vec::new())
        }

        fn align(&self, _frame: &Frame, _face: &BoundingBox) -> Option<AlignedFace> {
            None
        }

        fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, VisionError> {
            Ok(Embedding::from_values(vec![f32::from(face.pixels[0]); 2]))
        }

        fn fingerprint(&self, _face: &AlignedFace) -> Fingerprint {
            Fingerprint::new("stub")
        }
    }

    #[test]
    fn test_handle_round_trips_to_engine_thread() {
        let mut handle = start(StubVision).unwrap();
        let frame = Frame::from_gray(vec![0; 4], 2, 2).unwrap();
        assert!(handle.detect_faces(&frame).unwrap().is_empty());

        let empty = Frame::from_gray(Vec::new(), 0, 0).unwrap();
        assert!(matches!(handle.detect_faces(&empty), Err(VisionError::Detection(_))));

        let face = AlignedFace { pixels: vec![3; 4], size: 2 };
        assert_eq!(handle.embed(&face).unwrap().values(), &[3.0, 3.0]);
    }

    #[test]
    fn test_handles_share_one_engine() {
        let handle = start(StubVision).unwrap();
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let mut h = handle.clone();
                std::thread::spawn(move || {
                    let face = AlignedFace { pixels: vec![i; 1], size: 1 };
                    h.embed(&face).unwrap().values()[0]
                })
            })
            .collect();
        let mut got: Vec<f32> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        got.sort_by(f32::total_cmp);
        assert_eq!(got, vec![0.0, 1.0, 2.0, 3.0]);
    }
}
