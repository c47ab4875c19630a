//! Per-frame processing: detect → align → fingerprint → cache lookup →
//! (embed | reuse) → (record | classify).

use crate::cache::EmbeddingCache;
use crate::classifier::ClassifierManager;
use crate::frame::Frame;
use crate::types::{Embedding, Fingerprint, Label, Preview};
use crate::vision::{FaceAnnotation, Vision};

/// What to do with faces that are not yet cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTask {
    /// Record them under the given label.
    Train { label: Label },
    /// Classify them without storing.
    Recognize,
}

/// A face seen for the first time in training mode.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub fingerprint: Fingerprint,
    pub preview: Preview,
    pub label: Label,
    pub embedding: Embedding,
}

#[derive(Debug, Default)]
pub struct FrameReport {
    /// Bounding boxes returned by the detector.
    pub detected: usize,
    /// Faces that made it through alignment (and embedding, on a miss).
    pub faces: Vec<FaceAnnotation>,
    pub new_observations: Vec<NewObservation>,
    /// Distinct labels recognized this frame, first-seen order. Empty in training mode.
    ///
    /// Includes the stored label of faces answered from the cache, not only
    /// those that went through the classifier: a cached face is recognized as
    /// whatever it is labeled.
    pub identities: Vec<Label>,
    pub skipped: usize,
}

/// Run every detected face in `frame` through the pipeline.
///
/// A face that cannot be aligned or embedded is skipped; it never fails the
/// frame. A detector error is reported as a frame with no faces.
pub fn process_frame<V: Vision + ?Sized>(
    vision: &mut V,
    cache: &mut EmbeddingCache,
    classifier: &ClassifierManager,
    frame: &Frame,
    task: FrameTask,
) -> FrameReport {
    let mut report = FrameReport::default();

    let boxes = match vision.detect_faces(frame) {
        Ok(boxes) => boxes,
        Err(e) => {
            tracing::warn!(error = %e, "detection failed; frame yields no faces");
            return report;
        }
    };
    report.detected = boxes.len();

    for bbox in boxes {
        let Some(aligned) = vision.align(frame, &bbox) else {
            tracing::debug!(x = bbox.x, y = bbox.y, "unalignable face skipped");
            report.skipped += 1;
            continue;
        };

        let fingerprint = vision.fingerprint(&aligned);

        let label = if let Some(obs) = cache.lookup(&fingerprint) {
            tracing::trace!(%fingerprint, label = %obs.label, "cache hit");
            obs.label
        } else {
            let embedding = match vision.embed(&aligned) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(%fingerprint, error = %e, "embedding failed; face skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            if let Err(e) = embedding.check_dim(cache.dim()) {
                tracing::warn!(%fingerprint, error = %e, "embedder output rejected; face skipped");
                report.skipped += 1;
                continue;
            }

            match task {
                FrameTask::Train { label } => {
                    if let Err(e) = cache.insert(fingerprint.clone(), embedding.clone(), label) {
                        tracing::warn!(%fingerprint, error = %e, "cache insert failed; face skipped");
                        report.skipped += 1;
                        continue;
                    }
                    tracing::debug!(%fingerprint, %label, "new observation");
                    report.new_observations.push(NewObservation {
                        fingerprint,
                        preview: aligned.preview(),
                        label,
                        embedding,
                    });
                    label
                }
                // Not cached: an unlabeled face only persists once seen in training mode.
                FrameTask::Recognize => classifier.predict(&embedding),
            }
        };

        if task == FrameTask::Recognize && !report.identities.contains(&label) {
            report.identities.push(label);
        }
        report.faces.push(FaceAnnotation { bbox, label });
    }

    report
}
