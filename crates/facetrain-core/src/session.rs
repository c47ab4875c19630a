//! Per-connection session: owns the observation cache, the person registry,
//! the classifier and the training/recognition mode, and turns client
//! messages into state changes and outgoing events.
//!
//! Messages are handled one at a time to completion. Retraining is
//! synchronous: once a handler returns, the classifier reflects every
//! mutation made so far.

use crate::balancer::balance;
use crate::cache::EmbeddingCache;
use crate::classifier::{ClassifierManager, TrainError};
use crate::frame::Frame;
use crate::pipeline::{self, FrameTask};
use crate::pool::UnknownPool;
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage, StoredImage};
use crate::registry::PersonRegistry;
use crate::types::{Embedding, Fingerprint, Label};
use crate::vision::{Renderer, Vision};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// New faces are recorded under the client-supplied label.
    Training,
    /// New faces are classified and not stored.
    Recognizing,
}

pub struct Session<V, R> {
    cache: EmbeddingCache,
    people: PersonRegistry,
    classifier: ClassifierManager,
    pool: Arc<UnknownPool>,
    mode: Mode,
    vision: V,
    renderer: R,
}

impl<V: Vision, R: Renderer> Session<V, R> {
    /// New session in training mode. The embedding dimension is the pool's.
    pub fn new(pool: Arc<UnknownPool>, vision: V, renderer: R) -> Self {
        let dim = pool.dim();
        Self {
            cache: EmbeddingCache::new(dim),
            people: PersonRegistry::new(),
            classifier: ClassifierManager::new(dim),
            pool,
            mode: Mode::Training,
            vision,
            renderer,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn people(&self) -> &PersonRegistry {
        &self.people
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.is_trained()
    }

    /// How many times the classifier has been retrained.
    pub fn classifier_generation(&self) -> u64 {
        self.classifier.generation()
    }

    /// Parse and handle one raw text message. Unknown or malformed messages
    /// are logged and dropped.
    pub fn handle_text(&mut self, raw: &str) -> Vec<ServerMessage> {
        match ClientMessage::from_json(raw) {
            Ok(msg) => self.handle(msg),
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::warn!(kind = %kind, "unknown message type ignored");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "message dropped");
                Vec::new()
            }
        }
    }

    pub fn handle(&mut self, msg: ClientMessage) -> Vec<ServerMessage> {
        tracing::debug!(kind = msg.kind(), "handling message");
        match msg {
            ClientMessage::AllState {
                images,
                training,
                people,
            } => {
                self.load_state(images, training, people);
                Vec::new()
            }
            ClientMessage::Null => vec![ServerMessage::Null],
            ClientMessage::Frame { frame, label } => {
                let mut out = match Frame::from_data_url(&frame) {
                    Ok(frame) => self.process_frame(&frame, label),
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable frame skipped");
                        Vec::new()
                    }
                };
                out.push(ServerMessage::Processed);
                out
            }
            ClientMessage::Training { val } => {
                self.set_training(val);
                Vec::new()
            }
            ClientMessage::AddPerson { name } => {
                let label = self.people.add(name);
                tracing::info!(%label, people = self.people.len(), "person added");
                self.retrain_if_recognizing();
                Vec::new()
            }
            ClientMessage::UpdateIdentity { fingerprint, label } => {
                self.update_identity(&fingerprint, label);
                Vec::new()
            }
            ClientMessage::RemoveImage { fingerprint } => {
                self.remove_image(&fingerprint);
                Vec::new()
            }
            ClientMessage::ReqVisualization { people } => self.visualization(people),
        }
    }

    /// Run the frame pipeline in the current mode and collect its events.
    pub fn process_frame(&mut self, frame: &Frame, label: Label) -> Vec<ServerMessage> {
        let task = match self.mode {
            Mode::Training => FrameTask::Train { label },
            Mode::Recognizing => FrameTask::Recognize,
        };
        let report = pipeline::process_frame(
            &mut self.vision,
            &mut self.cache,
            &self.classifier,
            frame,
            task,
        );
        tracing::debug!(
            detected = report.detected,
            processed = report.faces.len(),
            skipped = report.skipped,
            "frame processed"
        );

        let mut out: Vec<ServerMessage> = report
            .new_observations
            .into_iter()
            .map(|new| ServerMessage::NewObservation {
                fingerprint: new.fingerprint,
                preview: new.preview,
                label: new.label,
                embedding: new.embedding,
            })
            .collect();

        if task == FrameTask::Recognize {
            out.push(ServerMessage::Identities {
                identities: report.identities,
            });
            match self.renderer.annotate(frame, &report.faces, &self.people) {
                Ok(content) => out.push(ServerMessage::Annotated { content }),
                Err(e) => tracing::warn!(error = %e, "frame annotation failed"),
            }
        }
        out
    }

    fn load_state(&mut self, images: Vec<StoredImage>, training: bool, people: Vec<String>) {
        let dim = self.cache.dim();
        let mut validated = Vec::with_capacity(images.len());
        for image in images {
            match Embedding::with_dim(image.embedding, dim) {
                Ok(embedding) => validated.push((image.fingerprint, embedding, image.label)),
                Err(e) => {
                    tracing::warn!(fingerprint = %image.fingerprint, error = %e, "ALL_STATE dropped");
                    return;
                }
            }
        }

        let mut loaded = 0;
        for (fingerprint, embedding, label) in validated {
            match self.cache.insert(fingerprint, embedding, label) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(error = %e, "ALL_STATE: keeping first observation"),
            }
        }
        for name in people {
            self.people.add(name);
        }
        self.mode = if training { Mode::Training } else { Mode::Recognizing };

        tracing::info!(
            loaded,
            cached = self.cache.len(),
            people = self.people.len(),
            mode = ?self.mode,
            "state loaded"
        );
        self.retrain_if_recognizing();
    }

    fn set_training(&mut self, training: bool) {
        let previous = self.mode;
        self.mode = if training { Mode::Training } else { Mode::Recognizing };
        tracing::info!(from = ?previous, to = ?self.mode, "mode set");
        if !training {
            self.retrain();
        }
    }

    fn update_identity(&mut self, fingerprint: &Fingerprint, label: Label) {
        match self.cache.set_label(fingerprint, label) {
            Ok(()) => {
                tracing::debug!(%fingerprint, %label, "identity updated");
                self.retrain_if_recognizing();
            }
            Err(e) => tracing::warn!(error = %e, "UPDATE_IDENTITY ignored"),
        }
    }

    fn remove_image(&mut self, fingerprint: &Fingerprint) {
        match self.cache.remove(fingerprint) {
            Ok(_) => {
                tracing::debug!(%fingerprint, cached = self.cache.len(), "image removed");
                self.retrain_if_recognizing();
            }
            Err(e) => tracing::warn!(error = %e, "REMOVE_IMAGE ignored"),
        }
    }

    fn retrain_if_recognizing(&mut self) {
        if self.mode == Mode::Recognizing {
            self.retrain();
        }
    }

    fn retrain(&mut self) {
        tracing::info!(
            observations = self.cache.len(),
            generation = self.classifier.generation() + 1,
            "retraining classifier"
        );
        match self.classifier.train(self.cache.observations(), &self.pool) {
            Ok(summary) => tracing::info!(
                samples = summary.samples,
                classes = summary.classes,
                augmented = summary.augmented,
                "classifier trained"
            ),
            Err(TrainError::InsufficientData) => {
                tracing::info!("no identified observations; recognition reports unknown")
            }
            Err(e) => tracing::warn!(error = %e, "retrain failed; classifier cleared"),
        }
    }

    fn visualization(&self, people: Vec<String>) -> Vec<ServerMessage> {
        let Some(set) = balance(self.cache.observations(), &self.pool) else {
            tracing::info!("visualization skipped: no identified observations");
            return Vec::new();
        };

        let requested;
        let names = if people.is_empty() {
            &self.people
        } else {
            requested = PersonRegistry::from_names(people);
            &requested
        };

        match self.renderer.scatter(&set, names) {
            Ok(content) => vec![ServerMessage::VisualizationData { content }],
            Err(e) => {
                tracing::warn!(error = %e, "visualization failed");
                Vec::new()
            }
        }
    }
}
