//! facetrain-core — live face-identification sessions.
//!
//! Deduplicates face observations by content fingerprint, balances the
//! labeled set against a pool of unidentified embeddings, retrains an RBF SVM
//! on every change while recognizing, and drives all of it from a closed set
//! of client messages.

pub mod balancer;
pub mod cache;
pub mod classifier;
pub mod frame;
pub mod pipeline;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod types;
pub mod vision;

pub use cache::{CacheError, EmbeddingCache};
pub use classifier::{ClassifierManager, TrainError};
pub use frame::{Frame, FrameError};
pub use pool::{PoolError, PoolFile, UnknownPool};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use registry::PersonRegistry;
pub use session::{Mode, Session};
pub use types::{AlignedFace, BoundingBox, Embedding, Fingerprint, Label, Observation, Preview};
pub use vision::{FaceAnnotation, RenderError, Renderer, Vision, VisionError};
