//! JSON message vocabulary between the browser client and a session.
//!
//! Every message is an object tagged by `type`. Field aliases accept the
//! names used by the legacy browser client (`hash`, `representation`,
//! `identity`, `dataURL`, ...).

use crate::types::{Embedding, Fingerprint, Label, Preview};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every `type` tag [`ClientMessage`] accepts, aliases included.
const CLIENT_TYPES: &[&str] = &[
    "ALL_STATE",
    "NULL",
    "FRAME",
    "TRAINING",
    "ADD_PERSON",
    "UPDATE_IDENTITY",
    "REMOVE_IMAGE",
    "REQ_VISUALIZATION",
    "REQ_TSNE",
];

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// A previously observed face, as replayed by the client on reconnect.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredImage {
    #[serde(alias = "hash")]
    pub fingerprint: Fingerprint,
    #[serde(alias = "representation")]
    pub embedding: Vec<f32>,
    #[serde(alias = "identity")]
    pub label: Label,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Bulk state load: observations, mode and people.
    AllState {
        images: Vec<StoredImage>,
        training: bool,
        #[serde(default)]
        people: Vec<String>,
    },
    /// Keep-alive.
    Null,
    Frame {
        #[serde(alias = "dataURL")]
        frame: String,
        /// Label given to new faces while training.
        #[serde(alias = "identity", default = "unknown_label")]
        label: Label,
    },
    Training {
        val: bool,
    },
    AddPerson {
        #[serde(alias = "val")]
        name: String,
    },
    UpdateIdentity {
        #[serde(alias = "hash")]
        fingerprint: Fingerprint,
        #[serde(alias = "idx")]
        label: Label,
    },
    RemoveImage {
        #[serde(alias = "hash")]
        fingerprint: Fingerprint,
    },
    #[serde(alias = "REQ_TSNE")]
    ReqVisualization {
        #[serde(default)]
        people: Vec<String>,
    },
}

fn unknown_label() -> Label {
    Label::UNKNOWN
}

impl ClientMessage {
    /// Parse one text frame, telling unknown types apart from malformed ones.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing string field `type`".into()))?;
        if !CLIENT_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Tag name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AllState { .. } => "ALL_STATE",
            Self::Null => "NULL",
            Self::Frame { .. } => "FRAME",
            Self::Training { .. } => "TRAINING",
            Self::AddPerson { .. } => "ADD_PERSON",
            Self::UpdateIdentity { .. } => "UPDATE_IDENTITY",
            Self::RemoveImage { .. } => "REMOVE_IMAGE",
            Self::ReqVisualization { .. } => "REQ_VISUALIZATION",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Null,
    /// Acknowledges a `FRAME`.
    Processed,
    NewObservation {
        fingerprint: Fingerprint,
        preview: Preview,
        label: Label,
        embedding: Embedding,
    },
    Identities {
        identities: Vec<Label>,
    },
    /// Frame with recognized faces outlined, as a `data:` URL.
    Annotated {
        content: String,
    },
    VisualizationData {
        content: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_state_legacy_fields() {
        let raw = r#"{
            "type": "ALL_STATE",
            "images": [{"hash": "abc", "representation": [0.5, 0.25], "identity": 1}],
            "training": false,
            "people": ["alice", "bob"]
        }"#;
        match ClientMessage::from_json(raw).unwrap() {
            ClientMessage::AllState { images, training, people } => {
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].fingerprint.as_str(), "abc");
                assert_eq!(images[0].embedding, vec![0.5, 0.25]);
                assert_eq!(images[0].label, Label::person(1));
                assert!(!training);
                assert_eq!(people, vec!["alice", "bob"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_frame_defaults_label_to_unknown() {
        let msg = ClientMessage::from_json(r#"{"type": "FRAME", "dataURL": "data:image/jpeg;base64,"}"#)
            .unwrap();
        assert!(matches!(msg, ClientMessage::Frame { label, .. } if label == Label::UNKNOWN));
    }

    #[test]
    fn test_parse_update_identity_aliases() {
        let msg = ClientMessage::from_json(r#"{"type": "UPDATE_IDENTITY", "hash": "f0", "idx": 3}"#).unwrap();
        match msg {
            ClientMessage::UpdateIdentity { fingerprint, label } => {
                assert_eq!(fingerprint.as_str(), "f0");
                assert_eq!(label, Label::person(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_tsne_alias() {
        let msg = ClientMessage::from_json(r#"{"type": "REQ_TSNE", "people": ["a"]}"#).unwrap();
        assert_eq!(msg.kind(), "REQ_VISUALIZATION");
    }

    #[test]
    fn test_unknown_type() {
        let err = ClientMessage::from_json(r#"{"type": "SELF_DESTRUCT"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(t) if t == "SELF_DESTRUCT"));
    }

    #[test]
    fn test_malformed_messages() {
        for raw in [
            "not json",
            r#"{"val": true}"#,
            r#"{"type": "TRAINING"}"#,
            r#"{"type": "TRAINING", "val": "yes"}"#,
            r#"{"type": "UPDATE_IDENTITY", "fingerprint": "f", "label": -7}"#,
        ] {
            let err = ClientMessage::from_json(raw).unwrap_err();
            assert!(matches!(err, ProtocolError::Malformed(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_server_message_encoding() {
        let json = ServerMessage::Identities {
            identities: vec![Label::UNKNOWN, Label::person(0)],
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"IDENTITIES","identities":[-1,0]}"#);

        let json = ServerMessage::Processed.to_json().unwrap();
        assert_eq!(json, r#"{"type":"PROCESSED"}"#);
    }
}
