use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity assigned to a face: an index into the person registry, or unknown.
///
/// Serialized as a bare integer; `-1` is the unknown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Label(i32);

impl Label {
    pub const UNKNOWN: Label = Label(-1);

    /// Label referring to `registry[index]`. Indices past `i32::MAX` saturate.
    pub fn person(index: usize) -> Self {
        Label(i32::try_from(index).unwrap_or(i32::MAX))
    }

    /// Validate a raw wire value. Anything below `-1` is rejected.
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw >= -1).then_some(Label(raw))
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 < 0
    }

    /// Registry index, if this label names a person.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl TryFrom<i32> for Label {
    type Error = String;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Label::from_raw(raw).ok_or_else(|| format!("invalid label {raw}, expected -1 or an index"))
    }
}

impl From<Label> for i32 {
    fn from(label: Label) -> i32 {
        label.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "#{i}"),
            None => f.write_str("unknown"),
        }
    }
}

/// Content-derived identifier of an aligned face crop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("embedding has {actual} dimensions, expected {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Face embedding vector of a fixed, session-wide dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap `values`, checking they have exactly `dim` components.
    pub fn with_dim(values: Vec<f32>, dim: usize) -> Result<Self, DimensionMismatch> {
        if values.len() != dim {
            return Err(DimensionMismatch {
                expected: dim,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// Wrap `values` without a dimension check. Boundaries that know the
    /// session dimension call [`Embedding::check_dim`].
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn check_dim(&self, dim: usize) -> Result<(), DimensionMismatch> {
        if self.0.len() == dim {
            Ok(())
        } else {
            Err(DimensionMismatch {
                expected: dim,
                actual: self.0.len(),
            })
        }
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Square grayscale face crop in canonical position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedFace {
    /// Row-major luma pixels, `size * size` bytes.
    pub pixels: Vec<u8>,
    pub size: u32,
}

impl AlignedFace {
    /// Half-resolution copy sent to clients alongside new observations.
    pub fn preview(&self) -> Preview {
        let half = (self.size / 2).max(1);
        let pixels = image::GrayImage::from_raw(self.size, self.size, self.pixels.clone())
            .map(|img| {
                image::imageops::resize(&img, half, half, image::imageops::FilterType::Triangle)
                    .into_raw()
            })
            .unwrap_or_else(|| vec![0; (half * half) as usize]);
        Preview {
            width: half,
            height: half,
            pixels,
        }
    }
}

/// Reduced-resolution grayscale thumbnail of an aligned face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A stored (embedding, label) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub embedding: Embedding,
    pub label: Label,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_unknown_sentinel() {
        assert!(Label::UNKNOWN.is_unknown());
        assert_eq!(Label::UNKNOWN.raw(), -1);
        assert_eq!(Label::UNKNOWN.index(), None);
        assert_eq!(Label::person(3).index(), Some(3));
    }

    #[test]
    fn test_label_person_saturates() {
        let huge = Label::person(usize::MAX);
        assert_eq!(huge.raw(), i32::MAX);
        assert!(!huge.is_unknown());
    }

    #[test]
    fn test_label_from_raw_rejects_below_sentinel() {
        assert_eq!(Label::from_raw(-1), Some(Label::UNKNOWN));
        assert_eq!(Label::from_raw(0), Some(Label::person(0)));
        assert_eq!(Label::from_raw(-2), None);
    }

    #[test]
    fn test_label_wire_format() {
        assert_eq!(serde_json::to_string(&Label::UNKNOWN).unwrap(), "-1");
        let l: Label = serde_json::from_str("2").unwrap();
        assert_eq!(l, Label::person(2));
        assert!(serde_json::from_str::<Label>("-5").is_err());
    }

    #[test]
    fn test_embedding_dimension_check() {
        assert!(Embedding::with_dim(vec![0.0; 4], 4).is_ok());
        let err = Embedding::with_dim(vec![0.0; 3], 4).unwrap_err();
        assert_eq!(err, DimensionMismatch { expected: 4, actual: 3 });
        assert!(Embedding::from_values(vec![1.0]).check_dim(2).is_err());
    }

    #[test]
    fn test_preview_is_half_resolution() {
        let face = AlignedFace { pixels: vec![200; 112 * 112], size: 112 };
        let preview = face.preview();
        assert_eq!((preview.width, preview.height), (56, 56));
        assert_eq!(preview.pixels.len(), 56 * 56);
        assert!(preview.pixels.iter().all(|p| (199..=201).contains(p)));
    }
}
