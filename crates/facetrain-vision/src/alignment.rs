//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face so its five landmarks land on the ArcFace reference
//! positions of a 112x112 crop.

use facetrain_core::{AlignedFace, BoundingBox, Frame};

/// ArcFace reference landmarks for a 112x112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Below this spread the landmarks do not determine a transform.
const MIN_LANDMARK_SPREAD: f32 = 1e-3;

/// Similarity transform `dst = [a -b; b a] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit from `src` to `dst`, in closed form.
    ///
    /// `None` when the source points coincide or the fitted scale is zero.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut spread = 0.0;
        let mut dot = 0.0;
        let mut cross = 0.0;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }
        if !spread.is_finite() || spread < MIN_LANDMARK_SPREAD {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        if !(a * a + b * b).is_normal() {
            return None;
        }
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    fn inverse(&self) -> Self {
        let det = self.a * self.a + self.b * self.b;
        let (a, b) = (self.a / det, -self.b / det);
        Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        }
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }
}

/// Inverse-map every output pixel into `frame`, sampling bilinearly.
/// Pixels that fall outside the frame are black.
fn warp(frame: &Frame, to_source: &Similarity, out_size: u32) -> Vec<u8> {
    let (w, h) = (frame.width as i64, frame.height as i64);
    let sample = |x: i64, y: i64| -> f32 {
        if (0..w).contains(&x) && (0..h).contains(&y) {
            frame.data[(y * w + x) as usize] as f32
        } else {
            0.0
        }
    };

    let size = out_size as usize;
    let mut out = vec![0u8; size * size];
    for oy in 0..size {
        for ox in 0..size {
            let (sx, sy) = to_source.apply((ox as f32, oy as f32));
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);

            let v = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;
            out[oy * size + ox] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Canonical 112x112 crop of `face`, or `None` if it has no landmarks or they
/// do not determine a transform.
pub fn align_face(frame: &Frame, face: &BoundingBox) -> Option<AlignedFace> {
    let landmarks = face.landmarks.as_ref()?;
    let to_reference = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    Some(AlignedFace {
        pixels: warp(frame, &to_reference.inverse(), ALIGNED_SIZE),
        size: ALIGNED_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_with(landmarks: Option<[(f32, f32); 5]>) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
            landmarks,
        }
    }

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = Similarity::estimate(&pts, &pts).unwrap();
        assert!((m.a - 1.0).abs() < 1e-4, "a = {}", m.a);
        assert!(m.b.abs() < 1e-4, "b = {}", m.b);
        assert!(m.tx.abs() < 1e-3 && m.ty.abs() < 1e-3);
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0 + 10.0, y * 2.0));
        let m = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((m.a - 0.5).abs() < 1e-4, "a = {}", m.a);
        assert!((m.tx + 5.0).abs() < 1e-2, "tx = {}", m.tx);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Similarity {
            a: 0.8,
            b: 0.3,
            tx: 4.0,
            ty: -2.0,
        };
        let (x, y) = m.inverse().apply(m.apply((17.0, 42.0)));
        assert!((x - 17.0).abs() < 1e-3 && (y - 42.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_landmarks_are_rejected() {
        let frame = Frame::from_gray(vec![0; 64], 8, 8).unwrap();
        assert!(align_face(&frame, &face_with(Some([(5.0, 5.0); 5]))).is_none());
        assert!(align_face(&frame, &face_with(None)).is_none());
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = Frame::from_gray(vec![128; 640 * 480], 640, 480).unwrap();
        let aligned = align_face(&frame, &face_with(Some(REFERENCE_LANDMARKS_112))).unwrap();
        assert_eq!(aligned.size, ALIGNED_SIZE);
        assert_eq!(aligned.pixels.len(), 112 * 112);
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let (w, h) = (200usize, 200usize);
        let mut data = vec![0u8; w * h];
        let src: [(f32, f32); 5] = [(80.0, 60.0), (120.0, 60.0), (100.0, 85.0), (85.0, 110.0), (115.0, 110.0)];

        // 5x5 bright patch on the left eye.
        let (lx, ly) = (src[0].0 as usize, src[0].1 as usize);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                data[y * w + x] = 255;
            }
        }
        let frame = Frame::from_gray(data, w as u32, h as u32).unwrap();
        let aligned = align_face(&frame, &face_with(Some(src))).unwrap();

        let (rx, ry) = (
            REFERENCE_LANDMARKS_112[0].0.round() as usize,
            REFERENCE_LANDMARKS_112[0].1.round() as usize,
        );
        let max_val = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned.pixels[y * 112 + x])
            .max()
            .unwrap();
        assert!(max_val > 100, "no bright patch near ({rx}, {ry}): max {max_val}");
    }
}
