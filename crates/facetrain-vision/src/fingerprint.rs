//! Perceptual hash of aligned crops, used as the observation key.
//!
//! DCT pHash: downsample to 32x32, take the 8x8 lowest-frequency DCT
//! coefficients and threshold them at their median. The 64 bits are rendered
//! as 16 hex characters, row-major, most significant bit first.

use facetrain_core::{AlignedFace, Fingerprint};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::f64::consts::PI;

const SAMPLE_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

pub fn phash(face: &AlignedFace) -> Fingerprint {
    let small = GrayImage::from_raw(face.size, face.size, face.pixels.clone())
        .map(|img| imageops::resize(&img, SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Lanczos3))
        .unwrap_or_else(|| GrayImage::new(SAMPLE_SIZE as u32, SAMPLE_SIZE as u32));

    let pixels: Vec<f64> = small.as_raw().iter().map(|&p| f64::from(p)).collect();
    let low = low_frequencies(&pixels);

    let mut sorted = low.clone();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    Fingerprint::new(to_hex(low.iter().map(|&c| c > median)))
}

/// Top-left `HASH_SIZE`² block of the 2-D DCT-II of a `SAMPLE_SIZE`² image.
fn low_frequencies(pixels: &[f64]) -> Vec<f64> {
    let n = SAMPLE_SIZE;
    let basis: Vec<f64> = (0..HASH_SIZE)
        .flat_map(|k| (0..n).map(move |i| (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos()))
        .collect();

    // Rows first, then columns; only the low-frequency outputs are needed.
    let mut rows = vec![0.0; n * HASH_SIZE];
    for y in 0..n {
        for u in 0..HASH_SIZE {
            rows[y * HASH_SIZE + u] = (0..n).map(|x| pixels[y * n + x] * basis[u * n + x]).sum();
        }
    }

    let mut out = vec![0.0; HASH_SIZE * HASH_SIZE];
    for v in 0..HASH_SIZE {
        for u in 0..HASH_SIZE {
            out[v * HASH_SIZE + u] = (0..n).map(|y| rows[y * HASH_SIZE + u] * basis[v * n + y]).sum();
        }
    }
    out
}

fn to_hex(bits: impl Iterator<Item = bool>) -> String {
    let mut hex = String::with_capacity(HASH_SIZE * HASH_SIZE / 4);
    let mut nibble = 0u8;
    for (i, bit) in bits.enumerate() {
        nibble = (nibble << 1) | u8::from(bit);
        if i % 4 == 3 {
            hex.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
            nibble = 0;
        }
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(f: impl Fn(usize, usize) -> u8) -> AlignedFace {
        let size = 112usize;
        let pixels = (0..size * size).map(|i| f(i % size, i / size)).collect();
        AlignedFace { pixels, size: 112 }
    }

    #[test]
    fn test_to_hex_packs_msb_first() {
        let bits = [true, false, false, false, false, false, false, true];
        assert_eq!(to_hex(bits.into_iter()), "81");
    }

    #[test]
    fn test_phash_shape_and_determinism() {
        let face = crop(|x, y| ((x * 3 + y * 5) % 256) as u8);
        let a = phash(&face);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(a, phash(&face.clone()));
    }

    #[test]
    fn test_phash_separates_mirrored_gradients() {
        let ramp = phash(&crop(|x, _| (x * 2) as u8));
        let reversed = phash(&crop(|x, _| (255 - x * 2) as u8));
        assert_ne!(ramp, reversed);
    }
}
