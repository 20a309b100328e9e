// Duplicate Matcher (C5): hash prefilter (done by the catalog gateway) plus
// rotation-invariant MSE confirmation for images, exact-hash confirmation
// for movies.

use rayon::prelude::*;

use crate::constants::{TENSOR_BYTE_LEN, TENSOR_WIDTH};

/// One `ImageTensor` row fetched by the prefilter query.
#[derive(Debug, Clone)]
pub struct CandidateImage {
    pub filename: String,
    pub tensor_pil: Option<Vec<u8>>,
    pub tensor_cv2: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub filename: String,
    pub mse: f64,
}

/// Rotates a square WxWx3 row-major buffer 90 degrees clockwise.
fn rotate90(buf: &[u8], side: usize, channels: usize) -> Vec<u8> {
    let mut out = vec![0u8; buf.len()];
    for y in 0..side {
        for x in 0..side {
            let src = (y * side + x) * channels;
            let dst_y = x;
            let dst_x = side - 1 - y;
            let dst = (dst_y * side + dst_x) * channels;
            out[dst..dst + channels].copy_from_slice(&buf[src..src + channels]);
        }
    }
    out
}

fn mse(a: &[u8], b: &[u8]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum / a.len() as f64
}

/// Minimum MSE between `fixed` and `candidate` over the four 90-degree
/// rotations of `candidate`. Never rotates `fixed`.
pub fn rotation_mse(fixed: &[u8], candidate: &[u8]) -> f64 {
    let side = TENSOR_WIDTH as usize;
    let mut rotated = candidate.to_vec();
    let mut min = f64::MAX;
    for _ in 0..4 {
        let m = mse(fixed, &rotated);
        if m < min {
            min = m;
        }
        rotated = rotate90(&rotated, side, 3);
    }
    min
}

/// Confirms duplicates for an incoming image among prefiltered candidates.
/// `incoming_a`/`incoming_b` are the two decoder tensors for the file being
/// processed. A↔A and B↔B only — never cross-compared. Checks tensor A
/// first; a candidate confirmed on A is reported without also checking B,
/// matching this system's original short-circuit behavior.
pub fn confirm_image_duplicates(
    incoming_a: &[u8],
    incoming_b: &[u8],
    candidates: &[CandidateImage],
    mse_threshold: f64,
    pool_size: usize,
) -> Vec<DuplicateMatch> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size.max(1))
        .build()
        .expect("failed to build duplicate-comparison thread pool");

    pool.install(|| {
        candidates
            .par_iter()
            .filter_map(|candidate| compare_one(incoming_a, incoming_b, candidate, mse_threshold))
            .collect()
    })
}

fn compare_one(incoming_a: &[u8], incoming_b: &[u8], candidate: &CandidateImage, mse_threshold: f64) -> Option<DuplicateMatch> {
    if let Some(ref tensor_pil) = candidate.tensor_pil {
        if tensor_pil.len() == TENSOR_BYTE_LEN {
            let m = rotation_mse(incoming_a, tensor_pil);
            if m <= mse_threshold {
                return Some(DuplicateMatch {
                    filename: candidate.filename.clone(),
                    mse: m,
                });
            }
        } else {
            log::error!(
                "tensor_pil byte length mismatch for {}: expected {}, got {}",
                candidate.filename,
                TENSOR_BYTE_LEN,
                tensor_pil.len()
            );
        }
    }

    if let Some(ref tensor_cv2) = candidate.tensor_cv2 {
        if tensor_cv2.len() == TENSOR_BYTE_LEN {
            let m = rotation_mse(incoming_b, tensor_cv2);
            if m <= mse_threshold {
                return Some(DuplicateMatch {
                    filename: candidate.filename.clone(),
                    mse: m,
                });
            }
        } else {
            log::error!(
                "tensor_cv2 byte length mismatch for {}: expected {}, got {}",
                candidate.filename,
                TENSOR_BYTE_LEN,
                tensor_cv2.len()
            );
        }
    }

    None
}

/// Movie matcher is exact: any candidate row returned by the hash prefilter
/// query is a duplicate.
pub fn movie_is_duplicate(candidate_count: usize) -> bool {
    candidate_count > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_tensor(value: u8) -> Vec<u8> {
        vec![value; TENSOR_BYTE_LEN]
    }

    #[test]
    fn identical_tensors_have_zero_mse() {
        let a = solid_tensor(10);
        let b = solid_tensor(10);
        assert_eq!(rotation_mse(&a, &b), 0.0);
    }

    #[test]
    fn rotation_mse_picks_minimum_over_four_rotations() {
        let side = TENSOR_WIDTH as usize;
        let mut candidate = vec![0u8; TENSOR_BYTE_LEN];
        // Put a distinguishing pixel at (0, side-1) so one rotation aligns
        // with the same pixel placed at (0,0) in `fixed`.
        candidate[((side - 1) * 3)..((side - 1) * 3 + 3)].copy_from_slice(&[255, 255, 255]);
        let mut fixed = vec![0u8; TENSOR_BYTE_LEN];
        fixed[0..3].copy_from_slice(&[255, 255, 255]);

        assert_eq!(rotation_mse(&fixed, &candidate), 0.0);
    }

    #[test]
    fn mse_at_threshold_is_inclusive() {
        let candidates = vec![CandidateImage {
            filename: "a.jpg".into(),
            tensor_pil: Some(solid_tensor(10)),
            tensor_cv2: None,
        }];
        let incoming_a = solid_tensor(11);
        let incoming_b = solid_tensor(0);
        let diff = 1.0; // (10-11)^2 averaged over identical channels = 1.0
        let matches = confirm_image_duplicates(&incoming_a, &incoming_b, &candidates, diff, 2);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].filename, "a.jpg");
    }

    #[test]
    fn mismatched_length_is_skipped_not_fatal() {
        let candidates = vec![CandidateImage {
            filename: "bad.jpg".into(),
            tensor_pil: Some(vec![0u8; 10]),
            tensor_cv2: None,
        }];
        let incoming_a = solid_tensor(0);
        let incoming_b = solid_tensor(0);
        let matches = confirm_image_duplicates(&incoming_a, &incoming_b, &candidates, 0.0, 2);
        assert!(matches.is_empty());
    }

    #[test]
    fn movie_duplicate_is_any_candidate_at_all() {
        assert!(!movie_is_duplicate(0));
        assert!(movie_is_duplicate(1));
    }
}
