// harness.rs — CPU reference computations, result comparison, timing.
//
// The device is never trusted on its own: every dispatch in the demos and
// GPU tests is checked against a host-side reference computing the same
// transformation. The references here are deliberately plain loops — the
// authoritative, easy-to-audit definition of what the kernels must
// produce, not an optimized CPU path.
//
// BORDER POLICY: CLAMP (REPLICATE EDGE).
// The blur reference clamps out-of-bounds sample coordinates to the
// nearest edge pixel, and the device kernel in shaders/blur_filter.wgsl
// implements the identical policy. The two must never diverge: a border
// policy mismatch shows up as spurious comparison failures confined to
// the image rim. Arithmetic is also matched bit-for-bit — u32
// accumulation, truncating division by filter_size² — so the integer
// domain compares with exact equality, no tolerance needed.
//
// TIMING:
// `time` uses std::time::Instant — a monotonic clock with nanosecond
// representation, comfortably inside the microsecond resolution that
// short elementwise dispatches need. Callers report microseconds for
// elementwise kernels and milliseconds for compute-bound image kernels.

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Elementwise i32 addition, the reference for the simple_add kernel.
/// Wrapping arithmetic, matching the device's two's-complement add.
///
/// # Panics
/// Panics if the inputs differ in length.
pub fn vector_add(a: &[i32], b: &[i32]) -> Vec<i32> {
    assert_eq!(a.len(), b.len(), "input lengths must match");
    a.iter().zip(b).map(|(&x, &y)| x.wrapping_add(y)).collect()
}

/// Mean filter over a filter_size×filter_size window, the reference for
/// the blur_filter kernel. Clamp border policy; u32 accumulation;
/// truncating division.
///
/// # Panics
/// Panics if `src` is not width×height bytes or `filter_size` is even
/// or zero.
pub fn box_blur(src: &[u8], width: usize, height: usize, filter_size: usize) -> Vec<u8> {
    assert!(width >= 1 && height >= 1, "image must be at least 1×1");
    assert_eq!(src.len(), width * height, "pixel buffer must be width×height");
    assert!(
        filter_size % 2 == 1,
        "filter size must be odd (got {filter_size})"
    );

    let half = (filter_size / 2) as isize;
    let window = (filter_size * filter_size) as u32;
    let mut out = vec![0u8; width * height];

    for y in 0..height {
        for x in 0..width {
            let mut sum: u32 = 0;
            for dy in -half..=half {
                for dx in -half..=half {
                    let sx = (x as isize + dx).clamp(0, (width - 1) as isize) as usize;
                    let sy = (y as isize + dy).clamp(0, (height - 1) as isize) as usize;
                    sum += src[sy * width + sx] as u32;
                }
            }
            out[y * width + x] = (sum / window) as u8;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pixel widening
// ---------------------------------------------------------------------------
// WGSL has no 8-bit storage type, so grayscale pixels travel as one u32
// each: widen before upload, narrow after readback. The kernel only ever
// produces values in 0..=255, so the narrowing cast is lossless.

pub fn widen_pixels(pixels: &[u8]) -> Vec<u32> {
    pixels.iter().map(|&p| p as u32).collect()
}

pub fn narrow_pixels(values: &[u32]) -> Vec<u8> {
    values.iter().map(|&v| v as u8).collect()
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Outcome of an expected-vs-actual comparison, with enough context to
/// report a useful diagnostic (index of the first divergence).
#[derive(Debug, Clone, Copy)]
pub struct CompareReport {
    pub matches: bool,
    /// Index of the first mismatching element. None when the slices
    /// matched, and also when they differ in length (nothing meaningful
    /// to point at).
    pub first_mismatch: Option<usize>,
    pub compared: usize,
}

/// Exact element-by-element equality — the comparison for integer
/// domains. Slices of different lengths never match.
pub fn verify_exact<T: PartialEq>(expected: &[T], actual: &[T]) -> CompareReport {
    if expected.len() != actual.len() {
        return CompareReport {
            matches: false,
            first_mismatch: None,
            compared: 0,
        };
    }
    let first_mismatch = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a);
    CompareReport {
        matches: first_mismatch.is_none(),
        first_mismatch,
        compared: expected.len(),
    }
}

/// Absolute-difference comparison for floating-point domains, with a
/// caller-supplied tolerance.
pub fn verify_with_tolerance(expected: &[f32], actual: &[f32], tolerance: f32) -> CompareReport {
    if expected.len() != actual.len() {
        return CompareReport {
            matches: false,
            first_mismatch: None,
            compared: 0,
        };
    }
    let first_mismatch = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| (e - a).abs() > tolerance);
    CompareReport {
        matches: first_mismatch.is_none(),
        first_mismatch,
        compared: expected.len(),
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Run `f` and measure its wall-clock duration on a monotonic clock.
pub fn time<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let started = Instant::now();
    let value = f();
    (value, started.elapsed())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_add_scenario() {
        let a: Vec<i32> = (0..10).collect();
        let b = vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
        assert_eq!(vector_add(&a, &b), vec![0, 2, 4, 3, 5, 7, 6, 8, 10, 9]);
    }

    #[test]
    fn test_vector_add_wraps() {
        assert_eq!(vector_add(&[i32::MAX], &[1]), vec![i32::MIN]);
    }

    #[test]
    fn test_box_blur_constant_image_unchanged() {
        let img = vec![100u8; 5 * 5];
        assert_eq!(box_blur(&img, 5, 5, 3), img);
    }

    #[test]
    fn test_box_blur_filter_size_one_is_identity() {
        let img: Vec<u8> = (0..12).collect();
        assert_eq!(box_blur(&img, 4, 3, 1), img);
    }

    #[test]
    fn test_box_blur_single_pixel() {
        // All window taps clamp to the only pixel.
        assert_eq!(box_blur(&[42], 1, 1, 3), vec![42]);
    }

    #[test]
    fn test_box_blur_center_mean() {
        // 3×3 image, center pixel = mean of all nine.
        let img = vec![0, 0, 0, 0, 9, 0, 0, 0, 0];
        let out = box_blur(&img, 3, 3, 3);
        assert_eq!(out[4], 1); // 9 / 9
    }

    #[test]
    fn test_box_blur_truncating_division() {
        // Sum 10 over a 9-tap window: 10 / 9 truncates to 1.
        let img = vec![0, 0, 0, 0, 10, 0, 0, 0, 0];
        let out = box_blur(&img, 3, 3, 3);
        assert_eq!(out[4], 1);
    }

    #[test]
    fn test_box_blur_clamp_border() {
        // 3×1 row [30, 60, 90], filter 3. At x=0 the window clamps the
        // out-of-bounds column to x=0, vertical taps clamp to the single
        // row: sum = 3*(30+30+60) = 360, 360/9 = 40.
        let out = box_blur(&[30, 60, 90], 3, 1, 3);
        assert_eq!(out[0], 40);
        // Interior x=1: 3*(30+60+90) = 540, 540/9 = 60.
        assert_eq!(out[1], 60);
    }

    #[test]
    #[should_panic(expected = "odd")]
    fn test_box_blur_even_filter_panics() {
        box_blur(&[0; 4], 2, 2, 2);
    }

    #[test]
    fn test_widen_narrow_round_trip() {
        let pixels: Vec<u8> = (0..=255).collect();
        assert_eq!(narrow_pixels(&widen_pixels(&pixels)), pixels);
    }

    #[test]
    fn test_verify_exact_match() {
        let report = verify_exact(&[1, 2, 3], &[1, 2, 3]);
        assert!(report.matches);
        assert_eq!(report.first_mismatch, None);
        assert_eq!(report.compared, 3);
    }

    #[test]
    fn test_verify_exact_reports_first_mismatch() {
        let report = verify_exact(&[1, 2, 3, 4], &[1, 2, 9, 4]);
        assert!(!report.matches);
        assert_eq!(report.first_mismatch, Some(2));
    }

    #[test]
    fn test_verify_exact_length_mismatch_never_matches() {
        let report = verify_exact(&[1, 2, 3], &[1, 2]);
        assert!(!report.matches);
        assert_eq!(report.first_mismatch, None);
    }

    #[test]
    fn test_verify_with_tolerance() {
        let report = verify_with_tolerance(&[1.0, 2.0], &[1.0005, 1.9995], 1e-3);
        assert!(report.matches);
        let report = verify_with_tolerance(&[1.0, 2.0], &[1.01, 2.0], 1e-3);
        assert!(!report.matches);
        assert_eq!(report.first_mismatch, Some(0));
    }

    #[test]
    fn test_time_returns_value() {
        let (v, elapsed) = time(|| 2 + 2);
        assert_eq!(v, 4);
        assert!(elapsed.as_nanos() > 0 || elapsed.is_zero()); // monotonic, non-negative
    }
}
