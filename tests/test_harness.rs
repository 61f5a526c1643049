// tests/test_harness.rs — Integration tests for the CPU references and
// the comparison/timing helpers.
//
// These run with `cargo test --test test_harness` and need no compute
// device: the harness side of the crate is pure host code, which is the
// point — it is the authority the device results are judged against.

use workgrid::harness::{
    box_blur, narrow_pixels, time, vector_add, verify_exact, verify_with_tolerance, widen_pixels,
};

// ===== vector_add =====

#[test]
fn vector_add_known_scenario() {
    // The canonical ten-element probe.
    let a: Vec<i32> = (0..10).collect();
    let b = vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
    assert_eq!(vector_add(&a, &b), vec![0, 2, 4, 3, 5, 7, 6, 8, 10, 9]);
}

#[test]
fn vector_add_single_element() {
    assert_eq!(vector_add(&[-7], &[3]), vec![-4]);
}

#[test]
fn vector_add_negative_values() {
    // The demo's value range is [-10, 8]; make sure signs behave.
    let a = vec![-10, -1, 8];
    let b = vec![8, 1, -10];
    assert_eq!(vector_add(&a, &b), vec![-2, 0, -2]);
}

#[test]
#[should_panic(expected = "lengths must match")]
fn vector_add_length_mismatch_panics() {
    vector_add(&[1, 2], &[1]);
}

// ===== box_blur =====

#[test]
fn box_blur_constant_stays_constant() {
    let img = vec![77u8; 8 * 8];
    assert_eq!(box_blur(&img, 8, 8, 5), img);
}

#[test]
fn box_blur_minimum_image() {
    // 1×1 image: every tap clamps to the one pixel, any odd filter size.
    assert_eq!(box_blur(&[200], 1, 1, 1), vec![200]);
    assert_eq!(box_blur(&[200], 1, 1, 5), vec![200]);
}

#[test]
fn box_blur_border_clamp_by_hand() {
    // 2×2 image, filter 3. For the top-left pixel the 3×3 window clamps
    // to indices {0,0,1}×{0,0,1}:
    //   4*img(0,0) + 2*img(1,0) + 2*img(0,1) + 1*img(1,1)
    // img = [10, 20, 30, 40] → 40 + 40 + 60 + 40 = 180, 180/9 = 20.
    let out = box_blur(&[10, 20, 30, 40], 2, 2, 3);
    assert_eq!(out[0], 20);
}

#[test]
fn box_blur_truncates_toward_zero() {
    // Row [0, 255, 0], filter 3, single row: each column sums three
    // vertical clamps. Center: 3*(0 + 255 + 0) = 765, 765/9 = 85 exact;
    // left: 3*(0 + 0 + 255) = 765/9 = 85 too (clamp duplicates x=0).
    let out = box_blur(&[0, 255, 0], 3, 1, 3);
    assert_eq!(out[1], 85);
    // Check a genuinely truncating case: [0, 10, 0] center
    // 3*(0+10+0) = 30, 30/9 = 3 (3.33 truncated).
    let out = box_blur(&[0, 10, 0], 3, 1, 3);
    assert_eq!(out[1], 3);
}

#[test]
fn box_blur_wide_filter_on_small_image() {
    // Filter larger than the image: everything clamps, result is a
    // weighted mean of the two pixels, still in range.
    let out = box_blur(&[0, 255], 2, 1, 5);
    assert_eq!(out.len(), 2);
    assert!(out[0] < out[1], "gradient direction must be preserved");
}

// ===== pixel widening =====

#[test]
fn widen_narrow_is_lossless() {
    let pixels: Vec<u8> = (0..=255).collect();
    assert_eq!(narrow_pixels(&widen_pixels(&pixels)), pixels);
}

// ===== comparison =====

#[test]
fn verify_exact_passes_on_equal() {
    let report = verify_exact(&[5u8, 6, 7], &[5, 6, 7]);
    assert!(report.matches);
    assert_eq!(report.compared, 3);
}

#[test]
fn verify_exact_locates_divergence() {
    let report = verify_exact(&[1, 1, 1, 1], &[1, 1, 2, 1]);
    assert!(!report.matches);
    assert_eq!(report.first_mismatch, Some(2));
}

#[test]
fn verify_tolerance_accepts_float_noise() {
    let expected = vec![0.5f32, 1.5, 2.5];
    let actual = vec![0.5001f32, 1.4999, 2.5];
    assert!(verify_with_tolerance(&expected, &actual, 1e-3).matches);
    assert!(!verify_with_tolerance(&expected, &actual, 1e-6).matches);
}

// ===== timing =====

#[test]
fn time_measures_something() {
    let (sum, elapsed) = time(|| (0..10_000u64).sum::<u64>());
    assert_eq!(sum, 49_995_000);
    // A monotonic clock can only move forward.
    assert!(elapsed.as_nanos() < u128::MAX);
}
