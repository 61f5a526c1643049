// bin/blur_filter.rs — grayscale mean blur on the device, verified
// against the CPU reference.
//
// Loads a grayscale image from a caller-supplied path, or synthesizes a
// test scene when no path is given. Blurs it on the device, compares
// pixel-exactly with harness::box_blur (same clamp border policy, same
// integer arithmetic), reports both times in milliseconds, and writes
// the result to blur_output.png.
//
// USAGE
//   cargo run --release --bin blur_filter
//   cargo run --release --bin blur_filter -- path/to/image.png
//   cargo run --release --bin blur_filter -- path/to/image.png 5

use workgrid::buffer::{AccessMode, DeviceBuffer};
use workgrid::context::ComputeContext;
use workgrid::dispatch::{GridShape, KernelArg};
use workgrid::error::ComputeError;
use workgrid::harness;
use workgrid::program::{KernelSource, ShaderProgram};

const BLUR_SRC: &str = include_str!("../shaders/blur_filter.wgsl");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let (pixels, width, height) = match args.get(1) {
        Some(path) => load_grayscale(path),
        None => make_scene(),
    };
    let filter_size: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);
    if filter_size % 2 == 0 {
        eprintln!("[workgrid] filter size must be odd (got {filter_size})");
        std::process::exit(1);
    }
    println!("image: {width}×{height}, filter: {filter_size}×{filter_size}");

    if let Err(e) = run(&pixels, width, height, filter_size) {
        eprintln!("[workgrid] {e}");
        std::process::exit(1);
    }
}

fn run(
    pixels: &[u8],
    width: usize,
    height: usize,
    filter_size: usize,
) -> Result<(), ComputeError> {
    // --- CPU reference ---
    let (expected, cpu_time) =
        harness::time(|| harness::box_blur(pixels, width, height, filter_size));
    println!("CPU blur took {:.2} ms", cpu_time.as_secs_f64() * 1000.0);

    // --- device path ---
    let ctx = ComputeContext::new()?;
    let source = KernelSource::templated(BLUR_SRC, 16, 8)?;
    let program = ShaderProgram::compile(&ctx, source)?;
    let kernel = program.kernel(&ctx, "blur_filter")?;

    let widened = harness::widen_pixels(pixels);
    let size = (width * height * std::mem::size_of::<u32>()) as u64;
    let buf_in = DeviceBuffer::allocate(&ctx, size, AccessMode::ReadOnly)?;
    let buf_out = DeviceBuffer::allocate(&ctx, size, AccessMode::WriteOnly)?;
    buf_in.write(&ctx, bytemuck::cast_slice(&widened))?;

    let mut inv = kernel.invocation();
    inv.bind(&[
        KernelArg::Buffer(&buf_in),
        KernelArg::Buffer(&buf_out),
        KernelArg::U32(filter_size as u32),
        KernelArg::U32(width as u32),
        KernelArg::U32(height as u32),
    ])?;
    let report = inv.launch(
        &ctx,
        GridShape::D2 {
            width: width as u32,
            height: height as u32,
        },
    )?;
    println!(
        "device blur took {:.2} ms (enqueue to completion)",
        report.elapsed.as_secs_f64() * 1000.0
    );

    let out: Vec<u32> = bytemuck::pod_collect_to_vec(&buf_out.read(&ctx)?);
    let actual = harness::narrow_pixels(&out);

    let verdict = harness::verify_exact(&expected, &actual);
    println!(
        "results are {}",
        if verdict.matches { "correct" } else { "incorrect" }
    );
    if let Some(i) = verdict.first_mismatch {
        eprintln!(
            "[workgrid] first mismatch at pixel ({}, {})",
            i % width,
            i / width
        );
    }

    let img = image::GrayImage::from_raw(width as u32, height as u32, actual)
        .expect("pixel buffer matches dimensions");
    match img.save("blur_output.png") {
        Ok(()) => println!("→ blur_output.png"),
        Err(e) => {
            eprintln!("[workgrid] failed to write blur_output.png: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn load_grayscale(path: &str) -> (Vec<u8>, usize, usize) {
    let img = match image::open(path) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            eprintln!("[workgrid] failed to load image {path}: {e}");
            std::process::exit(1);
        }
    };
    let (w, h) = img.dimensions();
    (img.into_raw(), w as usize, h as usize)
}

/// Synthetic scene: diagonal gradient with bright rectangles, enough
/// structure that a blur is visible in the output.
fn make_scene() -> (Vec<u8>, usize, usize) {
    let (w, h) = (256usize, 192usize);
    let mut pixels = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            pixels[y * w + x] = ((x * 160 / w) + (y * 80 / h)) as u8;
        }
    }
    for &(rx, ry, rw, rh) in &[(30, 20, 60, 40), (150, 60, 70, 50), (60, 120, 90, 45)] {
        for y in ry..(ry + rh).min(h) {
            for x in rx..(rx + rw).min(w) {
                pixels[y * w + x] = 230;
            }
        }
    }
    (pixels, w, h)
}
