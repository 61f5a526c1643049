// bin/vec_add_compare.rs — CPU vs device elementwise addition at scale.
//
// One million pseudo-random ints in [-10, 8] pushed through both paths:
// a plain CPU loop and a device dispatch. Reports both times in
// microseconds and an element-exact correctness verdict.
//
// The device figure is enqueue-to-completion — it includes buffer-bind
// and queue overhead, which dominates a workload this light. The point of
// the demo is the measurement methodology, not a win for the device.
//
// USAGE
//   cargo run --release --bin vec_add_compare

use workgrid::buffer::{AccessMode, DeviceBuffer};
use workgrid::context::ComputeContext;
use workgrid::dispatch::{GridShape, KernelArg};
use workgrid::error::ComputeError;
use workgrid::harness;
use workgrid::program::{KernelSource, ShaderProgram};

const VEC_ADD_SRC: &str = include_str!("../shaders/vec_add.wgsl");
const ARRAY_SIZE: usize = 1_000_000;

fn main() {
    if let Err(e) = run() {
        eprintln!("[workgrid] {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ComputeError> {
    // Deterministic LCG, values in [-10, 8] like the classic demo.
    let mut rng = 0x2545_F491u32;
    let mut next = || {
        rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
        ((rng >> 16) % 19) as i32 - 10
    };
    let a: Vec<i32> = (0..ARRAY_SIZE).map(|_| next()).collect();
    let b: Vec<i32> = (0..ARRAY_SIZE).map(|_| next()).collect();

    // --- CPU path ---
    let (expected, cpu_time) = harness::time(|| harness::vector_add(&a, &b));
    println!("CPU addition took {} microseconds", cpu_time.as_micros());

    // --- device path ---
    let ctx = ComputeContext::new()?;
    let source = KernelSource::templated(VEC_ADD_SRC, 256, 1)?;
    let program = ShaderProgram::compile(&ctx, source)?;
    let kernel = program.kernel(&ctx, "simple_add")?;

    let size = (ARRAY_SIZE * std::mem::size_of::<i32>()) as u64;
    let buf_a = DeviceBuffer::allocate(&ctx, size, AccessMode::ReadOnly)?;
    let buf_b = DeviceBuffer::allocate(&ctx, size, AccessMode::ReadOnly)?;
    let buf_c = DeviceBuffer::allocate(&ctx, size, AccessMode::WriteOnly)?;
    buf_a.write(&ctx, bytemuck::cast_slice(&a))?;
    buf_b.write(&ctx, bytemuck::cast_slice(&b))?;

    let mut inv = kernel.invocation();
    inv.bind(&[
        KernelArg::Buffer(&buf_a),
        KernelArg::Buffer(&buf_b),
        KernelArg::Buffer(&buf_c),
    ])?;
    let report = inv.launch(&ctx, GridShape::D1(ARRAY_SIZE as u32))?;
    println!(
        "device addition took {} microseconds ({} work-items, workgroups {:?})",
        report.elapsed.as_micros(),
        report.work_items,
        report.workgroups
    );

    let actual: Vec<i32> = bytemuck::pod_collect_to_vec(&buf_c.read(&ctx)?);
    let verdict = harness::verify_exact(&expected, &actual);
    println!(
        "results are {}",
        if verdict.matches { "correct" } else { "incorrect" }
    );
    if let Some(i) = verdict.first_mismatch {
        eprintln!("[workgrid] first mismatch at index {i}");
    }
    Ok(())
}
