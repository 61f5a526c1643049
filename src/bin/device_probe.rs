// bin/device_probe.rs — enumerate compute devices and run a sanity add.
//
// The "is my compute stack alive" probe: list every platform/device pair
// the machine exposes, open a context on the default one, and push ten
// integers through the simple_add kernel.
//
// USAGE
//   cargo run --bin device_probe
//
// Exits 1 when no device is found or any dispatch step fails.

use workgrid::buffer::{AccessMode, DeviceBuffer};
use workgrid::catalog::DeviceCatalog;
use workgrid::dispatch::{GridShape, KernelArg};
use workgrid::error::ComputeError;
use workgrid::program::{KernelSource, ShaderProgram};

const VEC_ADD_SRC: &str = include_str!("../shaders/vec_add.wgsl");

fn main() {
    if let Err(e) = run() {
        eprintln!("[workgrid] {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ComputeError> {
    let catalog = DeviceCatalog::enumerate();
    if catalog.is_empty() {
        // Fail before any compilation is attempted.
        return Err(ComputeError::NoAcceleratorAvailable);
    }

    println!("{} device(s) available:", catalog.descriptors().len());
    for d in catalog.descriptors() {
        println!("  {d}");
    }

    let ctx = catalog.select_default()?.into_context()?;

    let source = KernelSource::templated(VEC_ADD_SRC, 256, 1)?;
    let program = ShaderProgram::compile(&ctx, source)?;
    let kernel = program.kernel(&ctx, "simple_add")?;

    let a: Vec<i32> = (0..10).collect();
    let b: Vec<i32> = vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
    let size = (a.len() * std::mem::size_of::<i32>()) as u64;

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
    inv.launch(&ctx, GridShape::D1(a.len() as u32))?;

    let c: Vec<i32> = bytemuck::pod_collect_to_vec(&buf_c.read(&ctx)?);
    println!("result:");
    for v in &c {
        print!("{v} ");
    }
    println!();
    Ok(())
}
