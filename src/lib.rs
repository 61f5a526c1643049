// workgrid — host-side compute dispatch layer.
//
// Offloads bulk numeric and image workloads (elementwise vector addition,
// 2D blur) to whatever data-parallel device the machine exposes, through
// wgpu's compute-only surface.
//
// One dispatch flows:
//   catalog  (enumerate devices, select one)
//   program  (compile kernel source, resolve an entry point)
//   buffer   (stage inputs)
//   dispatch (bind arguments, launch, block until complete)
//   buffer   (read results back)
//   harness  (verify against the CPU reference, report timing)

pub mod buffer;
pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod harness;
pub mod program;
