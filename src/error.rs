// error.rs — the crate-wide error taxonomy.
//
// One enum for the whole dispatch lifecycle rather than per-module error
// types: every failure here ends the current dispatch, so callers match on
// a single type to decide between retry, CPU fallback, and abort. None of
// these are retried automatically anywhere in the crate — a retry restarts
// from device selection.
//
// BuildFailure carries the backend compiler's diagnostic text VERBATIM.
// That text is the only actionable information on kernel syntax/semantic
// errors; truncating or summarising it is a regression.

use std::fmt;

use crate::buffer::AccessMode;
use crate::dispatch::DispatchState;

/// Errors from device discovery, compilation, buffer transfer, and dispatch.
#[derive(Debug)]
pub enum ComputeError {
    /// No backend reported any adapter. Recoverable by the caller (fall
    /// back to a CPU path or exit cleanly with a non-zero status).
    NoAcceleratorAvailable,
    /// The selected adapter refused to open a device (driver issue,
    /// unsupported limits).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Kernel source rejected, either by the host-side reflection scan or
    /// by the device compiler. `diagnostics` is the full compiler log.
    BuildFailure { diagnostics: String },
    /// No `@compute` entry point with this name exists in the program.
    EntryPointNotFound { name: String, available: Vec<String> },
    /// Host data length does not equal the buffer's allocated size.
    /// No partial transfer is performed.
    SizeMismatch { buffer: u64, host: u64 },
    /// An operation violated the buffer's declared access mode.
    InvalidAccessMode { access: AccessMode, operation: String },
    /// The backend rejected the argument binding at launch time (count,
    /// position, or type mismatch against the kernel's parameter list).
    /// A mismatch the backend cannot detect produces silently wrong
    /// results instead — see the dispatch module header.
    ArgumentBindingError { detail: String },
    /// A dispatch lifecycle step was attempted out of order.
    InvalidDispatchState {
        state: DispatchState,
        attempted: DispatchState,
    },
    /// The device reported an error during a write or read.
    TransferFailure { detail: String },
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::NoAcceleratorAvailable => write!(
                f,
                "no compute device found on any backend \
                 (check that a Vulkan/Metal/DX12/GL driver is installed)"
            ),
            ComputeError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            ComputeError::BuildFailure { diagnostics } => {
                write!(f, "kernel build failed:\n{diagnostics}")
            }
            ComputeError::EntryPointNotFound { name, available } => write!(
                f,
                "entry point `{name}` not found in program (available: {})",
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            ),
            ComputeError::SizeMismatch { buffer, host } => write!(
                f,
                "size mismatch: buffer is {buffer} bytes, host data is {host} bytes \
                 (transfers must cover the buffer exactly)"
            ),
            ComputeError::InvalidAccessMode { access, operation } => {
                write!(f, "access mode {access:?} forbids {operation}")
            }
            ComputeError::ArgumentBindingError { detail } => {
                write!(f, "argument binding rejected: {detail}")
            }
            ComputeError::InvalidDispatchState { state, attempted } => write!(
                f,
                "dispatch step {attempted:?} attempted while in state {state:?}"
            ),
            ComputeError::TransferFailure { detail } => {
                write!(f, "device transfer failed: {detail}")
            }
        }
    }
}

impl std::error::Error for ComputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComputeError::DeviceRequest(e) => Some(e),
            _ => None,
        }
    }
}
