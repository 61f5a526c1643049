// context.rs — the execution scope bound to one selected device.
//
// Exactly one ComputeContext exists per run: it owns the wgpu device and
// queue, and every buffer and program in this crate is created through it
// and is valid only for it. There is one command queue per context; all
// writes, launches, and reads go through it and execute in submission
// order with respect to the data they depend on.
//
// The host side of this crate is single-threaded. Concurrency
// exists only inside the device's own execution (data-parallel work-items
// scheduled by the device runtime, opaque to the host).
//
// # Field drop order
// Rust drops struct fields in declaration order. `_instance` is declared
// last so the wgpu::Instance outlives `device` and `queue` — destroying
// the instance first crashes some translation-layer drivers (dzn on WSL2)
// that keep back-references into it.

use crate::catalog::{DeviceCatalog, DeviceDescriptor, SelectedDevice};
use crate::error::ComputeError;

/// The per-run execution scope: device, queue, and the identity of the
/// adapter behind them.
pub struct ComputeContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    descriptor: DeviceDescriptor,
    _instance: wgpu::Instance,
}

impl ComputeContext {
    /// Enumerate, select the default device, and open a context on it.
    ///
    /// # Errors
    /// `NoAcceleratorAvailable` when no backend reports a device — a
    /// reportable condition; callers exit cleanly with status 1 rather
    /// than crash. `DeviceRequest` when the adapter refuses to open.
    pub fn new() -> Result<Self, ComputeError> {
        DeviceCatalog::enumerate().select_default()?.into_context()
    }

    pub(crate) fn from_selected(selected: SelectedDevice) -> Result<Self, ComputeError> {
        let SelectedDevice {
            instance,
            adapter,
            descriptor,
        } = selected;

        // wgpu's device request is async because on WebGPU it maps to a
        // JS Promise; for native backends we just block.
        let (device, queue): (wgpu::Device, wgpu::Queue) =
            pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("workgrid"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            ))
            .map_err(ComputeError::DeviceRequest)?;

        Ok(ComputeContext {
            device,
            queue,
            descriptor,
            _instance: instance,
        })
    }

    /// Identity of the device this context is bound to.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Block until every operation submitted to the queue has completed.
    /// The explicit synchronization barrier between a kernel launch and
    /// any read that must observe its results.
    pub fn finish(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Run `f` inside a validation error scope and return the captured
    /// diagnostic text, if any. The text is the backend's own message,
    /// verbatim.
    pub(crate) fn capture_validation_error<T>(&self, f: impl FnOnce() -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error.map(|e| e.to_string()))
    }
}
