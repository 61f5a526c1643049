// catalog.rs — compute device enumeration and selection.
//
// Responsibilities:
//   - Enumerate every (platform, device) pair the machine exposes. A
//     "platform" here is a wgpu backend (Vulkan, Metal, DX12, GL); a
//     "device" is an adapter reported by that backend.
//   - Select one device through an explicit, swappable policy function,
//     so alternate strategies (fastest device, most memory) can be
//     substituted without touching dispatch logic.
//
// ENUMERATION ORDER:
// Backends are probed in a fixed order so the catalog is deterministic on
// a given machine: Vulkan, Metal, DX12, GL. Within a backend, adapters
// keep the instance's enumeration order. The default policy picks the
// first backend that reports at least one adapter, then that backend's
// first adapter — the same first-match walk the typical demo loop does,
// made explicit.
//
// SOFTWARE ADAPTERS:
// llvmpipe and friends show up as DeviceType::Cpu and are real, usable
// compute devices — the default policy accepts them. `prefer_hardware`
// applies tiered selection (discrete > integrated > virtual/other > cpu)
// for callers that want a real GPU when one exists.

use std::fmt;

use crate::context::ComputeContext;
use crate::error::ComputeError;

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Coarse device classification, mapped from `wgpu::DeviceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl From<wgpu::DeviceType> for DeviceClass {
    fn from(t: wgpu::DeviceType) -> Self {
        match t {
            wgpu::DeviceType::DiscreteGpu => DeviceClass::Discrete,
            wgpu::DeviceType::IntegratedGpu => DeviceClass::Integrated,
            wgpu::DeviceType::VirtualGpu => DeviceClass::Virtual,
            wgpu::DeviceType::Cpu => DeviceClass::Cpu,
            wgpu::DeviceType::Other => DeviceClass::Other,
        }
    }
}

/// Identity of one selectable compute device. Immutable; created during
/// enumeration and held for the lifetime of the dispatch session.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Backend name ("Vulkan", "Metal", ...), the platform analogue.
    pub platform: String,
    /// Adapter name as reported by the driver.
    pub device: String,
    pub class: DeviceClass,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} ({:?})", self.platform, self.device, self.class)
    }
}

// ---------------------------------------------------------------------------
// Selection policies
// ---------------------------------------------------------------------------

/// A selection policy maps the ordered catalog to the index of the chosen
/// device, or `None` when nothing acceptable exists.
pub type SelectionPolicy = fn(&[DeviceDescriptor]) -> Option<usize>;

/// Default policy: first platform reporting at least one device, then that
/// platform's first device. Because the catalog is already grouped by
/// platform in probe order, this is simply the first entry.
pub fn first_available(devices: &[DeviceDescriptor]) -> Option<usize> {
    if devices.is_empty() {
        None
    } else {
        Some(0)
    }
}

/// Tiered policy: prefer real hardware over software rasterizers.
/// Falls back to *any* device (cpu included) as a last resort — an
/// llvmpipe run is slow, not wrong.
pub fn prefer_hardware(devices: &[DeviceDescriptor]) -> Option<usize> {
    let tier = |c: DeviceClass| match c {
        DeviceClass::Discrete => 0,
        DeviceClass::Integrated => 1,
        DeviceClass::Virtual | DeviceClass::Other => 2,
        DeviceClass::Cpu => 3,
    };
    devices
        .iter()
        .enumerate()
        .min_by_key(|(i, d)| (tier(d.class), *i))
        .map(|(i, _)| i)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The ordered set of (platform, device) pairs found on this machine.
///
/// Enumeration itself never fails — an empty catalog is a valid result,
/// surfaced as `NoAcceleratorAvailable` only when a selection is requested.
pub struct DeviceCatalog {
    instance: wgpu::Instance,
    adapters: Vec<wgpu::Adapter>,
    descriptors: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    /// Probe every backend and collect its adapters.
    pub fn enumerate() -> Self {
        // ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER keeps translation layers
        // (e.g. dzn on WSL2) visible; wgpu drops them by default. The
        // validation layer is enabled in debug builds for shader error
        // feedback.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            ..Default::default()
        });

        // Fixed probe order keeps the catalog deterministic.
        const PROBE_ORDER: [wgpu::Backends; 4] = [
            wgpu::Backends::VULKAN,
            wgpu::Backends::METAL,
            wgpu::Backends::DX12,
            wgpu::Backends::GL,
        ];

        let mut adapters = Vec::new();
        let mut descriptors = Vec::new();
        for backend in PROBE_ORDER {
            for adapter in instance.enumerate_adapters(backend) {
                let info = adapter.get_info();
                descriptors.push(DeviceDescriptor {
                    platform: format!("{:?}", info.backend),
                    device: info.name.clone(),
                    class: info.device_type.into(),
                });
                adapters.push(adapter);
            }
        }

        for d in &descriptors {
            eprintln!("[workgrid] found device: {d}");
        }

        DeviceCatalog {
            instance,
            adapters,
            descriptors,
        }
    }

    /// The ordered device identities, for inspection and custom policies.
    pub fn descriptors(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Select via the default first-match policy.
    pub fn select_default(self) -> Result<SelectedDevice, ComputeError> {
        self.select_with(first_available)
    }

    /// Select via an arbitrary policy. Consumes the catalog: exactly one
    /// device is used for the whole dispatch lifecycle (no multi-device
    /// load balancing).
    ///
    /// Emits the chosen platform/device identity — the one observability
    /// side effect of selection.
    pub fn select_with(mut self, policy: SelectionPolicy) -> Result<SelectedDevice, ComputeError> {
        let index = policy(&self.descriptors).ok_or(ComputeError::NoAcceleratorAvailable)?;
        let adapter = self.adapters.swap_remove(index);
        let descriptor = self.descriptors.swap_remove(index);
        eprintln!("[workgrid] using platform: {}", descriptor.platform);
        eprintln!("[workgrid] using device: {}", descriptor.device);
        Ok(SelectedDevice {
            instance: self.instance,
            adapter,
            descriptor,
        })
    }
}

/// One chosen device, ready to open a [`ComputeContext`].
pub struct SelectedDevice {
    pub(crate) instance: wgpu::Instance,
    pub(crate) adapter: wgpu::Adapter,
    pub(crate) descriptor: DeviceDescriptor,
}

impl SelectedDevice {
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Open the execution scope bound to this device.
    pub fn into_context(self) -> Result<ComputeContext, ComputeError> {
        ComputeContext::from_selected(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
