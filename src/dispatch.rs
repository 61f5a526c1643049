// dispatch.rs — argument binding, execution grids, and kernel launches.
//
// Responsibilities:
//   1. `GridShape` — the work-item index space (1D element count or 2D
//      width×height), and the ceiling-divided workgroup counts that cover
//      it.
//   2. `DispatchState` — the lifecycle of one dispatch, enforced at run
//      time where the type system cannot enforce it.
//   3. `Invocation` — bind arguments to a kernel's parameter list, then
//      launch and block until the device reports completion.
//
// GRID SEMANTICS:
// One work-item per grid point, exactly. WGSL fixes the workgroup size in
// the shader text, so the host launches ⌈grid / workgroup⌉ workgroups per
// dimension and the kernel guards out-of-bounds invocations
// (`if i >= n { return; }`). The host imposes no workgroup subdivision of
// its own beyond that ceiling division — choosing how workgroups map to
// hardware is the device runtime's job.
//
// ARGUMENT BINDING IS POSITIONAL — A SHARP EDGE:
// Argument i binds to @binding(i); the order must exactly match the
// kernel's declared parameter list. Count mismatches, kind mismatches
// (buffer where the kernel expects a scalar), and layout errors the
// backend detects are reported as ArgumentBindingError. A same-kind,
// same-layout mix-up (two i32 input buffers swapped) is undetectable by
// any layer and produces silently wrong results. That edge is inherent
// to positional binding; it is documented here rather than papered over.
//
// BLOCKING LAUNCHES:
// `launch` submits, then polls the device to completion before returning,
// so a subsequent `read` observes final values. The reported elapsed time
// is enqueue-to-completion wall-clock time: it includes command-queue
// overhead and is NOT pure kernel execution time. Blocking trades
// transfer/compute overlap for deterministic measurement. A production
// pipeline would model write, launch, and read as cancellable futures
// over explicit completion events and overlap several in-flight
// dispatches; it would also need timeouts, which this layer does not
// provide (a hung launch blocks indefinitely).

use std::time::{Duration, Instant};

use wgpu::util::DeviceExt;

use crate::buffer::{AccessMode, DeviceBuffer};
use crate::context::ComputeContext;
use crate::error::ComputeError;
use crate::program::{BindingDecl, BindingKind, EntryPoint};

// ---------------------------------------------------------------------------
// GridShape
// ---------------------------------------------------------------------------

/// The execution grid: the index space over which a kernel runs, one
/// work-item per point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridShape {
    /// Elementwise 1D workload: exactly `n` work-items.
    D1(u32),
    /// 2D image workload: exactly width×height work-items, one per pixel.
    D2 { width: u32, height: u32 },
}

impl GridShape {
    /// Total number of work-items in the grid.
    pub fn work_items(&self) -> u64 {
        match *self {
            GridShape::D1(n) => n as u64,
            GridShape::D2 { width, height } => width as u64 * height as u64,
        }
    }

    /// Workgroup counts covering the grid for a kernel with the given
    /// workgroup size. Ceiling division: every grid point is covered even
    /// when the dimensions are not workgroup multiples; the kernel's
    /// out-of-bounds guard discards the excess invocations.
    pub fn workgroups(&self, workgroup_size: [u32; 3]) -> (u32, u32, u32) {
        let [wx, wy, _] = workgroup_size;
        match *self {
            GridShape::D1(n) => (div_ceil(n, wx), 1, 1),
            GridShape::D2 { width, height } => (div_ceil(width, wx), div_ceil(height, wy), 1),
        }
    }
}

fn div_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

// ---------------------------------------------------------------------------
// DispatchState
// ---------------------------------------------------------------------------

/// Lifecycle of one dispatch. Steps are strictly ordered; skipping one is
/// an InvalidDispatchState. `Completed` and `Failed` are terminal — no
/// automatic retry anywhere in the crate; a retry restarts from
/// `Unconfigured` with fresh objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Unconfigured,
    DeviceSelected,
    ProgramCompiled,
    BuffersStaged,
    Launched,
    Completed,
    Failed,
}

impl DispatchState {
    /// The only legal next step, or None for terminal states.
    pub fn successor(self) -> Option<DispatchState> {
        match self {
            DispatchState::Unconfigured => Some(DispatchState::DeviceSelected),
            DispatchState::DeviceSelected => Some(DispatchState::ProgramCompiled),
            DispatchState::ProgramCompiled => Some(DispatchState::BuffersStaged),
            DispatchState::BuffersStaged => Some(DispatchState::Launched),
            DispatchState::Launched => Some(DispatchState::Completed),
            DispatchState::Completed | DispatchState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }

    /// Move to `next`, failing when `next` is not the immediate successor.
    pub fn advance(&mut self, next: DispatchState) -> Result<(), ComputeError> {
        if self.successor() == Some(next) {
            *self = next;
            Ok(())
        } else {
            Err(ComputeError::InvalidDispatchState {
                state: *self,
                attempted: next,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel and arguments
// ---------------------------------------------------------------------------

/// An executable entry point: compute pipeline plus the parameter list the
/// dispatch layer validates arguments against. Obtained from
/// `ShaderProgram::kernel`; valid only for the context that compiled it.
pub struct Kernel {
    pipeline: wgpu::ComputePipeline,
    entry: EntryPoint,
    bindings: Vec<BindingDecl>,
}

impl Kernel {
    pub(crate) fn new(
        pipeline: wgpu::ComputePipeline,
        entry: EntryPoint,
        bindings: Vec<BindingDecl>,
    ) -> Self {
        Kernel {
            pipeline,
            entry,
            bindings,
        }
    }

    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Begin a fresh invocation. Invocations are single-use: one binding
    /// of arguments, one launch. Re-binding for a differently-shaped
    /// problem means a new invocation.
    pub fn invocation(&self) -> Invocation<'_> {
        Invocation {
            kernel: self,
            // Device selection and program compilation are enforced by
            // construction — a Kernel cannot exist without them — so the
            // runtime machine starts here.
            state: DispatchState::ProgramCompiled,
            args: None,
        }
    }
}

/// One kernel argument. Buffers bind to storage declarations, scalars to
/// uniform declarations, in the kernel's declared parameter order.
#[derive(Clone, Copy)]
pub enum KernelArg<'a> {
    Buffer(&'a DeviceBuffer),
    U32(u32),
    I32(i32),
    F32(f32),
}

impl<'a> KernelArg<'a> {
    fn scalar_bytes(&self) -> Option<[u8; 4]> {
        match *self {
            KernelArg::Buffer(_) => None,
            KernelArg::U32(v) => Some(v.to_ne_bytes()),
            KernelArg::I32(v) => Some(v.to_ne_bytes()),
            KernelArg::F32(v) => Some(v.to_ne_bytes()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            KernelArg::Buffer(_) => "buffer",
            KernelArg::U32(_) => "u32",
            KernelArg::I32(_) => "i32",
            KernelArg::F32(_) => "f32",
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A binding of one kernel to an ordered argument list and, at launch, an
/// execution grid. Created fresh per dispatch.
pub struct Invocation<'a> {
    kernel: &'a Kernel,
    state: DispatchState,
    args: Option<Vec<KernelArg<'a>>>,
}

/// What a completed launch reports back: enqueue-to-completion wall-clock
/// time (device-queue overhead included — this is not pure kernel time)
/// and the grid that ran.
#[derive(Debug, Clone, Copy)]
pub struct LaunchReport {
    pub elapsed: Duration,
    pub work_items: u64,
    pub workgroups: (u32, u32, u32),
}

impl<'a> Invocation<'a> {
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Record a failure: any raised error is terminal for this dispatch.
    fn fail(&mut self, err: ComputeError) -> ComputeError {
        self.state = DispatchState::Failed;
        err
    }

    /// Bind arguments in the kernel's declared parameter order.
    ///
    /// # Errors
    /// `ArgumentBindingError` on a count or kind mismatch the host can
    /// detect; `InvalidAccessMode` when a buffer's access mode conflicts
    /// with what the kernel does to that parameter. Either error is
    /// terminal for this invocation.
    pub fn bind(&mut self, args: &[KernelArg<'a>]) -> Result<(), ComputeError> {
        let declared = &self.kernel.bindings;
        if args.len() != declared.len() {
            let detail = format!(
                "kernel `{}` declares {} parameters, {} arguments supplied",
                self.kernel.entry.name,
                declared.len(),
                args.len()
            );
            return Err(self.fail(ComputeError::ArgumentBindingError { detail }));
        }

        for (arg, decl) in args.iter().zip(declared) {
            match (arg, decl.kind) {
                (KernelArg::Buffer(buf), BindingKind::StorageRead) => {
                    if buf.access() == AccessMode::WriteOnly {
                        let err = ComputeError::InvalidAccessMode {
                            access: buf.access(),
                            operation: format!(
                                "binding at position {} where the kernel reads",
                                decl.index
                            ),
                        };
                        return Err(self.fail(err));
                    }
                }
                (KernelArg::Buffer(buf), BindingKind::StorageReadWrite) => {
                    if buf.access() == AccessMode::ReadOnly {
                        let err = ComputeError::InvalidAccessMode {
                            access: buf.access(),
                            operation: format!(
                                "binding at position {} where the kernel writes",
                                decl.index
                            ),
                        };
                        return Err(self.fail(err));
                    }
                }
                (KernelArg::Buffer(_), BindingKind::Uniform) => {
                    let detail = format!(
                        "position {}: kernel expects a scalar parameter, buffer supplied",
                        decl.index
                    );
                    return Err(self.fail(ComputeError::ArgumentBindingError { detail }));
                }
                (scalar, BindingKind::StorageRead | BindingKind::StorageReadWrite) => {
                    let detail = format!(
                        "position {}: kernel expects a buffer, {} supplied",
                        decl.index,
                        scalar.kind_name()
                    );
                    return Err(self.fail(ComputeError::ArgumentBindingError { detail }));
                }
                (_, BindingKind::Uniform) => {} // scalar to uniform slot
            }
        }

        self.args = Some(args.to_vec());
        Ok(())
    }

    /// Launch over `grid` and block until the device reports completion.
    ///
    /// Requires every argument the kernel *reads* to have been staged
    /// (host write or prior kernel write) — launching over undefined
    /// inputs is the skipped-step the state machine exists to catch.
    ///
    /// # Errors
    /// `InvalidDispatchState` when arguments are unbound or an input
    /// buffer is unstaged (nothing is enqueued); `ArgumentBindingError`
    /// when the backend rejects the binding at launch time. All errors
    /// are terminal for this invocation.
    ///
    /// # Panics
    /// Panics on an empty grid — the valid domain is N ≥ 1 and W×H ≥ 1×1.
    pub fn launch(
        &mut self,
        ctx: &ComputeContext,
        grid: GridShape,
    ) -> Result<LaunchReport, ComputeError> {
        assert!(grid.work_items() > 0, "execution grid must be non-empty");

        if self.state.is_terminal() {
            return Err(ComputeError::InvalidDispatchState {
                state: self.state,
                attempted: DispatchState::Launched,
            });
        }

        let args = match &self.args {
            Some(args) => args.clone(),
            None => {
                let err = ComputeError::InvalidDispatchState {
                    state: self.state,
                    attempted: DispatchState::Launched,
                };
                return Err(self.fail(err));
            }
        };

        // BuffersStaged: every parameter the kernel reads must hold
        // defined contents before anything is enqueued.
        for (arg, decl) in args.iter().zip(&self.kernel.bindings) {
            if let (KernelArg::Buffer(buf), BindingKind::StorageRead) = (arg, decl.kind) {
                if !buf.is_staged() {
                    let err = ComputeError::InvalidDispatchState {
                        state: self.state,
                        attempted: DispatchState::Launched,
                    };
                    return Err(self.fail(err));
                }
            }
        }
        self.state.advance(DispatchState::BuffersStaged)?;

        // Scalar parameters ride in 4-byte uniform buffers created per
        // launch; they must outlive the bind group, so collect them first.
        let scalar_buffers: Vec<wgpu::Buffer> = args
            .iter()
            .filter_map(|arg| {
                arg.scalar_bytes().map(|bytes| {
                    ctx.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("workgrid scalar arg"),
                            contents: &bytes,
                            usage: wgpu::BufferUsages::UNIFORM,
                        })
                })
            })
            .collect();

        let mut entries: Vec<wgpu::BindGroupEntry> = Vec::with_capacity(args.len());
        let mut scalars = scalar_buffers.iter();
        for (arg, decl) in args.iter().zip(&self.kernel.bindings) {
            let resource = match arg {
                KernelArg::Buffer(buf) => buf.raw.as_entire_binding(),
                _ => scalars
                    .next()
                    .expect("scalar buffer collected above")
                    .as_entire_binding(),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: decl.index,
                resource,
            });
        }

        let (bind_group, error) = ctx.capture_validation_error(|| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("workgrid args"),
                layout: &self.kernel.pipeline.get_bind_group_layout(0),
                entries: &entries,
            })
        });
        if let Some(detail) = error {
            return Err(self.fail(ComputeError::ArgumentBindingError { detail }));
        }

        let workgroups = grid.workgroups(self.kernel.entry.workgroup_size);
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("workgrid dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.kernel.entry.name.as_str()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }

        self.state.advance(DispatchState::Launched)?;

        // Enqueue-to-completion timing: submit, then poll until the device
        // signals the queue empty. Includes queue overhead by definition.
        let started = Instant::now();
        let ((), error) = ctx.capture_validation_error(|| {
            ctx.queue.submit(std::iter::once(encoder.finish()));
        });
        ctx.finish();
        let elapsed = started.elapsed();

        if let Some(detail) = error {
            return Err(self.fail(ComputeError::ArgumentBindingError { detail }));
        }

        // Buffers the kernel wrote now hold defined contents.
        for (arg, decl) in args.iter().zip(&self.kernel.bindings) {
            if let (KernelArg::Buffer(buf), BindingKind::StorageReadWrite) = (arg, decl.kind) {
                buf.mark_populated();
            }
        }

        self.state.advance(DispatchState::Completed)?;
        Ok(LaunchReport {
            elapsed,
            work_items: grid.work_items(),
            workgroups,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
