// program.rs — runtime kernel compilation and source reflection.
//
// Responsibilities:
//   1. `KernelSource` — kernel source text plus the metadata the dispatch
//      layer needs: `@compute` entry points (name, workgroup size) and
//      `@group(0) @binding(n)` declarations. The metadata comes from a
//      host-side scan of the text, so entry-point and access-mode
//      mistakes are caught before the device is ever involved.
//   2. `ShaderProgram::compile` — hand the text to the device compiler,
//      capturing its diagnostic log verbatim on rejection.
//   3. `ShaderProgram::kernel` — resolve a named entry point into an
//      executable compute pipeline.
//
// REFLECTION IS CONVENTION-BASED, NOT A WGSL PARSER.
// The scan expects the shape every kernel in this crate uses:
//
//   @group(0) @binding(0) var<storage, read> a: array<i32>;
//   @group(0) @binding(1) var<storage, read_write> c: array<i32>;
//
//   @compute @workgroup_size(256, 1, 1)
//   fn simple_add(@builtin(global_invocation_id) gid: vec3<u32>) { ... }
//
// Attribute order is @compute then @workgroup_size then fn; workgroup
// dimensions must be integer literals (substitute `{{WG_X}}`/`{{WG_Y}}`
// placeholders via `templated` before compilation); bindings live in
// group 0 and are numbered contiguously from 0, because argument position
// i binds to @binding(i). Source that deviates is rejected as a
// BuildFailure with a message saying what the scan expected.
//
// The compiler performs no file I/O. `KernelSource::from_path` is the
// source-text provider for callers that keep kernels on disk; inline
// strings work the same way through `new`.
//
// Compilation is synchronous and blocking: no speculative or background
// builds, no program cache across runs. A Program Handle is valid only
// for the context that built it.

use std::path::Path;

use crate::context::ComputeContext;
use crate::dispatch::Kernel;
use crate::error::ComputeError;

// ---------------------------------------------------------------------------
// Reflection metadata
// ---------------------------------------------------------------------------

/// One `@compute` entry point found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    /// Workgroup dimensions declared in the shader. Missing components
    /// default to 1.
    pub workgroup_size: [u32; 3],
}

/// How the shader accesses a binding — decides which buffer access modes
/// may legally be bound there, and which arguments must be staged before
/// launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `var<storage, read>` (or bare `var<storage>`): the kernel reads it.
    StorageRead,
    /// `var<storage, read_write>`: the kernel may write it. WGSL has no
    /// write-only storage class, so write-only buffers bind here too.
    StorageReadWrite,
    /// `var<uniform>`: a scalar parameter slot.
    Uniform,
}

/// One `@group(0) @binding(n)` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecl {
    pub index: u32,
    pub kind: BindingKind,
}

// ---------------------------------------------------------------------------
// KernelSource
// ---------------------------------------------------------------------------

/// Kernel source text with its scanned metadata. Construction validates
/// the conventions above; compilation by the device happens separately in
/// [`ShaderProgram::compile`].
#[derive(Debug, Clone)]
pub struct KernelSource {
    text: String,
    entry_points: Vec<EntryPoint>,
    bindings: Vec<BindingDecl>,
}

impl KernelSource {
    /// Scan inline source text.
    pub fn new(text: impl Into<String>) -> Result<Self, ComputeError> {
        let text = text.into();
        let entry_points = scan_entry_points(&text)?;
        let bindings = scan_bindings(&text)?;
        Ok(KernelSource {
            text,
            entry_points,
            bindings,
        })
    }

    /// Substitute `{{WG_X}}` / `{{WG_Y}}` placeholders, then scan. Keeps
    /// one shader text serving multiple workgroup configurations.
    pub fn templated(text: &str, wg_x: u32, wg_y: u32) -> Result<Self, ComputeError> {
        let substituted = text
            .replace("{{WG_X}}", &wg_x.to_string())
            .replace("{{WG_Y}}", &wg_y.to_string());
        Self::new(substituted)
    }

    /// Read source from a caller-supplied path. This is the only file I/O
    /// in the module, deliberately separate from compilation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ComputeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ComputeError::BuildFailure {
            diagnostics: format!("cannot read kernel source {}: {e}", path.display()),
        })?;
        Self::new(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bindings(&self) -> &[BindingDecl] {
        &self.bindings
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entry_points.iter().map(|e| e.name.as_str()).collect()
    }

    /// Resolve an entry point by name.
    pub fn entry(&self, name: &str) -> Result<&EntryPoint, ComputeError> {
        self.entry_points
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ComputeError::EntryPointNotFound {
                name: name.to_string(),
                available: self.entry_points.iter().map(|e| e.name.clone()).collect(),
            })
    }
}

// ---------------------------------------------------------------------------
// ShaderProgram
// ---------------------------------------------------------------------------

/// A compiled, device-executable program. Valid only for the context that
/// built it. Build is one-shot and fallible; there is no incremental
/// recompilation.
pub struct ShaderProgram {
    module: wgpu::ShaderModule,
    source: KernelSource,
}

impl ShaderProgram {
    /// Compile kernel source for the context's device. Blocks until the
    /// build completes.
    ///
    /// # Errors
    /// `BuildFailure` carrying the device compiler's diagnostic log,
    /// verbatim — that log is the only actionable information on kernel
    /// syntax/semantic errors.
    pub fn compile(ctx: &ComputeContext, source: KernelSource) -> Result<Self, ComputeError> {
        let (module, error) = ctx.capture_validation_error(|| {
            ctx.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("workgrid program"),
                    source: wgpu::ShaderSource::Wgsl(source.text().into()),
                })
        });
        if let Some(diagnostics) = error {
            eprintln!("[workgrid] kernel build failed:\n{diagnostics}");
            return Err(ComputeError::BuildFailure { diagnostics });
        }
        Ok(ShaderProgram { module, source })
    }

    pub fn source(&self) -> &KernelSource {
        &self.source
    }

    /// Resolve a named entry point into an executable [`Kernel`].
    ///
    /// # Errors
    /// `EntryPointNotFound` when no `@compute` function with this name
    /// exists; `BuildFailure` when pipeline creation is rejected (e.g. a
    /// binding layout the device cannot satisfy).
    pub fn kernel(&self, ctx: &ComputeContext, name: &str) -> Result<Kernel, ComputeError> {
        let entry = self.source.entry(name)?.clone();

        let (pipeline, error) = ctx.capture_validation_error(|| {
            ctx.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(name),
                    layout: None,
                    module: &self.module,
                    entry_point: name,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        });
        if let Some(diagnostics) = error {
            return Err(ComputeError::BuildFailure { diagnostics });
        }

        Ok(Kernel::new(pipeline, entry, self.source.bindings().to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Source scanning
// ---------------------------------------------------------------------------

fn build_failure(msg: impl Into<String>) -> ComputeError {
    ComputeError::BuildFailure {
        diagnostics: msg.into(),
    }
}

/// Absolute position of `pat` in `text`, searching from `from`.
fn find_from(text: &str, from: usize, pat: &str) -> Option<usize> {
    text[from..].find(pat).map(|rel| from + rel)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn scan_entry_points(text: &str) -> Result<Vec<EntryPoint>, ComputeError> {
    let mut entries = Vec::new();
    let mut cursor = 0;

    while let Some(at) = find_from(text, cursor, "@compute") {
        let after_attr = at + "@compute".len();

        let ws_at = find_from(text, after_attr, "@workgroup_size(").ok_or_else(|| {
            build_failure("expected @workgroup_size(...) after @compute")
        })?;
        let dims_start = ws_at + "@workgroup_size(".len();
        let dims_end = find_from(text, dims_start, ")")
            .ok_or_else(|| build_failure("unterminated @workgroup_size attribute"))?;

        let mut workgroup_size = [1u32; 3];
        let components: Vec<&str> = text[dims_start..dims_end].split(',').collect();
        if components.len() > 3 {
            return Err(build_failure("@workgroup_size takes at most 3 dimensions"));
        }
        for (i, raw) in components.iter().enumerate() {
            let raw = raw.trim();
            workgroup_size[i] = raw.parse::<u32>().map_err(|_| {
                build_failure(format!(
                    "workgroup size component `{raw}` is not an integer literal \
                     (substitute {{{{WG_X}}}}/{{{{WG_Y}}}} placeholders before compiling)"
                ))
            })?;
        }

        let name_start = fn_name_start(text, dims_end + 1)
            .ok_or_else(|| build_failure("expected `fn` after @workgroup_size"))?;
        let name_end = text[name_start..]
            .find(|c: char| !is_ident_char(c))
            .map(|rel| name_start + rel)
            .unwrap_or(text.len());
        let name = &text[name_start..name_end];
        if name.is_empty() {
            return Err(build_failure("expected entry point name after `fn`"));
        }

        entries.push(EntryPoint {
            name: name.to_string(),
            workgroup_size,
        });
        cursor = name_end;
    }

    if entries.is_empty() {
        return Err(build_failure("no @compute entry point found in kernel source"));
    }
    Ok(entries)
}

/// Position of the identifier following the first standalone `fn` token at
/// or after `from`.
fn fn_name_start(text: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(at) = find_from(text, cursor, "fn") {
        let before_ok = at == 0
            || !text[..at]
                .chars()
                .next_back()
                .map(is_ident_char)
                .unwrap_or(false);
        let after = at + 2;
        let after_ok = text[after..]
            .chars()
            .next()
            .map(|c| c.is_whitespace())
            .unwrap_or(false);
        if before_ok && after_ok {
            let rel = text[after..].find(|c: char| !c.is_whitespace())?;
            return Some(after + rel);
        }
        cursor = at + 2;
    }
    None
}

fn scan_bindings(text: &str) -> Result<Vec<BindingDecl>, ComputeError> {
    let mut decls: Vec<BindingDecl> = Vec::new();
    let mut cursor = 0;

    while let Some(at) = find_from(text, cursor, "@group(") {
        let group_start = at + "@group(".len();
        let group_end = find_from(text, group_start, ")")
            .ok_or_else(|| build_failure("unterminated @group attribute"))?;
        let group: u32 = text[group_start..group_end]
            .trim()
            .parse()
            .map_err(|_| build_failure("@group index must be an integer literal"))?;
        if group != 0 {
            return Err(build_failure(format!(
                "only bind group 0 is supported (found @group({group}))"
            )));
        }

        let binding_at = find_from(text, group_end, "@binding(")
            .ok_or_else(|| build_failure("expected @binding after @group(0)"))?;
        let index_start = binding_at + "@binding(".len();
        let index_end = find_from(text, index_start, ")")
            .ok_or_else(|| build_failure("unterminated @binding attribute"))?;
        let index: u32 = text[index_start..index_end]
            .trim()
            .parse()
            .map_err(|_| build_failure("@binding index must be an integer literal"))?;

        let var_at = find_from(text, index_end, "var")
            .ok_or_else(|| build_failure("expected `var` declaration after @binding"))?;
        let template_open = find_from(text, var_at, "<")
            .ok_or_else(|| build_failure("binding must declare an address space, e.g. var<storage, read>"))?;
        let template_close = find_from(text, template_open, ">")
            .ok_or_else(|| build_failure("unterminated address-space template"))?;
        let template = &text[template_open + 1..template_close];

        let mut parts = template.split(',').map(str::trim);
        let kind = match parts.next() {
            Some("uniform") => BindingKind::Uniform,
            Some("storage") => match parts.next() {
                None | Some("read") => BindingKind::StorageRead,
                Some("read_write") => BindingKind::StorageReadWrite,
                Some(other) => {
                    return Err(build_failure(format!(
                        "unsupported storage access `{other}` at @binding({index})"
                    )))
                }
            },
            Some(other) => {
                return Err(build_failure(format!(
                    "unsupported address space `{other}` at @binding({index})"
                )))
            }
            None => return Err(build_failure("empty address-space template")),
        };

        if decls.iter().any(|d| d.index == index) {
            return Err(build_failure(format!("duplicate @binding({index})")));
        }
        decls.push(BindingDecl { index, kind });
        cursor = template_close;
    }

    decls.sort_by_key(|d| d.index);
    // Position i of the argument list binds to @binding(i), so the
    // declared indices must be exactly 0..n.
    for (i, d) in decls.iter().enumerate() {
        if d.index != i as u32 {
            return Err(build_failure(format!(
                "bindings must be numbered contiguously from 0 (missing @binding({i}))"
            )));
        }
    }
    Ok(decls)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
