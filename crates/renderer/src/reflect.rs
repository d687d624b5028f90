//! WGSL compile and link checks shared by every device backend.
//!
//! "Compiling" a stage parses and validates it with naga; "linking" pairs a
//! vertex and a fragment module, checks the fixed name bindings and the
//! inter-stage interface, and lays out the program's uniform block so
//! uniforms can be looked up by name.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::device::{ProgramBindings, ShaderStage};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Result of compiling one stage. `module` is `None` on failure.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub module: Option<naga::Module>,
    pub log: Option<String>,
}

impl CompiledStage {
    /// Compile with every optional shader capability allowed.
    pub fn compile(stage: ShaderStage, source: &str) -> Self {
        Self::compile_with(stage, source, Capabilities::all())
    }

    /// Compile, rejecting anything outside `capabilities`.
    pub fn compile_with(stage: ShaderStage, source: &str, capabilities: Capabilities) -> Self {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(err) => {
                return Self {
                    stage,
                    module: None,
                    log: Some(err.emit_to_string(source)),
                };
            }
        };

        let mut validator = Validator::new(ValidationFlags::all(), capabilities);
        match validator.validate(&module) {
            Ok(_) => Self {
                stage,
                module: Some(module),
                log: None,
            },
            Err(err) => Self {
                stage,
                module: None,
                log: Some(err.emit_to_string(source)),
            },
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.module.is_some()
    }
}

/// One named uniform inside the block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// The single uniform buffer a program reads, at `@group(0) @binding(0)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformBlock {
    pub size: u32,
    pub uniforms: Vec<UniformSlot>,
}

impl UniformBlock {
    pub fn find(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LinkOutput {
    pub linked: bool,
    pub block: Option<UniformBlock>,
    pub log: Option<String>,
}

impl LinkOutput {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            linked: false,
            block: None,
            log: Some(format!("error: {}", reason.into())),
        }
    }
}

#[derive(Debug)]
struct Varying {
    location: u32,
    name: Option<String>,
}

#[derive(Default)]
struct Diagnostics {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Diagnostics {
    fn into_log(self) -> Option<String> {
        let lines: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("error: {e}"))
            .chain(self.warnings.iter().map(|w| format!("warning: {w}")))
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

/// Link a vertex and a fragment stage.
pub fn link(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
    bindings: &ProgramBindings<'_>,
) -> LinkOutput {
    let mut diag = Diagnostics::default();

    if vertex.stage != ShaderStage::Vertex {
        diag.errors.push("first attachment is not a vertex shader".into());
    }
    if fragment.stage != ShaderStage::Fragment {
        diag.errors.push("second attachment is not a fragment shader".into());
    }
    if !vertex.is_compiled() {
        diag.errors.push("vertex shader did not compile".into());
    }
    if !fragment.is_compiled() {
        diag.errors.push("fragment shader did not compile".into());
    }
    let (Some(vs), Some(fs)) = (&vertex.module, &fragment.module) else {
        return finish(diag, None);
    };
    if !diag.errors.is_empty() {
        return finish(diag, None);
    }

    let vs_entry = find_entry(vs, naga::ShaderStage::Vertex, VERTEX_ENTRY);
    let fs_entry = find_entry(fs, naga::ShaderStage::Fragment, FRAGMENT_ENTRY);
    if vs_entry.is_none() {
        diag.errors
            .push(format!("vertex shader has no @vertex entry point `{VERTEX_ENTRY}`"));
    }
    if fs_entry.is_none() {
        diag.errors.push(format!(
            "fragment shader has no @fragment entry point `{FRAGMENT_ENTRY}`"
        ));
    }
    let (Some(vs_entry), Some(fs_entry)) = (vs_entry, fs_entry) else {
        return finish(diag, None);
    };

    let vs_inputs = stage_inputs(vs, vs_entry);
    let vs_outputs = stage_outputs(vs, vs_entry);
    let fs_inputs = stage_inputs(fs, fs_entry);
    let fs_outputs = stage_outputs(fs, fs_entry);

    check_bindings(&mut diag, "attribute", bindings.attributes, &vs_inputs);
    check_bindings(&mut diag, "fragment output", bindings.fragment_outputs, &fs_outputs);

    for input in &fs_inputs {
        if !vs_outputs.iter().any(|o| o.location == input.location) {
            diag.errors.push(format!(
                "fragment input {} at location {} is not written by the vertex shader",
                input.name.as_deref().unwrap_or("<unnamed>"),
                input.location
            ));
        }
    }

    let vertex_block = uniform_block(&mut diag, vs, "vertex");
    let fragment_block = uniform_block(&mut diag, fs, "fragment");
    let block = merge_blocks(&mut diag, vertex_block, fragment_block);

    finish(diag, block)
}

fn finish(diag: Diagnostics, block: Option<UniformBlock>) -> LinkOutput {
    let linked = diag.errors.is_empty();
    LinkOutput {
        linked,
        block: if linked { block } else { None },
        log: diag.into_log(),
    }
}

fn find_entry<'m>(
    module: &'m naga::Module,
    stage: naga::ShaderStage,
    name: &str,
) -> Option<&'m naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == name)
}

fn location_of(binding: &Option<naga::Binding>) -> Option<u32> {
    match binding {
        Some(naga::Binding::Location { location, .. }) => Some(*location),
        _ => None,
    }
}

/// Flattens a (possibly struct-typed) argument or result into located fields.
fn collect_varyings(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: &Option<naga::Binding>,
    name: Option<&str>,
    out: &mut Vec<Varying>,
) {
    if let Some(location) = location_of(binding) {
        out.push(Varying {
            location,
            name: name.map(str::to_owned),
        });
    } else if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
        for member in members {
            if let Some(location) = location_of(&member.binding) {
                out.push(Varying {
                    location,
                    name: member.name.clone(),
                });
            }
        }
    }
}

fn stage_inputs(module: &naga::Module, entry: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    for arg in &entry.function.arguments {
        collect_varyings(module, arg.ty, &arg.binding, arg.name.as_deref(), &mut out);
    }
    out
}

fn stage_outputs(module: &naga::Module, entry: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_varyings(module, result.ty, &result.binding, None, &mut out);
    }
    out
}

/// WGSL fixes locations in source, so a binding can only be confirmed:
/// a name declared elsewhere is an error, a missing name is a warning.
fn check_bindings(
    diag: &mut Diagnostics,
    what: &str,
    bindings: &[(u32, &str)],
    declared: &[Varying],
) {
    for &(location, name) in bindings {
        match declared.iter().find(|v| v.name.as_deref() == Some(name)) {
            Some(v) if v.location != location => diag.errors.push(format!(
                "{what} `{name}` is declared at location {} but bound to location {location}",
                v.location
            )),
            Some(_) => {}
            None if declared.iter().any(|v| v.location == location) => {}
            None => diag
                .warnings
                .push(format!("{what} `{name}` is not active; binding ignored")),
        }
    }
}

fn uniform_block(
    diag: &mut Diagnostics,
    module: &naga::Module,
    stage: &str,
) -> Option<UniformBlock> {
    let mut block: Option<UniformBlock> = None;

    for (_, global) in module.global_variables.iter() {
        let name = global.name.as_deref().unwrap_or("<unnamed>");
        match global.space {
            naga::AddressSpace::Uniform => {}
            naga::AddressSpace::Handle | naga::AddressSpace::Storage { .. } => {
                diag.errors.push(format!(
                    "{stage} shader resource `{name}` is not supported; only one uniform block is"
                ));
                continue;
            }
            _ => continue,
        }

        let at_zero = matches!(
            global.binding,
            Some(naga::ResourceBinding {
                group: 0,
                binding: 0
            })
        );
        if !at_zero {
            diag.errors.push(format!(
                "{stage} shader uniform `{name}` must be bound at @group(0) @binding(0)"
            ));
            continue;
        }
        if block.is_some() {
            diag.errors.push(format!(
                "{stage} shader declares more than one uniform block"
            ));
            continue;
        }

        let ty = &module.types[global.ty];
        let size = ty.inner.size(module.to_ctx());
        let uniforms = match &ty.inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|m| {
                    Some(UniformSlot {
                        name: m.name.clone()?,
                        offset: m.offset,
                        size: module.types[m.ty].inner.size(module.to_ctx()),
                    })
                })
                .collect(),
            _ => vec![UniformSlot {
                name: name.to_owned(),
                offset: 0,
                size,
            }],
        };
        block = Some(UniformBlock { size, uniforms });
    }

    block
}

fn merge_blocks(
    diag: &mut Diagnostics,
    vertex: Option<UniformBlock>,
    fragment: Option<UniformBlock>,
) -> Option<UniformBlock> {
    match (vertex, fragment) {
        (None, None) => None,
        (Some(b), None) | (None, Some(b)) => Some(b),
        (Some(mut vs), Some(fs)) => {
            for slot in fs.uniforms {
                match vs.find(&slot.name) {
                    Some(existing) if *existing != slot => diag.errors.push(format!(
                        "uniform `{}` has a different layout in the vertex and fragment shaders",
                        slot.name
                    )),
                    Some(_) => {}
                    None => vs.uniforms.push(slot),
                }
            }
            vs.size = vs.size.max(fs.size);
            Some(vs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};

    const BINDINGS: ProgramBindings<'static> = ProgramBindings {
        attributes: &[(0, "position")],
        fragment_outputs: &[(0, "outputColor")],
    };

    fn default_stages() -> (CompiledStage, CompiledStage) {
        (
            CompiledStage::compile(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER),
            CompiledStage::compile(ShaderStage::Fragment, DEFAULT_FRAGMENT_SHADER),
        )
    }

    #[test]
    fn default_shaders_compile_and_link() {
        let (vs, fs) = default_stages();
        assert!(vs.is_compiled(), "{:?}", vs.log);
        assert!(fs.is_compiled(), "{:?}", fs.log);

        let out = link(&vs, &fs, &BINDINGS);
        assert!(out.linked, "{:?}", out.log);
        let block = out.block.expect("uniform block");
        assert_eq!(block.size, 192);
        assert_eq!(block.find("projectionMatrix").map(|u| u.offset), Some(0));
        assert_eq!(block.find("viewMatrix").map(|u| u.offset), Some(64));
        assert_eq!(block.find("modelMatrix").map(|u| u.offset), Some(128));
        assert!(block.uniforms.iter().all(|u| u.size == 64));
    }

    #[test]
    fn syntax_error_is_reported() {
        let stage = CompiledStage::compile(ShaderStage::Vertex, "fn vs_main( -> {");
        assert!(!stage.is_compiled());
        assert!(stage.log.is_some_and(|l| !l.is_empty()));
    }

    #[test]
    fn type_error_is_reported() {
        let src = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return 1.0; }";
        let stage = CompiledStage::compile(ShaderStage::Vertex, src);
        assert!(!stage.is_compiled());
        assert!(stage.log.is_some());
    }

    #[test]
    fn link_fails_when_a_stage_did_not_compile() {
        let vs = CompiledStage::compile(ShaderStage::Vertex, "not wgsl");
        let (_, fs) = default_stages();
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.block.is_none());
        assert!(out.log.unwrap().contains("vertex shader did not compile"));
    }

    #[test]
    fn misplaced_position_attribute_fails_link() {
        let src = r#"
            @vertex
            fn vs_main(@location(1) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 1.0);
            }
        "#;
        let vs = CompiledStage::compile(ShaderStage::Vertex, src);
        let fs = CompiledStage::compile(
            ShaderStage::Fragment,
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        );
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.log.unwrap().contains("bound to location 0"));
    }

    #[test]
    fn missing_entry_point_fails_link() {
        let src = r#"
            @vertex
            fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 1.0);
            }
        "#;
        let vs = CompiledStage::compile(ShaderStage::Vertex, src);
        let (_, fs) = default_stages();
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.log.unwrap().contains(VERTEX_ENTRY));
    }

    #[test]
    fn unconnected_fragment_input_fails_link() {
        let vs_src = r#"
            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 1.0);
            }
        "#;
        let vs = CompiledStage::compile(ShaderStage::Vertex, vs_src);
        let (_, fs) = default_stages();
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.log.unwrap().contains("not written by the vertex shader"));
    }

    #[test]
    fn unnamed_bound_output_links_without_uniforms() {
        let vs_src = r#"
            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 1.0);
            }
        "#;
        let fs_src =
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let vs = CompiledStage::compile(ShaderStage::Vertex, vs_src);
        let fs = CompiledStage::compile(ShaderStage::Fragment, fs_src);
        let out = link(&vs, &fs, &BINDINGS);
        assert!(out.linked, "{:?}", out.log);
        assert!(out.block.is_none());
        assert!(out.log.is_none());
    }

    #[test]
    fn uniform_outside_group_zero_fails_link() {
        let vs_src = r#"
            @group(1) @binding(0) var<uniform> modelMatrix: mat4x4<f32>;

            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return modelMatrix * vec4<f32>(position, 1.0);
            }
        "#;
        let fs_src =
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let vs = CompiledStage::compile(ShaderStage::Vertex, vs_src);
        let fs = CompiledStage::compile(ShaderStage::Fragment, fs_src);
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.log.unwrap().contains("@group(0) @binding(0)"));
    }

    #[test]
    fn capabilities_limit_what_compiles() {
        let src = r#"
            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                let d: f64 = 1.0lf;
                return vec4<f32>(position, f32(d));
            }
        "#;
        assert!(CompiledStage::compile(ShaderStage::Vertex, src).is_compiled());
        let stage = CompiledStage::compile_with(ShaderStage::Vertex, src, Capabilities::empty());
        assert!(!stage.is_compiled());
        assert!(stage.log.is_some());
    }

    #[test]
    fn conflicting_uniform_layouts_fail_link() {
        let fs_src = r#"
            struct Tint {
                viewMatrix: mat4x4<f32>,
            }
            @group(0) @binding(0) var<uniform> tint: Tint;

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return tint.viewMatrix[0];
            }
        "#;
        let (vs, _) = default_stages();
        let fs = CompiledStage::compile(ShaderStage::Fragment, fs_src);
        assert!(fs.is_compiled(), "{:?}", fs.log);
        let out = link(&vs, &fs, &BINDINGS);
        assert!(!out.linked);
        assert!(out.log.unwrap().contains("different layout"));
    }

    #[test]
    fn fragment_uniforms_extend_the_vertex_block() {
        let fs_src = r#"
            struct Extra {
                projectionMatrix: mat4x4<f32>,
                viewMatrix: mat4x4<f32>,
                modelMatrix: mat4x4<f32>,
                tint: vec4<f32>,
            }
            @group(0) @binding(0) var<uniform> extra: Extra;

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return extra.tint;
            }
        "#;
        let (vs, _) = default_stages();
        let fs = CompiledStage::compile(ShaderStage::Fragment, fs_src);
        let out = link(&vs, &fs, &BINDINGS);
        assert!(out.linked, "{:?}", out.log);
        let block = out.block.unwrap();
        assert_eq!(block.size, 208);
        assert_eq!(block.find("tint").map(|u| u.offset), Some(192));
        assert_eq!(block.find("modelMatrix").map(|u| u.offset), Some(128));
    }

    #[test]
    fn bare_uniform_global_is_addressable_by_name() {
        let vs_src = r#"
            @group(0) @binding(0) var<uniform> modelMatrix: mat4x4<f32>;

            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return modelMatrix * vec4<f32>(position, 1.0);
            }
        "#;
        let fs_src =
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let vs = CompiledStage::compile(ShaderStage::Vertex, vs_src);
        let fs = CompiledStage::compile(ShaderStage::Fragment, fs_src);
        let out = link(&vs, &fs, &BINDINGS);
        assert!(out.linked, "{:?}", out.log);
        let block = out.block.unwrap();
        assert_eq!(block.size, 64);
        assert_eq!(block.find("modelMatrix").map(|u| u.offset), Some(0));
        assert!(block.find("viewMatrix").is_none());
    }
}
