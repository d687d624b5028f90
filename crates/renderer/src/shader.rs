//! Shader program construction with logged diagnostics.

use log::{error, info, warn};

use crate::device::{ProgramBindings, ProgramHandle, RenderDevice, ShaderStage, UniformLocation};

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("shaders/voxel.vert.wgsl");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("shaders/voxel.frag.wgsl");

pub const POSITION_ATTRIBUTE: &str = "position";
pub const OUTPUT_COLOR: &str = "outputColor";

pub const PROJECTION_UNIFORM: &str = "projectionMatrix";
pub const VIEW_UNIFORM: &str = "viewMatrix";
pub const MODEL_UNIFORM: &str = "modelMatrix";

const BINDINGS: ProgramBindings<'static> = ProgramBindings {
    attributes: &[(0, POSITION_ATTRIBUTE)],
    fragment_outputs: &[(0, OUTPUT_COLOR)],
};

/// A linked (or failed) program plus its cached matrix uniforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    handle: ProgramHandle,
    linked: bool,
    pub projection: Option<UniformLocation>,
    pub view: Option<UniformLocation>,
    pub model: Option<UniformLocation>,
}

impl ShaderProgram {
    /// Compile both stages and link them. Diagnostics go to the log; the
    /// program is returned even if a stage failed, check [`Self::is_linked`].
    pub fn build(device: &mut dyn RenderDevice, vertex_src: &str, fragment_src: &str) -> Self {
        let vs = compile_stage(device, ShaderStage::Vertex, vertex_src);
        let fs = compile_stage(device, ShaderStage::Fragment, fragment_src);

        let handle = device.link_program(vs, fs, &BINDINGS);
        let linked = device.program_linked(handle);
        match (linked, device.program_info_log(handle)) {
            (false, Some(log)) => error!("program link failed:\n{log}"),
            (false, None) => error!("program link failed"),
            (true, Some(log)) => warn!("program linked with notes:\n{log}"),
            (true, None) => info!("program linked"),
        }

        device.delete_shader(vs);
        device.delete_shader(fs);

        let lookup = |name: &str| {
            let loc = device.uniform_location(handle, name);
            if linked && loc.is_none() {
                warn!("uniform `{name}` not found in program");
            }
            loc
        };
        let projection = lookup(PROJECTION_UNIFORM);
        let view = lookup(VIEW_UNIFORM);
        let model = lookup(MODEL_UNIFORM);

        Self {
            handle,
            linked,
            projection,
            view,
            model,
        }
    }

    /// The bundled voxel shader pair.
    pub fn default_program(device: &mut dyn RenderDevice) -> Self {
        Self::build(device, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER)
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

fn compile_stage(
    device: &mut dyn RenderDevice,
    stage: ShaderStage,
    source: &str,
) -> crate::device::ShaderHandle {
    let shader = device.compile_shader(stage, source);
    let compiled = device.shader_compiled(shader);
    match (compiled, device.shader_info_log(shader)) {
        (false, Some(log)) => error!("{} shader compile failed:\n{log}", stage.name()),
        (false, None) => error!("{} shader compile failed", stage.name()),
        (true, Some(log)) => warn!("{} shader:\n{log}", stage.name()),
        (true, None) => {}
    }
    shader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, RecordingDevice};

    #[test]
    fn default_vertex_shader_maps_depth_to_unit_range() {
        assert!(DEFAULT_VERTEX_SHADER.contains("clip.z = 0.5 * (clip.z + clip.w);"));

        let proj = corelib::Mat4::perspective(60.0, 1.0, 0.1, 100.0);
        let remapped = |z: f32| {
            let [_, _, cz, cw] = proj.mul_vec4([0.0, 0.0, z, 1.0]);
            0.5 * (cz + cw) / cw
        };
        assert!(remapped(-0.1).abs() < 1e-5);
        assert!((remapped(-100.0) - 1.0).abs() < 1e-5);
        assert!(remapped(-0.15) > 0.0);
    }

    #[test]
    fn default_program_resolves_matrices() {
        let mut dev = RecordingDevice::new();
        let program = ShaderProgram::default_program(&mut dev);
        assert!(program.is_linked());
        assert_eq!(program.projection.map(UniformLocation::offset), Some(0));
        assert_eq!(program.view.map(UniformLocation::offset), Some(64));
        assert_eq!(program.model.map(UniformLocation::offset), Some(128));
    }

    #[test]
    fn stage_objects_are_deleted_after_link() {
        let mut dev = RecordingDevice::new();
        ShaderProgram::default_program(&mut dev);
        let deleted = dev
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::DeleteShader { .. }))
            .count();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn broken_source_still_returns_program() {
        let mut dev = RecordingDevice::new();
        let program = ShaderProgram::build(&mut dev, "fn broken(", DEFAULT_FRAGMENT_SHADER);
        assert!(!program.is_linked());
        assert!(program.projection.is_none());
        assert!(dev.program_info_log(program.handle()).is_some());
    }
}
