//! Headless [`RenderDevice`] that keeps resources in memory and records
//! every call in order.

use std::collections::BTreeMap;

use asset::IndexWidth;
use corelib::Mat4;
use log::warn;

use crate::device::{
    BufferHandle, BufferKind, HandleTable, ProgramBindings, ProgramHandle, RenderDevice,
    ShaderHandle, ShaderStage, UniformLocation, VertexArrayDesc, VertexArrayHandle,
    VertexAttribute,
};
use crate::reflect::{self, CompiledStage, LinkOutput};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateBuffer {
        buffer: BufferHandle,
        kind: BufferKind,
        len: usize,
    },
    DeleteBuffer {
        buffer: BufferHandle,
    },
    CreateVertexArray {
        vertex_array: VertexArrayHandle,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        stride: u32,
        attributes: Vec<VertexAttribute>,
    },
    DeleteVertexArray {
        vertex_array: VertexArrayHandle,
    },
    CompileShader {
        shader: ShaderHandle,
        stage: ShaderStage,
        compiled: bool,
    },
    DeleteShader {
        shader: ShaderHandle,
    },
    LinkProgram {
        program: ProgramHandle,
        linked: bool,
    },
    DeleteProgram {
        program: ProgramHandle,
    },
    UseProgram {
        program: Option<ProgramHandle>,
    },
    SetUniformMat4 {
        program: Option<ProgramHandle>,
        location: UniformLocation,
        value: Mat4,
    },
    BindVertexArray {
        vertex_array: Option<VertexArrayHandle>,
    },
    DrawIndexed {
        program: Option<ProgramHandle>,
        vertex_array: Option<VertexArrayHandle>,
        index_count: u32,
        width: IndexWidth,
        /// Uniform block of the bound program at draw time, keyed by offset.
        uniforms: BTreeMap<u32, Mat4>,
    },
}

/// One `DrawIndexed` command, flattened for assertions.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: Option<ProgramHandle>,
    pub vertex_array: Option<VertexArrayHandle>,
    pub index_count: u32,
    pub width: IndexWidth,
    pub uniforms: BTreeMap<u32, Mat4>,
}

impl DrawCall {
    pub fn uniform(&self, location: UniformLocation) -> Option<Mat4> {
        self.uniforms.get(&location.offset()).copied()
    }
}

struct StoredBuffer {
    kind: BufferKind,
    contents: Vec<u8>,
}

struct StoredVertexArray {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    attributes: Vec<VertexAttribute>,
}

struct StoredProgram {
    link: LinkOutput,
    uniforms: BTreeMap<u32, Mat4>,
}

#[derive(Default)]
pub struct RecordingDevice {
    buffers: HandleTable<StoredBuffer>,
    vertex_arrays: HandleTable<StoredVertexArray>,
    shaders: HandleTable<CompiledStage>,
    programs: HandleTable<StoredProgram>,
    current_program: Option<ProgramHandle>,
    bound_vertex_array: Option<VertexArrayHandle>,
    commands: Vec<Command>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer.0).map(|b| b.contents.as_slice())
    }

    pub fn buffer_kind(&self, buffer: BufferHandle) -> Option<BufferKind> {
        self.buffers.get(buffer.0).map(|b| b.kind)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// `(vertex, index)` buffers a vertex array was created over.
    pub fn vertex_array_buffers(
        &self,
        vertex_array: VertexArrayHandle,
    ) -> Option<(BufferHandle, BufferHandle)> {
        self.vertex_arrays
            .get(vertex_array.0)
            .map(|va| (va.vertex_buffer, va.index_buffer))
    }

    pub fn vertex_array_attributes(
        &self,
        vertex_array: VertexArrayHandle,
    ) -> Option<&[VertexAttribute]> {
        self.vertex_arrays
            .get(vertex_array.0)
            .map(|va| va.attributes.as_slice())
    }

    /// Every recorded draw, in submission order.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed {
                    program,
                    vertex_array,
                    index_count,
                    width,
                    uniforms,
                } => Some(DrawCall {
                    program: *program,
                    vertex_array: *vertex_array,
                    index_count: *index_count,
                    width: *width,
                    uniforms: uniforms.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

impl RenderDevice for RecordingDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferHandle {
        let buffer = BufferHandle(self.buffers.insert(StoredBuffer {
            kind,
            contents: contents.to_vec(),
        }));
        self.commands.push(Command::CreateBuffer {
            buffer,
            kind,
            len: contents.len(),
        });
        buffer
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(buffer.0).is_none() {
            warn!("delete_buffer: unknown {buffer:?}");
        }
        self.commands.push(Command::DeleteBuffer { buffer });
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc<'_>) -> VertexArrayHandle {
        let vertex_array = VertexArrayHandle(self.vertex_arrays.insert(StoredVertexArray {
            vertex_buffer: desc.vertex_buffer,
            index_buffer: desc.index_buffer,
            attributes: desc.attributes.to_vec(),
        }));
        self.commands.push(Command::CreateVertexArray {
            vertex_array,
            vertex_buffer: desc.vertex_buffer,
            index_buffer: desc.index_buffer,
            stride: desc.stride,
            attributes: desc.attributes.to_vec(),
        });
        vertex_array
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if self.vertex_arrays.remove(vertex_array.0).is_none() {
            warn!("delete_vertex_array: unknown {vertex_array:?}");
        }
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
        self.commands.push(Command::DeleteVertexArray { vertex_array });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderHandle {
        let compiled = CompiledStage::compile(stage, source);
        let ok = compiled.is_compiled();
        let shader = ShaderHandle(self.shaders.insert(compiled));
        self.commands.push(Command::CompileShader {
            shader,
            stage,
            compiled: ok,
        });
        shader
    }

    fn shader_compiled(&self, shader: ShaderHandle) -> bool {
        self.shaders.get(shader.0).is_some_and(CompiledStage::is_compiled)
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> Option<String> {
        self.shaders.get(shader.0).and_then(|s| s.log.clone())
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if self.shaders.remove(shader.0).is_none() {
            warn!("delete_shader: unknown {shader:?}");
        }
        self.commands.push(Command::DeleteShader { shader });
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        bindings: &ProgramBindings<'_>,
    ) -> ProgramHandle {
        let link = match (self.shaders.get(vertex.0), self.shaders.get(fragment.0)) {
            (Some(vs), Some(fs)) => reflect::link(vs, fs, bindings),
            _ => LinkOutput::failed("unknown shader handle"),
        };
        let linked = link.linked;
        let program = ProgramHandle(self.programs.insert(StoredProgram {
            link,
            uniforms: BTreeMap::new(),
        }));
        self.commands.push(Command::LinkProgram { program, linked });
        program
    }

    fn program_linked(&self, program: ProgramHandle) -> bool {
        self.programs.get(program.0).is_some_and(|p| p.link.linked)
    }

    fn program_info_log(&self, program: ProgramHandle) -> Option<String> {
        self.programs.get(program.0).and_then(|p| p.link.log.clone())
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let block = self.programs.get(program.0)?.link.block.as_ref()?;
        block.find(name).map(|u| UniformLocation(u.offset))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program.0).is_none() {
            warn!("delete_program: unknown {program:?}");
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.commands.push(Command::DeleteProgram { program });
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
        self.commands.push(Command::UseProgram { program });
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        let program = self.current_program;
        match program.and_then(|p| self.programs.get_mut(p.0)) {
            Some(stored) => {
                stored.uniforms.insert(location.offset(), *value);
            }
            None => warn!("set_uniform_mat4 without a program in use"),
        }
        self.commands.push(Command::SetUniformMat4 {
            program,
            location,
            value: *value,
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        self.bound_vertex_array = vertex_array;
        self.commands.push(Command::BindVertexArray { vertex_array });
    }

    fn draw_indexed(&mut self, index_count: u32, width: IndexWidth) {
        if self.bound_vertex_array.is_none() {
            warn!("draw_indexed without a bound vertex array");
        }
        let uniforms = self
            .current_program
            .and_then(|p| self.programs.get(p.0))
            .map(|p| p.uniforms.clone())
            .unwrap_or_default();
        self.commands.push(Command::DrawIndexed {
            program: self.current_program,
            vertex_array: self.bound_vertex_array,
            index_count,
            width,
            uniforms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_keep_their_bytes() {
        let mut dev = RecordingDevice::new();
        let b = dev.create_buffer(BufferKind::Index, &[1, 2, 3, 4]);
        assert_eq!(dev.buffer_contents(b), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(dev.buffer_kind(b), Some(BufferKind::Index));
        dev.delete_buffer(b);
        assert_eq!(dev.buffer_contents(b), None);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn uniforms_are_per_program() {
        let mut dev = RecordingDevice::new();
        let vs = dev.compile_shader(ShaderStage::Vertex, crate::shader::DEFAULT_VERTEX_SHADER);
        let fs = dev.compile_shader(ShaderStage::Fragment, crate::shader::DEFAULT_FRAGMENT_SHADER);
        let bindings = ProgramBindings {
            attributes: &[(0, "position")],
            fragment_outputs: &[(0, "outputColor")],
        };
        let a = dev.link_program(vs, fs, &bindings);
        let b = dev.link_program(vs, fs, &bindings);
        let model = dev.uniform_location(a, "modelMatrix").unwrap();

        let m = Mat4::translation(1.0, 2.0, 3.0);
        dev.use_program(Some(a));
        dev.set_uniform_mat4(model, &m);
        dev.draw_indexed(3, IndexWidth::U16);
        dev.use_program(Some(b));
        dev.draw_indexed(3, IndexWidth::U16);

        let draws = dev.draw_calls();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].uniform(model), Some(m));
        assert_eq!(draws[1].uniform(model), None);
        assert_eq!(draws[1].program, Some(b));
    }

    #[test]
    fn deleting_bound_vertex_array_unbinds_it() {
        let mut dev = RecordingDevice::new();
        let vb = dev.create_buffer(BufferKind::Vertex, &[0; 12]);
        let ib = dev.create_buffer(BufferKind::Index, &[0; 6]);
        let va = dev.create_vertex_array(&VertexArrayDesc {
            vertex_buffer: vb,
            index_buffer: ib,
            stride: 12,
            attributes: &[],
        });
        dev.bind_vertex_array(Some(va));
        dev.delete_vertex_array(va);
        dev.draw_indexed(3, IndexWidth::U16);
        assert_eq!(dev.draw_calls()[0].vertex_array, None);
        assert_eq!(dev.live_vertex_arrays(), 0);
    }
}
