//! Renderer: explicit device seam, WGSL program building, mesh upload and
//! the scene that draws uploaded meshes.
//!
//! The same [`Scene`] drives either a [`WgpuDevice`] (on screen) or a
//! [`RecordingDevice`] (headless, used by tests).

pub mod device;
pub mod error;
pub mod gpu;
pub mod record;
pub mod recording;
pub mod reflect;
pub mod scene;
pub mod shader;
pub mod upload;

pub use device::{
    AttributeFormat, BufferHandle, BufferKind, ProgramBindings, ProgramHandle, RenderDevice,
    ShaderHandle, ShaderStage, UniformLocation, VertexArrayDesc, VertexArrayHandle,
    VertexAttribute,
};
pub use error::UploadError;
pub use gpu::WgpuDevice;
pub use record::{MeshPlacement, RecordId, RenderRecord};
pub use recording::{Command, DrawCall, RecordingDevice};
pub use scene::Scene;
pub use shader::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER, ShaderProgram};
pub use upload::{MAX_DATA_COMPONENTS, upload_mesh, vertex_attributes};
