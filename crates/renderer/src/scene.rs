//! Scene: camera state, one shader program and an ordered list of uploaded
//! meshes, drawn through a [`RenderDevice`].

use std::cell::Cell;

use asset::MeshSource;
use corelib::{Camera, Mat4, MathError, Projection, Vec3};
use log::{debug, info, warn};

use crate::device::RenderDevice;
use crate::error::UploadError;
use crate::record::{MeshPlacement, RecordId, RenderRecord};
use crate::shader::ShaderProgram;
use crate::upload::upload_mesh;

pub struct Scene {
    program: Option<ShaderProgram>,
    records: Vec<(RecordId, RenderRecord)>,
    next_id: u32,
    projection_params: Projection,
    projection: Mat4,
    camera: Option<Camera>,
    view: Mat4,
    warned_no_program: Cell<bool>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Identity projection and view, no program, no meshes.
    pub fn new() -> Self {
        Self {
            program: None,
            records: Vec::new(),
            next_id: 0,
            projection_params: Projection::default(),
            projection: Mat4::IDENTITY,
            camera: None,
            view: Mat4::IDENTITY,
            warned_no_program: Cell::new(false),
        }
    }

    /// Build the program used by [`Scene::render`], replacing (and deleting)
    /// any previous one.
    pub fn setup_shaders(
        &mut self,
        device: &mut dyn RenderDevice,
        vertex_src: &str,
        fragment_src: &str,
    ) -> &ShaderProgram {
        let program = ShaderProgram::build(device, vertex_src, fragment_src);
        if let Some(old) = self.program.take() {
            device.delete_program(old.handle());
        }
        self.warned_no_program.set(false);
        self.program.insert(program)
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    pub fn set_projection(&mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.projection_params = Projection::new(fov_y_degrees, aspect, near, far);
        self.projection = self.projection_params.matrix();
    }

    /// Keep fov and clip planes, change the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection_params = self.projection_params.with_aspect(aspect);
        self.projection = self.projection_params.matrix();
    }

    /// On error the previous view is kept.
    pub fn set_camera(&mut self, eye: Vec3, target: Vec3) -> Result<(), MathError> {
        let camera = Camera::new(eye, target);
        self.view = camera.view()?;
        self.camera = Some(camera);
        Ok(())
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection_params
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    /// Upload `mesh` and append it to the draw list.
    pub fn add_mesh(
        &mut self,
        device: &mut dyn RenderDevice,
        mesh: &dyn MeshSource,
        placement: MeshPlacement,
    ) -> Result<RecordId, UploadError> {
        let record = upload_mesh(device, mesh, placement)?;
        Ok(self.add_record(record))
    }

    /// Append an already uploaded record.
    pub fn add_record(&mut self, record: RenderRecord) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        self.records.push((id, record));
        id
    }

    pub fn record(&self, id: RecordId) -> Option<&RenderRecord> {
        self.records.iter().find(|(rid, _)| *rid == id).map(|(_, r)| r)
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut RenderRecord> {
        self.records
            .iter_mut()
            .find(|(rid, _)| *rid == id)
            .map(|(_, r)| r)
    }

    /// Records in draw order.
    pub fn records(&self) -> impl Iterator<Item = (RecordId, &RenderRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop a record and free its device resources. Remaining records keep
    /// their order.
    pub fn remove_mesh(&mut self, device: &mut dyn RenderDevice, id: RecordId) -> bool {
        let Some(pos) = self.records.iter().position(|(rid, _)| *rid == id) else {
            return false;
        };
        let (_, record) = self.records.remove(pos);
        record.release(device);
        true
    }

    /// Draw every record in insertion order.
    pub fn render(&self, device: &mut dyn RenderDevice) {
        let Some(program) = &self.program else {
            if !self.warned_no_program.replace(true) {
                warn!("render skipped: no shader program, call setup_shaders first");
            }
            return;
        };

        device.use_program(Some(program.handle()));
        if let Some(loc) = program.projection {
            device.set_uniform_mat4(loc, &self.projection);
        }
        if let Some(loc) = program.view {
            device.set_uniform_mat4(loc, &self.view);
        }

        for (_, record) in &self.records {
            if let Some(loc) = program.model {
                device.set_uniform_mat4(loc, &record.model_matrix());
            }
            device.bind_vertex_array(Some(record.vertex_array()));
            device.draw_indexed(record.index_count(), record.index_width());
            device.bind_vertex_array(None);
        }

        device.use_program(None);
        debug!("rendered {} meshes", self.records.len());
    }

    /// Free every record and the program.
    pub fn destroy(self, device: &mut dyn RenderDevice) {
        let count = self.records.len();
        for (_, record) in self.records {
            record.release(device);
        }
        if let Some(program) = self.program {
            device.delete_program(program.handle());
        }
        info!("scene destroyed ({count} meshes released)");
    }
}
