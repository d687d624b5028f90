//! End-to-end scene behaviour on the recording device.

use std::collections::BTreeMap;

use asset::primitives::unit_cube;
use asset::{ColorVertex, IndexWidth, MeshData, MeshSource};
use corelib::{Mat4, Vec3};
use renderer::{
    AttributeFormat, BufferKind, Command, DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER,
    MeshPlacement, RecordingDevice, RenderDevice, Scene, UploadError,
};

fn scene_with_shaders(dev: &mut RecordingDevice) -> Scene {
    let mut scene = Scene::new();
    let program = scene.setup_shaders(dev, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER);
    assert!(program.is_linked());
    scene
}

#[test]
fn single_cube_end_to_end() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    scene.set_projection(60.0, 1.0, 0.1, 100.0);
    scene.set_camera(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO).unwrap();
    scene
        .add_mesh(&mut dev, &unit_cube::<u32>(0), MeshPlacement::default())
        .unwrap();

    dev.clear_commands();
    scene.render(&mut dev);

    let draws = dev.draw_calls();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].index_count, 36);
    assert_eq!(draws[0].width, IndexWidth::U32);

    let program = scene.program().unwrap();
    assert_eq!(draws[0].uniform(program.model.unwrap()), Some(Mat4::IDENTITY));
    assert_eq!(
        draws[0].uniform(program.projection.unwrap()),
        Some(scene.projection_matrix())
    );
    let view = draws[0].uniform(program.view.unwrap()).unwrap();
    let expected: Mat4 =
        glam::Mat4::look_at_rh(glam::Vec3::Z * 5.0, glam::Vec3::ZERO, glam::Vec3::Y).into();
    assert!(view.approx_eq(&expected, 1e-5));

    // Program is unbound at the end of the frame.
    assert_eq!(
        dev.commands().last(),
        Some(&Command::UseProgram { program: None })
    );
}

#[test]
fn frame_issues_commands_in_fixed_order() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    scene.set_projection(45.0, 1.5, 0.5, 50.0);
    scene.set_camera(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO).unwrap();
    let a = scene
        .add_mesh(&mut dev, &unit_cube::<u16>(0), MeshPlacement::default())
        .unwrap();
    let b = scene
        .add_mesh(
            &mut dev,
            &unit_cube::<u32>(1),
            MeshPlacement::at(Vec3::new(2.0, 0.0, 0.0)).with_scale(0.5),
        )
        .unwrap();

    dev.clear_commands();
    scene.render(&mut dev);

    let program = scene.program().unwrap();
    let handle = Some(program.handle());
    let (p, v, m) = (
        program.projection.unwrap(),
        program.view.unwrap(),
        program.model.unwrap(),
    );
    let proj = scene.projection_matrix();
    let view = scene.view_matrix();
    let ra = scene.record(a).unwrap();
    let rb = scene.record(b).unwrap();
    let uniforms = |model: Mat4| BTreeMap::from([(0, proj), (64, view), (128, model)]);
    let set = |location, value| Command::SetUniformMat4 {
        program: handle,
        location,
        value,
    };

    let expected = vec![
        Command::UseProgram { program: handle },
        set(p, proj),
        set(v, view),
        set(m, ra.model_matrix()),
        Command::BindVertexArray {
            vertex_array: Some(ra.vertex_array()),
        },
        Command::DrawIndexed {
            program: handle,
            vertex_array: Some(ra.vertex_array()),
            index_count: 36,
            width: IndexWidth::U16,
            uniforms: uniforms(ra.model_matrix()),
        },
        Command::BindVertexArray { vertex_array: None },
        set(m, rb.model_matrix()),
        Command::BindVertexArray {
            vertex_array: Some(rb.vertex_array()),
        },
        Command::DrawIndexed {
            program: handle,
            vertex_array: Some(rb.vertex_array()),
            index_count: 36,
            width: IndexWidth::U32,
            uniforms: uniforms(rb.model_matrix()),
        },
        Command::BindVertexArray { vertex_array: None },
        Command::UseProgram { program: None },
    ];
    assert_eq!(dev.commands(), expected.as_slice());
}

#[test]
fn meshes_draw_in_insertion_order() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    let cube = unit_cube::<u16>(0);
    let ids: Vec<_> = (0..4)
        .map(|i| {
            scene
                .add_mesh(
                    &mut dev,
                    &cube,
                    MeshPlacement::at(Vec3::new(i as f32, 0.0, 0.0)),
                )
                .unwrap()
        })
        .collect();

    dev.clear_commands();
    scene.render(&mut dev);

    let drawn: Vec<_> = dev.draw_calls().into_iter().map(|d| d.vertex_array).collect();
    let expected: Vec<_> = ids
        .iter()
        .map(|id| Some(scene.record(*id).unwrap().vertex_array()))
        .collect();
    assert_eq!(drawn, expected);
}

#[test]
fn spinning_changes_only_uniforms() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    let id = scene
        .add_mesh(&mut dev, &unit_cube::<u16>(2), MeshPlacement::default())
        .unwrap();
    let model = scene.program().unwrap().model.unwrap();

    dev.clear_commands();
    scene.render(&mut dev);
    let first = dev.draw_calls()[0].uniform(model).unwrap();

    scene.record_mut(id).unwrap().transform.rotate_by(0.3);
    dev.clear_commands();
    scene.render(&mut dev);
    let second = dev.draw_calls()[0].uniform(model).unwrap();

    assert_ne!(first, second);
    assert!(
        !dev.commands()
            .iter()
            .any(|c| matches!(c, Command::CreateBuffer { .. }))
    );
}

#[test]
fn removal_releases_buffers_and_keeps_order() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    let cube = unit_cube::<u16>(0);
    let a = scene.add_mesh(&mut dev, &cube, MeshPlacement::default()).unwrap();
    let b = scene.add_mesh(&mut dev, &cube, MeshPlacement::default()).unwrap();
    let c = scene.add_mesh(&mut dev, &cube, MeshPlacement::default()).unwrap();
    assert_eq!(dev.live_buffers(), 6);

    let vb = scene.record(b).unwrap().vertex_buffer();
    assert!(scene.remove_mesh(&mut dev, b));
    assert_eq!(dev.live_buffers(), 4);
    assert_eq!(dev.live_vertex_arrays(), 2);
    assert!(dev.buffer_contents(vb).is_none());

    dev.clear_commands();
    scene.render(&mut dev);
    let drawn: Vec<_> = dev.draw_calls().into_iter().map(|d| d.vertex_array).collect();
    assert_eq!(
        drawn,
        vec![
            Some(scene.record(a).unwrap().vertex_array()),
            Some(scene.record(c).unwrap().vertex_array()),
        ]
    );
}

#[test]
fn index_size_selects_width() {
    let mut dev = RecordingDevice::new();
    let mut scene = scene_with_shaders(&mut dev);
    let small = scene
        .add_mesh(&mut dev, &unit_cube::<u16>(0), MeshPlacement::default())
        .unwrap();
    let large = scene
        .add_mesh(&mut dev, &unit_cube::<u32>(0), MeshPlacement::default())
        .unwrap();
    assert_eq!(scene.record(small).unwrap().index_width(), IndexWidth::U16);
    assert_eq!(scene.record(large).unwrap().index_width(), IndexWidth::U32);
}

#[test]
fn buffers_hold_mesh_bytes_verbatim() {
    let mut dev = RecordingDevice::new();
    let mut scene = Scene::new();
    let cube = unit_cube::<u32>(7);
    let id = scene.add_mesh(&mut dev, &cube, MeshPlacement::default()).unwrap();
    let record = scene.record(id).unwrap();

    assert_eq!(record.index_count(), 36);
    assert_eq!(dev.buffer_contents(record.vertex_buffer()), Some(cube.vertex_bytes()));
    assert_eq!(dev.buffer_contents(record.index_buffer()), Some(cube.index_bytes()));
    assert_eq!(dev.buffer_kind(record.index_buffer()), Some(BufferKind::Index));
    assert_eq!(
        dev.vertex_array_buffers(record.vertex_array()),
        Some((record.vertex_buffer(), record.index_buffer()))
    );
}

/// Mesh with more auxiliary words per vertex than the shader interface accepts.
struct WideMesh {
    vertices: Vec<u8>,
    indices: Vec<u16>,
}

impl MeshSource for WideMesh {
    fn vertex_count(&self) -> usize {
        3
    }
    fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }
    fn vertex_layout(&self) -> asset::VertexLayout {
        asset::VertexLayout {
            stride: 48,
            position_offset: 0,
            normal_offset: 12,
            data_offset: 24,
            data_components: 6,
        }
    }
    fn index_count(&self) -> usize {
        self.indices.len()
    }
    fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
    fn index_size(&self) -> usize {
        2
    }
}

#[test]
fn wide_vertex_data_is_clamped_to_four_components() {
    let mut dev = RecordingDevice::new();
    let mut scene = Scene::new();
    let mesh = WideMesh {
        vertices: vec![0; 3 * 48],
        indices: vec![0, 1, 2],
    };
    let id = scene.add_mesh(&mut dev, &mesh, MeshPlacement::default()).unwrap();
    let attrs = dev
        .vertex_array_attributes(scene.record(id).unwrap().vertex_array())
        .unwrap();
    assert_eq!(attrs.len(), 3);
    assert_eq!(attrs[2].format, AttributeFormat::Uint32 { components: 4 });
    assert_eq!(attrs[2].offset, 24);
}

#[test]
fn color_vertices_bind_four_data_words() {
    let mut dev = RecordingDevice::new();
    let mut scene = Scene::new();
    let mesh: MeshData<ColorVertex, u16> = MeshData::new(
        vec![ColorVertex::new([0.0; 3], [0.0, 1.0, 0.0], [1, 2, 3, 4]); 3],
        vec![0, 1, 2],
    );
    let id = scene.add_mesh(&mut dev, &mesh, MeshPlacement::default()).unwrap();
    let attrs = dev
        .vertex_array_attributes(scene.record(id).unwrap().vertex_array())
        .unwrap();
    assert_eq!(attrs[2].format, AttributeFormat::Uint32 { components: 4 });
    assert_eq!(attrs[2].offset, 24);
}

#[test]
fn empty_mesh_is_refused() {
    let mut dev = RecordingDevice::new();
    let mut scene = Scene::new();
    let empty: MeshData<ColorVertex, u32> = MeshData::new(vec![], vec![]);
    let err = scene
        .add_mesh(&mut dev, &empty, MeshPlacement::default())
        .unwrap_err();
    assert!(matches!(err, UploadError::EmptyMesh { .. }));
    assert!(scene.is_empty());
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn broken_shader_reports_diagnostics() {
    let mut dev = RecordingDevice::new();
    let mut scene = Scene::new();
    let program = *scene.setup_shaders(&mut dev, "@vertex fn vs_main(", DEFAULT_FRAGMENT_SHADER);
    assert!(!program.is_linked());
    assert!(program.model.is_none());
    let log = dev.program_info_log(program.handle()).unwrap();
    assert!(!log.is_empty());

    // A failed program is still bound for the frame; its draws carry no uniforms.
    scene
        .add_mesh(&mut dev, &unit_cube::<u16>(0), MeshPlacement::default())
        .unwrap();
    dev.clear_commands();
    scene.render(&mut dev);
    assert_eq!(dev.draw_calls().len(), 1);
    assert!(dev.draw_calls()[0].uniforms.is_empty());
}
