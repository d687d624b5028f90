//! The demo scene shared by the windowed and headless runners.

use anyhow::{Context, Result, bail};
use asset::{ground_quad, unit_cube};
use corelib::Vec3;
use renderer::{
    DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER, MeshPlacement, RecordId, RenderDevice, Scene,
};

/// Radians per second.
pub const SPIN_SPEED: f32 = 0.9;

const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;

pub struct Demo {
    pub scene: Scene,
    spinning: Vec<RecordId>,
}

impl Demo {
    /// Shaders, camera and a handful of meshes.
    pub fn build(device: &mut dyn RenderDevice, fov_y_degrees: f32, aspect: f32) -> Result<Self> {
        let mut scene = Scene::new();
        let program = scene.setup_shaders(device, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER);
        if !program.is_linked() {
            bail!("default shader program failed to link (see log)");
        }

        scene.set_projection(fov_y_degrees, aspect, NEAR, FAR);
        scene
            .set_camera(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO)
            .context("demo camera")?;

        let centre = scene
            .add_mesh(
                device,
                &unit_cube::<u16>(0),
                MeshPlacement::default().with_scale(1.5),
            )
            .context("upload centre cube")?;
        scene
            .add_mesh(
                device,
                &unit_cube::<u32>(1),
                MeshPlacement::at(Vec3::new(-2.5, 0.0, 0.0)),
            )
            .context("upload left cube")?;
        // Swings about its own left edge.
        let hinged = scene
            .add_mesh(
                device,
                &unit_cube::<u16>(2),
                MeshPlacement::at(Vec3::new(2.5, 0.0, 0.0)).with_offset(Vec3::new(-0.5, 0.0, 0.0)),
            )
            .context("upload hinged cube")?;
        if let Some(record) = scene.record_mut(hinged) {
            record.transform.rotation_axis = Vec3::Z;
        }
        scene
            .add_mesh(
                device,
                &ground_quad([3, 0, 0, 0]),
                MeshPlacement::at(Vec3::new(0.0, -1.2, 0.0)).with_scale(8.0),
            )
            .context("upload ground")?;

        log::info!("demo scene ready: {} meshes", scene.len());
        Ok(Self {
            scene,
            spinning: vec![centre, hinged],
        })
    }

    /// Advance the animation by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        for &id in &self.spinning {
            if let Some(record) = self.scene.record_mut(id) {
                record.transform.rotate_by(SPIN_SPEED * dt);
            }
        }
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        self.scene.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::RecordingDevice;

    #[test]
    fn demo_draws_every_mesh() {
        let mut dev = RecordingDevice::new();
        let demo = Demo::build(&mut dev, 60.0, 16.0 / 9.0).unwrap();
        dev.clear_commands();
        demo.scene.render(&mut dev);
        assert_eq!(dev.draw_calls().len(), 4);
    }

    #[test]
    fn advance_spins_only_selected_meshes() {
        let mut dev = RecordingDevice::new();
        let mut demo = Demo::build(&mut dev, 60.0, 1.0).unwrap();
        let before: Vec<_> = demo.scene.records().map(|(_, r)| r.model_matrix()).collect();
        demo.advance(0.5);
        let after: Vec<_> = demo.scene.records().map(|(_, r)| r.model_matrix()).collect();

        let changed: Vec<bool> = before.iter().zip(&after).map(|(a, b)| a != b).collect();
        assert_eq!(changed, vec![true, false, true, false]);
    }

    #[test]
    fn destroy_frees_device_resources() {
        let mut dev = RecordingDevice::new();
        let demo = Demo::build(&mut dev, 60.0, 1.0).unwrap();
        demo.destroy(&mut dev);
        assert_eq!(dev.live_buffers(), 0);
        assert_eq!(dev.live_programs(), 0);
    }
}
