//! Core types: vector/matrix math, mesh transforms, camera.

pub mod camera;
pub mod error;
pub mod math;
pub mod transform;

pub use camera::{Camera, Projection};
pub use error::{MathError, MathResult};
pub use math::{Mat4, Vec3, identity};
pub use transform::MeshTransform;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_identity_matrix() {
        let t = MeshTransform::identity();
        assert_eq!(t.model_matrix(), Mat4::IDENTITY);
        assert_eq!(MeshTransform::default(), t);
        assert_eq!(t.rotation_axis, Vec3::Y);
    }

    #[test]
    fn translate_then_scale_matrix() {
        let t = MeshTransform::identity()
            .with_translation(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(2.0);
        // Translation column carries translation * scale, all four diagonal
        // entries carry the scale.
        let m = t.model_matrix().to_cols_array();
        assert!((m[12] - 2.0).abs() < 1e-6);
        assert!((m[13] - 4.0).abs() < 1e-6);
        assert!((m[14] - 6.0).abs() < 1e-6);
        assert!((m[0] - 2.0).abs() < 1e-6);
        assert!((m[5] - 2.0).abs() < 1e-6);
        assert!((m[10] - 2.0).abs() < 1e-6);
        assert!((m[15] - 2.0).abs() < 1e-6);

        let p = t.model_matrix().transform_point(Vec3::new(1.0, 1.0, 1.0));
        assert!(p.abs_diff_eq(Vec3::new(2.0, 3.0, 4.0), 1e-5));
    }

    #[test]
    fn rotation_happens_about_pivot() {
        let offset = Vec3::new(2.0, 0.0, 0.0);
        let t = MeshTransform::identity()
            .with_offset(offset)
            .with_rotation(Vec3::Y, std::f32::consts::PI);
        let m = t.model_matrix();

        // The pivot lands on the mesh origin and does not move under rotation.
        assert!(m.transform_point(offset).abs_diff_eq(Vec3::ZERO, 1e-5));
        // A point one unit past the pivot swings to the other side.
        let p = m.transform_point(Vec3::new(3.0, 0.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn pivot_is_applied_before_rotation() {
        let t = MeshTransform::identity()
            .with_offset(Vec3::new(1.0, 0.0, 0.0))
            .with_rotation(Vec3::Z, 0.8);
        let expected = Mat4::rotation(Vec3::Z, 0.8) * Mat4::translation(-1.0, 0.0, 0.0);
        assert!(t.model_matrix().approx_eq(&expected, 1e-6));

        let swapped = Mat4::translation(-1.0, 0.0, 0.0) * Mat4::rotation(Vec3::Z, 0.8);
        assert!(!t.model_matrix().approx_eq(&swapped, 1e-3));
    }

    #[test]
    fn rotate_by_accumulates_angle() {
        let mut t = MeshTransform::identity();
        t.rotate_by(0.25);
        t.rotate_by(0.5);
        assert!((t.rotation_angle - 0.75).abs() < 1e-6);
        assert_ne!(t.model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn camera_pv_is_finite() {
        let cam = Camera::new(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
        let proj = Projection::new(60.0, 16.0 / 9.0, 0.1, 100.0);
        let pv = proj.matrix() * cam.view().expect("valid camera");
        assert!(pv.to_cols_array().iter().all(|f| f.is_finite()));
    }

    #[test]
    fn camera_looking_straight_down_is_rejected() {
        let cam = Camera::new(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        assert_eq!(cam.view(), Err(MathError::DegenerateBasis));
    }

    #[test]
    fn projection_aspect_override() {
        let p = Projection::default().with_aspect(2.0);
        assert_eq!(p.aspect, 2.0);
        let m = p.matrix();
        assert!((m.element(0, 0) * 2.0 - m.element(1, 1)).abs() < 1e-6);
    }
}
