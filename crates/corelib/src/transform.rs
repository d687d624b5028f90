use crate::{Mat4, Vec3};

/// Per-mesh rigid transform: pivot offset, axis-angle rotation, uniform
/// scale and translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshTransform {
    pub translation: Vec3,
    pub scale: f32,
    /// Rotation pivot in mesh-local space.
    pub offset: Vec3,
    /// Expected to be unit length; [`Mat4::rotation`] does not normalize it.
    pub rotation_axis: Vec3,
    /// Radians.
    pub rotation_angle: f32,
}

impl MeshTransform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: 1.0,
            offset: Vec3::ZERO,
            rotation_axis: Vec3::Y,
            rotation_angle: 0.0,
        }
    }

    #[inline]
    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    #[inline]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    #[inline]
    pub fn with_rotation(mut self, axis: Vec3, angle: f32) -> Self {
        self.rotation_axis = axis;
        self.rotation_angle = angle;
        self
    }

    /// Advance the rotation angle (animation helper).
    #[inline]
    pub fn rotate_by(&mut self, delta: f32) {
        self.rotation_angle += delta;
    }

    /// Model matrix = ScaleTranslate * Rotation * Translate(-offset).
    ///
    /// The pivot correction is applied first, so the mesh rotates about
    /// `offset` rather than its local origin.
    pub fn model_matrix(&self) -> Mat4 {
        let pivot = Mat4::translation(-self.offset.x, -self.offset.y, -self.offset.z);
        let rot = Mat4::rotation(self.rotation_axis, self.rotation_angle);
        let rotated = rot * pivot;
        let scale_translate = Mat4::uniform_scale_translation(self.scale, self.translation);
        scale_translate * rotated
    }
}

impl Default for MeshTransform {
    fn default() -> Self {
        Self::identity()
    }
}
