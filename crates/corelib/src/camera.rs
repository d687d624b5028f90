use crate::{Mat4, MathResult, Vec3};

/// Perspective frustum parameters (OpenGL clip space).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y_degrees,
            aspect,
            near,
            far,
        }
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov_y_degrees, self.aspect.max(1e-6), self.near, self.far)
    }

    #[inline]
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(60.0, 1.0, 0.1, 100.0)
    }
}

/// Untilted look-at camera (world up is `+Y`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        Self { eye, target }
    }

    /// Fails for `eye == target` or a view direction parallel to `+Y`.
    #[inline]
    pub fn view(&self) -> MathResult<Mat4> {
        Mat4::look_at(self.eye, self.target)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO)
    }
}
