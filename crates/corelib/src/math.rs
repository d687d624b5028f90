//! Fixed-size vector and matrix types used for all transform composition.
//!
//! [`Mat4`] is column-major: element `(col, row)` lives at index `col * 4 + row`.
//! That is also the layout a `mat4x4<f32>` uniform expects, so a matrix can be
//! uploaded with `bytemuck::bytes_of` and no transposition.

use std::ops::{Add, Mul, Neg, Sub};

use bytemuck::{Pod, Zeroable};

use crate::error::{MathError, MathResult};

/// Three-component vector.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline]
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// `self × rhs`.
    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - rhs.y * self.z,
            self.z * rhs.x - rhs.z * self.x,
            self.x * rhs.y - rhs.x * self.y,
        )
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Divides the vector in place by its magnitude.
    ///
    /// The caller must guarantee a non-zero magnitude; a zero vector comes out
    /// as NaN. Use [`Vec3::try_normalize`] when the input is not trusted.
    #[inline]
    pub fn normalize(&mut self) {
        let mag = self.length();
        self.x /= mag;
        self.y /= mag;
        self.z /= mag;
    }

    /// By-value form of [`Vec3::normalize`], same precondition.
    #[inline]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Unit vector in the same direction, or `None` for zero/non-finite input.
    pub fn try_normalize(self) -> Option<Self> {
        let mag = self.length();
        if mag > 0.0 && mag.is_finite() {
            Some(self * mag.recip())
        } else {
            None
        }
    }

    /// Checked normalization reporting [`MathError::ZeroLengthVector`].
    pub fn normalize_checked(self) -> MathResult<Self> {
        self.try_normalize().ok_or(MathError::ZeroLengthVector)
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn abs_diff_eq(self, rhs: Self, eps: f32) -> bool {
        (self.x - rhs.x).abs() <= eps
            && (self.y - rhs.y).abs() <= eps
            && (self.z - rhs.z).abs() <= eps
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl From<glam::Vec3> for Vec3 {
    fn from(v: glam::Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for glam::Vec3 {
    fn from(v: Vec3) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

/// `N×N` identity as an array of columns.
pub fn identity<const N: usize>() -> [[f32; N]; N] {
    let mut m = [[0.0; N]; N];
    for (i, col) in m.iter_mut().enumerate() {
        col[i] = 1.0;
    }
    m
}

/// 4×4 matrix, column-major (`index = col * 4 + row`).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub const ZERO: Self = Self([0.0; 16]);

    #[inline]
    pub fn identity() -> Self {
        Self::from_cols(identity::<4>())
    }

    pub fn from_cols(cols: [[f32; 4]; 4]) -> Self {
        let mut m = [0.0; 16];
        for (c, col) in cols.iter().enumerate() {
            m[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        Self(m)
    }

    #[inline]
    pub const fn from_cols_array(m: [f32; 16]) -> Self {
        Self(m)
    }

    #[inline]
    pub const fn to_cols_array(&self) -> [f32; 16] {
        self.0
    }

    #[inline]
    pub fn element(&self, col: usize, row: usize) -> f32 {
        self.0[col * 4 + row]
    }

    #[inline]
    pub fn column(&self, col: usize) -> [f32; 4] {
        let c = col * 4;
        [self.0[c], self.0[c + 1], self.0[c + 2], self.0[c + 3]]
    }

    /// `self * rhs`: `rhs` is applied first, then `self`.
    ///
    /// Always produces a new matrix, so `a = a.multiply(&a)` is safe.
    pub fn multiply(&self, rhs: &Self) -> Self {
        let (a, b) = (&self.0, &rhs.0);
        let mut res = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                res[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        Self(res)
    }

    /// Identity with the translation column set to `(x, y, z, 1)`.
    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }

    /// Axis-angle rotation built directly from `sin`/`cos` of `angle` (radians).
    ///
    /// `axis` must be unit length; it is not normalized here. The element
    /// placement is the transpose of the usual right-handed Rodrigues matrix,
    /// so the result turns vectors by `-angle` in the right-handed sense
    /// (clockwise looking down `axis` toward the origin).
    pub fn rotation(axis: Vec3, angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        let oc = 1.0 - c;
        let Vec3 { x, y, z } = axis;

        Self([
            oc * x * x + c,
            oc * x * y - z * s,
            oc * z * x + y * s,
            0.0,
            oc * x * y + z * s,
            oc * y * y + c,
            oc * y * z - x * s,
            0.0,
            oc * z * x - y * s,
            oc * y * z + x * s,
            oc * z * z + c,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ])
    }

    /// OpenGL-style right-handed perspective projection (clip z in `[-1, 1]`).
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_y_degrees * (std::f32::consts::PI / 360.0)).tan();

        let mut m = Self::ZERO;
        m.0[0] = f / aspect;
        m.0[5] = f;
        m.0[10] = (far + near) / (near - far);
        m.0[11] = -1.0;
        m.0[14] = (2.0 * far * near) / (near - far);
        m
    }

    /// View matrix for a camera at `eye` looking at `target`, world up `+Y`.
    ///
    /// Fails when `eye == target` or when the view direction is parallel to
    /// world up, since no right vector can be derived in either case.
    pub fn look_at(eye: Vec3, target: Vec3) -> MathResult<Self> {
        let dir = (target - eye).normalize_checked()?;

        let side = dir.cross(Vec3::Y);
        if side.length() <= 1e-6 {
            return Err(MathError::DegenerateBasis);
        }
        let right = side.normalized();
        let up = right.cross(dir).normalized();

        let basis = Self([
            right.x, up.x, -dir.x, 0.0, //
            right.y, up.y, -dir.y, 0.0, //
            right.z, up.z, -dir.z, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);

        Ok(basis * Self::translation(-eye.x, -eye.y, -eye.z))
    }

    /// Uniform scale on all four diagonal entries, translation column `t * scale`.
    pub fn uniform_scale_translation(scale: f32, t: Vec3) -> Self {
        let mut m = Self::ZERO;
        m.0[0] = scale;
        m.0[5] = scale;
        m.0[10] = scale;
        m.0[15] = scale;
        m.0[12] = t.x * scale;
        m.0[13] = t.y * scale;
        m.0[14] = t.z * scale;
        m
    }

    pub fn mul_vec4(&self, v: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (row, o) in out.iter_mut().enumerate() {
            *o = (0..4).map(|k| self.0[k * 4 + row] * v[k]).sum();
        }
        out
    }

    /// Transforms `(p, 1)` and divides by the resulting `w`.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let [x, y, z, w] = self.mul_vec4([p.x, p.y, p.z, 1.0]);
        Vec3::new(x / w, y / w, z / w)
    }

    pub fn approx_eq(&self, rhs: &Self, eps: f32) -> bool {
        self.0.iter().zip(rhs.0.iter()).all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat4 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}

impl From<Mat4> for glam::Mat4 {
    fn from(m: Mat4) -> Self {
        glam::Mat4::from_cols_array(&m.0)
    }
}

impl From<glam::Mat4> for Mat4 {
    fn from(m: glam::Mat4) -> Self {
        Self(m.to_cols_array())
    }
}
