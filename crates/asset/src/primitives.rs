//! Built-in meshes for demos and tests.

use crate::mesh::{ColorVertex, IndexElement, MaterialVertex, MeshData};

/// Face table: outward normal plus four corners, counter-clockwise seen from outside.
const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
    // +Z
    (
        [0.0, 0.0, 1.0],
        [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
    ),
    // -Z
    (
        [0.0, 0.0, -1.0],
        [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]],
    ),
    // +X
    (
        [1.0, 0.0, 0.0],
        [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]],
    ),
    // -X
    (
        [-1.0, 0.0, 0.0],
        [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]],
    ),
    // +Y
    (
        [0.0, 1.0, 0.0],
        [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]],
    ),
    // -Y
    (
        [0.0, -1.0, 0.0],
        [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
    ),
];

/// Unit cube centered at the origin (side 1), flat normals, 24 vertices and
/// 36 indices. Every vertex carries `material`.
pub fn unit_cube<I>(material: u32) -> MeshData<MaterialVertex, I>
where
    I: IndexElement + From<u16>,
{
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (face, (normal, corners)) in FACES.iter().enumerate() {
        let base = (face * 4) as u16;
        vertices.extend(
            corners
                .iter()
                .map(|&corner| MaterialVertex::new(corner, *normal, material)),
        );
        indices.extend(
            [base, base + 1, base + 2, base, base + 2, base + 3]
                .into_iter()
                .map(I::from),
        );
    }

    MeshData::new(vertices, indices)
}

/// Unit square in the XZ plane facing `+Y`. `data` is stored on every
/// vertex (the first word is read as the material).
pub fn ground_quad(data: [u32; 4]) -> MeshData<ColorVertex, u16> {
    let normal = [0.0, 1.0, 0.0];
    let vertices = [
        [-0.5, 0.0, 0.5],
        [0.5, 0.0, 0.5],
        [0.5, 0.0, -0.5],
        [-0.5, 0.0, -0.5],
    ]
    .into_iter()
    .map(|p| ColorVertex::new(p, normal, data))
    .collect();
    MeshData::new(vertices, vec![0, 1, 2, 0, 2, 3])
}
