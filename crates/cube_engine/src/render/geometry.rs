//! Static cube geometry
//!
//! A unit cube as 12 non-indexed triangles. All triangles share one winding
//! orientation relative to the cube center, which the pipeline's clockwise
//! front face and back-face culling rely on.

use bytemuck::{Pod, Zeroable};

/// Number of vertices drawn per frame: 6 faces, 2 triangles each
pub const CUBE_VERTEX_COUNT: u32 = 36;

/// Homogeneous position plus RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// Position, w = 1
    pub position: [f32; 4],
    /// RGBA color
    pub color: [f32; 4],
}

/// Homogeneous position plus texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UvVertex {
    /// Position, w = 1
    pub position: [f32; 4],
    /// Texture coordinate in [0, 1]
    pub uv: [f32; 2],
}

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const YELLOW: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const MAGENTA: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
const CYAN: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

const fn cv(x: f32, y: f32, z: f32, color: [f32; 4]) -> ColorVertex {
    ColorVertex {
        position: [x, y, z, 1.0],
        color,
    }
}

/// Cube with one solid color per face
pub const SOLID_FACE_COLORS: [ColorVertex; CUBE_VERTEX_COUNT as usize] = [
    // +z
    cv(-1.0, -1.0, 1.0, RED),
    cv(-1.0, 1.0, 1.0, RED),
    cv(1.0, -1.0, 1.0, RED),
    cv(1.0, -1.0, 1.0, RED),
    cv(-1.0, 1.0, 1.0, RED),
    cv(1.0, 1.0, 1.0, RED),
    // -z
    cv(-1.0, -1.0, -1.0, GREEN),
    cv(1.0, -1.0, -1.0, GREEN),
    cv(-1.0, 1.0, -1.0, GREEN),
    cv(-1.0, 1.0, -1.0, GREEN),
    cv(1.0, -1.0, -1.0, GREEN),
    cv(1.0, 1.0, -1.0, GREEN),
    // -x
    cv(-1.0, 1.0, 1.0, BLUE),
    cv(-1.0, -1.0, 1.0, BLUE),
    cv(-1.0, 1.0, -1.0, BLUE),
    cv(-1.0, 1.0, -1.0, BLUE),
    cv(-1.0, -1.0, 1.0, BLUE),
    cv(-1.0, -1.0, -1.0, BLUE),
    // +x
    cv(1.0, 1.0, 1.0, YELLOW),
    cv(1.0, 1.0, -1.0, YELLOW),
    cv(1.0, -1.0, 1.0, YELLOW),
    cv(1.0, -1.0, 1.0, YELLOW),
    cv(1.0, 1.0, -1.0, YELLOW),
    cv(1.0, -1.0, -1.0, YELLOW),
    // +y
    cv(1.0, 1.0, 1.0, MAGENTA),
    cv(-1.0, 1.0, 1.0, MAGENTA),
    cv(1.0, 1.0, -1.0, MAGENTA),
    cv(1.0, 1.0, -1.0, MAGENTA),
    cv(-1.0, 1.0, 1.0, MAGENTA),
    cv(-1.0, 1.0, -1.0, MAGENTA),
    // -y
    cv(1.0, -1.0, 1.0, CYAN),
    cv(1.0, -1.0, -1.0, CYAN),
    cv(-1.0, -1.0, 1.0, CYAN),
    cv(-1.0, -1.0, 1.0, CYAN),
    cv(1.0, -1.0, -1.0, CYAN),
    cv(-1.0, -1.0, -1.0, CYAN),
];

/// Same cube with per-face texture coordinates instead of colors
pub fn textured_cube() -> Vec<UvVertex> {
    SOLID_FACE_COLORS
        .iter()
        .map(|vertex| {
            let [x, y, z, _] = vertex.position;
            // Project onto the two axes that vary across the vertex's face
            let (u, v) = if vertex.color == RED || vertex.color == GREEN {
                (x, y)
            } else if vertex.color == BLUE || vertex.color == YELLOW {
                (z, y)
            } else {
                (x, z)
            };
            UvVertex {
                position: vertex.position,
                uv: [(u + 1.0) * 0.5, (v + 1.0) * 0.5],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(a: [f32; 4], b: [f32; 4]) -> [f32; 3] {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    #[test]
    fn test_cube_has_twelve_triangles() {
        assert_eq!(SOLID_FACE_COLORS.len(), 36);
        assert_eq!(SOLID_FACE_COLORS.len() / 3, 12);
        assert_eq!(textured_cube().len(), SOLID_FACE_COLORS.len());
    }

    #[test]
    fn test_all_triangles_share_winding() {
        for tri in SOLID_FACE_COLORS.chunks_exact(3) {
            let normal = cross(
                sub(tri[1].position, tri[0].position),
                sub(tri[2].position, tri[0].position),
            );
            let centroid: Vec<f32> = (0..3)
                .map(|axis| tri.iter().map(|v| v.position[axis]).sum::<f32>() / 3.0)
                .collect();
            let facing: f32 = (0..3).map(|axis| normal[axis] * centroid[axis]).sum();
            assert!(facing < 0.0, "triangle {tri:?} is wound the other way");
        }
    }

    #[test]
    fn test_texture_coordinates_in_unit_range() {
        for vertex in textured_cube() {
            assert!(vertex.uv.iter().all(|c| (0.0..=1.0).contains(c)));
            assert_eq!(vertex.position[3], 1.0);
        }
    }

    #[test]
    fn test_vertices_are_plain_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&SOLID_FACE_COLORS);
        assert_eq!(bytes.len(), 36 * 32);
    }
}
