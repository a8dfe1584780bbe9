//! Math utilities and types
//!
//! nalgebra aliases plus the fixed camera transform of the cube scene.

use ash::vk;
pub use nalgebra::{Matrix4, Perspective3, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Vertical field of view of the scene camera
pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
/// Near clip plane
pub const NEAR_PLANE: f32 = 0.1;
/// Far clip plane
pub const FAR_PLANE: f32 = 100.0;

/// Camera position
pub fn camera_eye() -> Point3 {
    Point3::new(-5.0, 3.0, -10.0)
}

/// Point the camera looks at
pub fn camera_target() -> Point3 {
    Point3::origin()
}

/// Camera up direction; negative y so the OpenGL-style projection lands upright
pub fn camera_up() -> Vec3 {
    Vec3::new(0.0, -1.0, 0.0)
}

/// Converts OpenGL clip space to Vulkan: flips y and maps z from [-1, 1] to [0, 1]
#[rustfmt::skip]
pub fn vulkan_clip_correction() -> Mat4 {
    Mat4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Right-handed perspective projection for the given surface extent
pub fn projection_matrix(extent: vk::Extent2D) -> Mat4 {
    let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;
    Perspective3::new(aspect, FIELD_OF_VIEW_DEGREES.to_radians(), NEAR_PLANE, FAR_PLANE)
        .to_homogeneous()
}

/// View matrix of the fixed camera
pub fn view_matrix() -> Mat4 {
    Mat4::look_at_rh(&camera_eye(), &camera_target(), &camera_up())
}

/// Clip correction * projection * view * model, with an identity model
pub fn mvp_matrix(extent: vk::Extent2D) -> Mat4 {
    let model = Mat4::identity();
    vulkan_clip_correction() * projection_matrix(extent) * view_matrix() * model
}

/// Column-major floats, the layout of a GLSL `mat4`
pub fn mat4_to_array(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 500,
        height: 500,
    };

    #[test]
    fn test_clip_correction_maps_depth_range() {
        let clip = vulkan_clip_correction();
        let near = clip * Vec4::new(0.0, 1.0, -1.0, 1.0);
        let far = clip * Vec4::new(0.0, 1.0, 1.0, 1.0);

        assert_relative_eq!(near.z, 0.0);
        assert_relative_eq!(far.z, 1.0);
        assert_relative_eq!(near.y, -1.0);
    }

    #[test]
    fn test_origin_projects_to_screen_center() {
        let clip = mvp_matrix(EXTENT) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let distance = (camera_eye() - camera_target()).norm();

        assert_relative_eq!(clip.w, distance, epsilon = 1e-4);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }

    #[test]
    fn test_cube_corners_inside_frustum() {
        let mvp = mvp_matrix(EXTENT);
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    let clip = mvp * Vec4::new(x, y, z, 1.0);
                    assert!(clip.w > 0.0);
                    assert!(clip.x.abs() <= clip.w);
                    assert!(clip.y.abs() <= clip.w);
                    assert!(clip.z >= 0.0 && clip.z <= clip.w);
                }
            }
        }
    }

    #[test]
    fn test_aspect_follows_extent() {
        let wide = projection_matrix(vk::Extent2D {
            width: 800,
            height: 400,
        });
        let square = projection_matrix(EXTENT);

        assert_relative_eq!(wide[(1, 1)], square[(1, 1)]);
        assert_relative_eq!(wide[(0, 0)] * 2.0, square[(0, 0)], epsilon = 1e-6);
    }

    #[test]
    fn test_array_is_column_major() {
        let translation = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let array = mat4_to_array(&translation);

        assert_eq!(&array[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(array[15], 1.0);
        assert_eq!(array[3], 0.0);
    }

    #[test]
    fn test_corner_facing_camera_is_nearer() {
        let mvp = mvp_matrix(EXTENT);
        let depth = |p: Vec4| {
            let clip = mvp * p;
            clip.z / clip.w
        };

        let facing = depth(Vec4::new(-1.0, 1.0, -1.0, 1.0));
        let opposite = depth(Vec4::new(1.0, -1.0, 1.0, 1.0));
        assert!(facing < opposite);
    }
}
