//! Vulkan-specific vertex layout definitions
//!
//! Vertex input state descriptions for the geometry types, kept out of the
//! geometry module so the vertex data itself stays backend-agnostic.

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::geometry::{ColorVertex, UvVertex};

/// Vertex type that knows how it is laid out in a single vertex binding
pub trait VulkanVertexLayout: bytemuck::Pod {
    /// Attribute descriptions, in shader location order
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;

    /// Distance in bytes between consecutive vertices
    fn stride() -> u32 {
        // Vertex structs are a handful of floats
        size_of::<Self>() as u32
    }

    /// Per-vertex binding 0 description
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }
}

impl VulkanVertexLayout for ColorVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // Position attribute (location = 0)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(ColorVertex, position) as u32,
            },
            // Color attribute (location = 1)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(ColorVertex, color) as u32,
            },
        ]
    }
}

impl VulkanVertexLayout for UvVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(UvVertex, position) as u32,
            },
            // Texture coordinate attribute (location = 1)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(UvVertex, uv) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_vertex_layout() {
        assert_eq!(ColorVertex::stride(), 32);
        let attributes = ColorVertex::attribute_descriptions();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 16);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn test_uv_vertex_layout() {
        let binding = UvVertex::binding_description();
        assert_eq!(binding.stride, 24);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attributes = UvVertex::attribute_descriptions();
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].offset, 16);
    }
}
