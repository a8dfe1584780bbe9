//! Buffer management for vertex data and uniforms
//!
//! Host-visible, host-coherent buffers written once through a mapped-memory
//! copy, plus the memory-type search every allocation in the crate uses.

use ash::{vk, Device};
use bytemuck::Pod;
use std::mem;

use crate::render::vulkan::vertex_layout::VulkanVertexLayout;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Find the lowest memory-type index allowed by `type_bits` whose property
/// flags include every flag in `required`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&index| {
            (type_bits >> index) & 1 == 1
                && memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate device memory satisfying `requirements` with the given properties
pub(crate) fn allocate_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
}

/// Copy `data` into the start of a mapped region
pub fn write_mapped<T: Pod>(mapping: &mut [u8], data: &[T]) -> VulkanResult<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let mapping_len = mapping.len();
    let destination = mapping.get_mut(..bytes.len()).ok_or_else(|| VulkanError::InvalidOperation {
        reason: format!(
            "{} bytes do not fit a {} byte mapping",
            bytes.len(),
            mapping_len
        ),
    })?;
    destination.copy_from_slice(bytes);
    Ok(())
}

/// Read `count` values back from the start of a mapped region
#[cfg(test)]
fn read_mapped<T: Pod>(mapping: &[u8], count: usize) -> VulkanResult<Vec<T>> {
    let size = mem::size_of::<T>();
    let source = mapping
        .get(..count * size)
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("{count} values do not fit a {} byte mapping", mapping.len()),
        })?;
    Ok(source
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match allocate_memory(&device, memory_properties, mem_requirements, properties)
        {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Dropping `created` on a failed bind releases both handles
        let created = Self {
            device,
            buffer,
            memory,
            size,
        };
        unsafe {
            created
                .device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(created)
    }

    fn with_mapping<R>(&self, access: impl FnOnce(&mut [u8]) -> VulkanResult<R>) -> VulkanResult<R> {
        let size = usize::try_from(self.size).map_err(|_| VulkanError::InvalidOperation {
            reason: "Buffer too large to map".to_string(),
        })?;
        let data_ptr = unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };

        let mapping = unsafe { std::slice::from_raw_parts_mut(data_ptr.cast::<u8>(), size) };
        let result = access(mapping);

        unsafe {
            self.device.unmap_memory(self.memory);
        }
        result
    }

    /// Map, copy `data` to the start of the buffer, unmap
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.with_mapping(|mapping| write_mapped(mapping, data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn host_buffer<T: Pod>(
    device: Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> VulkanResult<Buffer> {
    let size = mem::size_of_val(data) as vk::DeviceSize;
    let buffer = Buffer::new(
        device,
        memory_properties,
        size,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    buffer.write_data(data)?;
    Ok(buffer)
}

/// Vertex buffer with the input layout of its vertex type
pub struct VertexBuffer {
    buffer: Buffer,
    vertex_count: u32,
    binding: vk::VertexInputBindingDescription,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexBuffer {
    /// Create vertex buffer with vertex data
    pub fn new<V: VulkanVertexLayout>(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        vertices: &[V],
    ) -> VulkanResult<Self> {
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: "Too many vertices".to_string(),
        })?;
        let buffer = host_buffer(device, memory_properties, vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;

        log::debug!("Uploaded {} vertices ({} bytes)", vertex_count, buffer.size());

        Ok(Self {
            buffer,
            vertex_count,
            binding: V::binding_description(),
            attributes: V::attribute_descriptions(),
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of vertices stored
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Binding description for pipeline vertex input
    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        self.binding
    }

    /// Attribute descriptions for pipeline vertex input
    pub fn attribute_descriptions(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }
}

/// Uniform buffer holding one 4x4 transform
pub struct UniformBuffer {
    buffer: Buffer,
}

impl UniformBuffer {
    /// Create the buffer and write the column-major matrix into it
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        matrix: &[f32; 16],
    ) -> VulkanResult<Self> {
        let buffer = host_buffer(
            device,
            memory_properties,
            matrix.as_slice(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        Ok(Self { buffer })
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.handle(),
            offset: 0,
            range: self.buffer.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    #[test]
    fn test_memory_type_first_set_bit_with_matching_flags() {
        let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let table = memory_table(&[
            vk::MemoryPropertyFlags::empty(),
            host_visible,
            host_visible | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::empty(),
        ]);

        assert_eq!(find_memory_type(&table, 0b0110, host_visible).unwrap(), 1);
    }

    #[test]
    fn test_memory_type_respects_bitmask() {
        let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let table = memory_table(&[
            vk::MemoryPropertyFlags::empty(),
            host_visible,
            host_visible | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        assert_eq!(find_memory_type(&table, 0b0100, host_visible).unwrap(), 2);
        assert_eq!(
            find_memory_type(
                &table,
                0b0111,
                host_visible | vk::MemoryPropertyFlags::HOST_COHERENT
            )
            .unwrap(),
            2
        );
    }

    #[test]
    fn test_memory_type_no_match() {
        let table = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            find_memory_type(&table, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Err(VulkanError::NoSuitableMemoryType)
        ));
        // Bits beyond memory_type_count are ignored
        assert!(find_memory_type(&table, 0b10, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_empty_requirement_matches_any_allowed_type() {
        let table = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        assert_eq!(find_memory_type(&table, 0b10, vk::MemoryPropertyFlags::empty()).unwrap(), 1);
    }

    #[test]
    fn test_matrix_round_trip_through_mapping() {
        let matrix: [f32; 16] = std::array::from_fn(|i| i as f32 * 0.5 - 3.25);
        // Offset by one byte so the mapping is not f32-aligned
        let mut backing = vec![0u8; 16 * 4 + 1];
        let mapping = &mut backing[1..];

        write_mapped(mapping, &matrix).unwrap();
        let read: Vec<f32> = read_mapped(mapping, 16).unwrap();

        assert_eq!(read.as_slice(), matrix.as_slice());
    }

    #[test]
    fn test_write_larger_than_mapping_fails() {
        let mut mapping = vec![0u8; 8];
        assert!(write_mapped(&mut mapping, &[1.0f32, 2.0, 3.0]).is_err());
        assert!(read_mapped::<f32>(&mapping, 3).is_err());
    }
}
