//! Array-texture materials and the animation state they share.
//!
//! Every material binds the same [`SharedAnimationState`] uniform buffer, so
//! one write per frame moves the visible layer and flow offset of all of
//! them at once. The engines only ever see materials through the
//! [`ArrayTextureMaterial`] trait.

use wgpu::util::DeviceExt;

use crate::data_structures::{texture::ArrayTexture, tile_state::AnimationUniform};

/// Bindings: current tile, next tile, sampler, shared animation uniform.
pub fn array_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let array_texture = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2Array,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            array_texture(0),
            array_texture(1),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("array material layout"),
    })
}

/// The one uniform buffer holding layer index and flow offset.
#[derive(Debug)]
pub struct SharedAnimationState {
    buffer: wgpu::Buffer,
    current: AnimationUniform,
}

impl SharedAnimationState {
    pub fn new(device: &wgpu::Device) -> Self {
        let current = AnimationUniform {
            layer_count: 1,
            ..Default::default()
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shared animation uniform"),
            contents: bytemuck::cast_slice(&[current]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self { buffer, current }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn current(&self) -> AnimationUniform {
        self.current
    }

    /// Writes `uniform` if it differs from what the GPU already has.
    ///
    /// Returns `true` when a write was queued.
    pub fn write(&mut self, queue: &wgpu::Queue, uniform: AnimationUniform) -> bool {
        if self.current == uniform {
            return false;
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
        self.current = uniform;
        true
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    /// One tile, layer cycling only.
    Layer,
    /// A pair of adjacent tiles slid by the flow offset.
    Flow,
}

/// Anything the ribbon can be drawn with.
pub trait ArrayTextureMaterial {
    fn kind(&self) -> MaterialKind;

    /// Tiles sampled by this material as `(current, next)`. Equal for layer materials.
    fn tiles(&self) -> (usize, usize);

    fn bind_group(&self) -> &wgpu::BindGroup;
}

fn material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    current: &ArrayTexture,
    next: &ArrayTexture,
    sampler: &wgpu::Sampler,
    shared: &SharedAnimationState,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&current.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&next.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: shared.buffer().as_entire_binding(),
            },
        ],
        label: Some(label),
    })
}

#[derive(Debug)]
pub struct LayerMaterial {
    tile: usize,
    bind_group: wgpu::BindGroup,
}

impl LayerMaterial {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        tile: usize,
        texture: &ArrayTexture,
        sampler: &wgpu::Sampler,
        shared: &SharedAnimationState,
    ) -> Self {
        let label = format!("layer material {tile}");
        let bind_group =
            material_bind_group(device, layout, texture, texture, sampler, shared, &label);
        Self {
            tile,
            bind_group,
        }
    }
}

impl ArrayTextureMaterial for LayerMaterial {
    fn kind(&self) -> MaterialKind {
        MaterialKind::Layer
    }

    fn tiles(&self) -> (usize, usize) {
        (self.tile, self.tile)
    }

    fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[derive(Debug)]
pub struct FlowMaterial {
    current: usize,
    next: usize,
    bind_group: wgpu::BindGroup,
}

impl FlowMaterial {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        (current, next): (usize, usize),
        textures: (&ArrayTexture, &ArrayTexture),
        sampler: &wgpu::Sampler,
        shared: &SharedAnimationState,
    ) -> Self {
        let label = format!("flow material {current}->{next}");
        let bind_group =
            material_bind_group(device, layout, textures.0, textures.1, sampler, shared, &label);
        Self {
            current,
            next,
            bind_group,
        }
    }
}

impl ArrayTextureMaterial for FlowMaterial {
    fn kind(&self) -> MaterialKind {
        MaterialKind::Flow
    }

    fn tiles(&self) -> (usize, usize) {
        (self.current, self.next)
    }

    fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}
