use std::borrow::Cow;

use crate::compile::{
    compile_stage, BindingEntry, BindingKind, ProgramInterface, ScalarType, ShaderError,
    StageKind, UniformKind,
};

use super::uniforms::{UniformBlock, UniformValue, UniformWrite};
use super::{GpuContext, GpuResource, Texture};

/// Vertex attribute the quad buffer feeds.
pub const QUAD_ATTRIBUTE: &str = "vertexPosition";

const QUAD_STRIDE: wgpu::BufferAddress = 8;

/// Linked vertex/fragment pair with its reflected slot tables.
///
/// The quad vertex layout is baked into the pipeline at link time, so a
/// program can only draw from a [`super::VertexBuffer`] of `vec2` positions.
pub struct ShaderProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    interface: ProgramInterface,
    uniforms: UniformBlock,
    uniform_buffer: Option<wgpu::Buffer>,
}

impl ShaderProgram {
    pub fn new(
        context: &GpuContext,
        vertex_source: &str,
        fragment_source: &str,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let vertex = compile_stage(StageKind::Vertex, vertex_source)?;
        let fragment = compile_stage(StageKind::Fragment, fragment_source)?;
        let interface = ProgramInterface::reflect(&vertex, &fragment)?;

        let position = interface
            .attribute(QUAD_ATTRIBUTE)
            .ok_or_else(|| ShaderError::Link {
                diagnostic: format!("vertex shader does not declare `{QUAD_ATTRIBUTE}`"),
            })?;
        if position.ty.scalar != ScalarType::Float || position.ty.components != 2 {
            return Err(ShaderError::Link {
                diagnostic: format!(
                    "`{QUAD_ATTRIBUTE}` must be a vec2, found {}",
                    position.ty
                ),
            });
        }
        let vertex_attributes = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: position.location,
        }];

        let device = &context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lattice vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(vertex_source),
                stage: wgpu::naga::ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lattice fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(fragment_source),
                stage: wgpu::naga::ShaderStage::Fragment,
                defines: &[],
            },
        });

        let layout_entries: Vec<_> = interface.bindings.iter().map(layout_entry).collect();
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lattice bind layout"),
            entries: &layout_entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lattice pipeline layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lattice pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: QUAD_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &vertex_attributes,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Link {
                diagnostic: error.to_string(),
            });
        }

        let uniforms = UniformBlock::from_interface(&interface);
        let uniform_buffer = (!uniforms.is_empty()).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lattice uniforms"),
                size: uniforms.as_bytes().len() as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        for slot in &interface.uniforms {
            tracing::debug!(name = %slot.name, kind = %slot.kind, "active uniform");
        }
        for attribute in &interface.attributes {
            tracing::debug!(
                name = %attribute.name,
                location = attribute.location,
                ty = %attribute.ty,
                "active attribute"
            );
        }

        Ok(Self {
            label: "lattice program".to_string(),
            pipeline,
            bind_layout,
            interface,
            uniforms,
            uniform_buffer,
        })
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Slot of the texture uniform called `name`, if the program declares it.
    pub fn texture_slot(&self, name: &str) -> Option<u32> {
        match self.interface.uniform(name).map(|slot| &slot.kind) {
            Some(UniformKind::Texture { binding }) => Some(*binding),
            _ => None,
        }
    }

    /// Stages a uniform write; it reaches the GPU on the next [`Self::use_program`].
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        match self.uniforms.set(name, value) {
            UniformWrite::Written => {}
            UniformWrite::Unknown => {
                tracing::trace!(name, "uniform not active in program; ignoring");
            }
            UniformWrite::Mismatch { expected } => {
                tracing::warn!(name, %expected, ?value, "uniform type mismatch; skipping write");
            }
        }
    }

    /// Flushes staged uniforms and activates the pipeline with `texture`
    /// bound to every texture/sampler slot the program declares.
    pub fn use_program(
        &mut self,
        context: &GpuContext,
        pass: &mut wgpu::RenderPass<'_>,
        texture: &Texture,
    ) {
        if let (Some(buffer), Some(bytes)) = (self.uniform_buffer.as_ref(), self.uniforms.take_dirty())
        {
            context.queue.write_buffer(buffer, 0, bytes);
        }

        let mut entries = Vec::with_capacity(self.interface.bindings.len());
        for entry in &self.interface.bindings {
            let binding = texture.binding(entry.binding);
            let resource = match entry.kind {
                BindingKind::UniformBuffer { .. } => match self.uniform_buffer.as_ref() {
                    Some(buffer) => buffer.as_entire_binding(),
                    None => continue,
                },
                BindingKind::Texture => wgpu::BindingResource::TextureView(binding.view),
                BindingKind::Sampler { .. } => wgpu::BindingResource::Sampler(binding.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.slot,
                resource,
            });
        }

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lattice bind group"),
            layout: &self.bind_layout,
            entries: &entries,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
    }
}

impl GpuResource for ShaderProgram {
    fn label(&self) -> &str {
        &self.label
    }

    fn destroy(self) {
        if let Some(buffer) = self.uniform_buffer {
            buffer.destroy();
        }
    }
}

fn layout_entry(entry: &BindingEntry) -> wgpu::BindGroupLayoutEntry {
    let ty = match entry.kind {
        BindingKind::UniformBuffer { .. } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingKind::Sampler { comparison: false } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
        BindingKind::Sampler { comparison: true } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        }
    };
    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility: entry.visibility,
        ty,
        count: None,
    }
}
