use std::{
    collections::HashMap,
    sync::Arc
};

use bytemuck::{
    Pod,
    Zeroable
};

use wgpu::util::DeviceExt;

use winit::window::Window;

use crate::game::math::Color;

use super::gfx::{
    BufferId,
    GraphicsContext,
    GraphicsError,
    ProgramId,
    TextureId,
    UniformValue,
    VertexLayout,
    MAX_TEXTURE_UNIT
};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Projection and view, `uProjection` and `uView` in the shader source.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    projection: [f32; 16],
    view: [f32; 16],
}

const PROJECTION_OFFSET: u64 = 0;
const VIEW_OFFSET: u64 = 64;

/// Textures bound to units `1..=8`, `None` samples the white placeholder.
type TextureUnits = [Option<TextureId>; MAX_TEXTURE_UNIT as usize];

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuVertexBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    // Taken by the first render pass of the frame.
    clear_color: Option<wgpu::Color>,
}

/// [`GraphicsContext`] drawing into a winit window through wgpu.
///
/// Every draw call records its own render pass. The first pass of a frame
/// clears the target, later ones load it.
pub struct WgpuContext {
    window: Arc<Window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: winit::dpi::PhysicalSize<u32>,
    surface: wgpu::Surface<'static>,
    surface_format: wgpu::TextureFormat,
    camera_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    placeholder: GpuTexture,
    next_id: u32,
    vertex_buffers: HashMap<BufferId, GpuVertexBuffer>,
    index_buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    texture_bind_groups: HashMap<TextureUnits, wgpu::BindGroup>,
    bound_program: Option<ProgramId>,
    bound_textures: TextureUnits,
    frame: Option<Frame>,
}

impl WgpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .ok_or(GraphicsError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor::default(),
                None
            )
            .await?;

        let size = window.inner_size();

        let cap = surface.get_capabilities(&adapter);
        let surface_format = cap.formats.first()
            .copied()
            .ok_or(GraphicsError::NoAdapter)?;
        log::info!("Using adapter '{}' with surface format {:?}", adapter.get_info().name, surface_format);

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let mut texture_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        texture_entries.extend((1..=MAX_TEXTURE_UNIT).map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &texture_entries,
        });

        // Pixel art, no filtering between texels.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let placeholder = Self::upload_texture(&device, &queue, 1, 1, &[255; 4]);

        let context = WgpuContext {
            window,
            device,
            queue,
            size,
            surface,
            surface_format,
            camera_layout,
            texture_layout,
            sampler,
            placeholder,
            next_id: 0,
            vertex_buffers: HashMap::new(),
            index_buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            texture_bind_groups: HashMap::new(),
            bound_program: None,
            bound_textures: [None; MAX_TEXTURE_UNIT as usize],
            frame: None,
        };

        // Configure surface for the first time
        context.configure_surface();

        Ok(context)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> winit::dpi::PhysicalSize<u32> {
        self.size
    }

    fn configure_surface(&self) {
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.surface_format,
            // Request compatibility with the sRGB-format texture view we create per frame.
            view_formats: vec![self.surface_format.add_srgb_suffix()],
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            width: self.size.width,
            height: self.size.height,
            desired_maximum_frame_latency: 2,
            present_mode: wgpu::PresentMode::AutoVsync,
        };
        self.surface.configure(&self.device, &surface_config);
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn upload_texture(device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32, rgba: &[u8]) -> GpuTexture {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Sprite Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // Row 0 of the data lands at v = 0.
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture { _texture: texture, view }
    }

    fn prepare_pipeline(&self, vertex_source: &str, fragment_source: &str, layout: &VertexLayout) -> wgpu::RenderPipeline {
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sprite Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sprite Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sprite Pipeline Layout"),
            bind_group_layouts: &[&self.camera_layout, &self.texture_layout],
            push_constant_ranges: &[],
        });

        let attributes: Vec<wgpu::VertexAttribute> = layout.attributes.iter()
            .map(|attribute| wgpu::VertexAttribute {
                offset: attribute.offset,
                shader_location: attribute.location,
                format: match attribute.components {
                    1 => wgpu::VertexFormat::Float32,
                    2 => wgpu::VertexFormat::Float32x2,
                    3 => wgpu::VertexFormat::Float32x3,
                    _ => wgpu::VertexFormat::Float32x4,
                },
            })
            .collect();

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: layout.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sprite Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format.add_srgb_suffix(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn ensure_texture_bind_group(&mut self, units: TextureUnits) -> Result<(), GraphicsError> {
        if self.texture_bind_groups.contains_key(&units) {
            return Ok(());
        }

        let mut views = Vec::with_capacity(units.len());
        for unit in units.iter() {
            let view = match unit {
                Some(texture) => &self.textures.get(texture)
                    .ok_or(GraphicsError::UnknownTexture(*texture))?
                    .view,
                None => &self.placeholder.view,
            };
            views.push(view);
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        }];
        entries.extend(views.iter().zip(1..).map(|(view, binding)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Bind Group"),
            layout: &self.texture_layout,
            entries: &entries,
        });
        log::debug!("Created texture bind group for {:?}", units);
        self.texture_bind_groups.insert(units, bind_group);
        Ok(())
    }

    fn acquire_surface_texture(&mut self) -> Result<wgpu::SurfaceTexture, GraphicsError> {
        match self.surface.get_current_texture() {
            Ok(surface_texture) => Ok(surface_texture),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.configure_surface();
                Ok(self.surface.get_current_texture()?)
            },
            Err(err) => Err(err.into()),
        }
    }
}

impl GraphicsContext for WgpuContext {
    fn begin_frame(&mut self, clear_color: Color) -> Result<(), GraphicsError> {
        let surface_texture = self.acquire_surface_texture()?;

        let view = surface_texture.texture
            .create_view(&wgpu::TextureViewDescriptor {
                // Without add_srgb_suffix() the image we will be working with
                // might not be "gamma correct".
                format: Some(self.surface_format.add_srgb_suffix()),
                ..Default::default()
            });

        let encoder = self.device.create_command_encoder(&Default::default());

        self.frame = Some(Frame {
            surface_texture,
            view,
            encoder,
            clear_color: Some(wgpu::Color {
                r: clear_color.r as f64,
                g: clear_color.g as f64,
                b: clear_color.b as f64,
                a: clear_color.a as f64,
            }),
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GraphicsError> {
        let Some(mut frame) = self.frame.take() else {
            return Err(GraphicsError::NoActiveFrame);
        };

        // Nothing was drawn, the target still has to be cleared.
        if let Some(clear_color) = frame.clear_color.take() {
            let _ = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        // Submit the command in the queue to execute
        self.queue.submit([frame.encoder.finish()]);
        self.window.pre_present_notify();
        frame.surface_texture.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = winit::dpi::PhysicalSize::new(width, height);

        // reconfigure the surface
        self.configure_surface();
    }

    fn create_vertex_buffer(&mut self, size_bytes: u64, _layout: &VertexLayout) -> Result<BufferId, GraphicsError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Batch Vertex Buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = BufferId(self.allocate_id());
        self.vertex_buffers.insert(id, GpuVertexBuffer { buffer, size: size_bytes });
        Ok(id)
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<BufferId, GraphicsError> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Batch Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = BufferId(self.allocate_id());
        self.index_buffers.insert(id, buffer);
        Ok(id)
    }

    fn upload_vertices(&mut self, buffer: BufferId, offset_bytes: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let target = self.vertex_buffers.get(&buffer)
            .ok_or(GraphicsError::UnknownBuffer(buffer))?;

        if offset_bytes + data.len() as u64 > target.size {
            return Err(GraphicsError::UploadOutOfBounds {
                offset: offset_bytes,
                len: data.len() as u64,
                capacity: target.size
            });
        }

        self.queue.write_buffer(&target.buffer, offset_bytes, data);
        Ok(())
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GraphicsError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(GraphicsError::TextureDataSize { expected, actual: rgba.len() });
        }

        let texture = Self::upload_texture(&self.device, &self.queue, width, height, rgba);
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GraphicsError> {
        if unit == 0 || unit > MAX_TEXTURE_UNIT {
            return Err(GraphicsError::InvalidTextureUnit(unit));
        }
        if !self.textures.contains_key(&texture) {
            return Err(GraphicsError::UnknownTexture(texture));
        }
        self.bound_textures[unit as usize - 1] = Some(texture);
        Ok(())
    }

    fn unbind_texture(&mut self, unit: u32) {
        if (1..=MAX_TEXTURE_UNIT).contains(&unit) {
            self.bound_textures[unit as usize - 1] = None;
        }
    }

    fn compile_program(&mut self, vertex_source: &str, fragment_source: &str, layout: &VertexLayout) -> Result<ProgramId, GraphicsError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.prepare_pipeline(vertex_source, fragment_source, layout);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GraphicsError::ProgramCompile(err.to_string()));
        }

        let camera_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform {
                projection: glam::Mat4::IDENTITY.to_cols_array(),
                view: glam::Mat4::IDENTITY.to_cols_array(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &self.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, GpuProgram { pipeline, camera_buffer, camera_bind_group });
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), GraphicsError> {
        if !self.programs.contains_key(&program) {
            return Err(GraphicsError::UnknownProgram(program));
        }
        self.bound_program = Some(program);
        Ok(())
    }

    fn detach_program(&mut self) {
        self.bound_program = None;
    }

    fn bound_program(&self) -> Option<ProgramId> {
        self.bound_program
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue) -> Result<(), GraphicsError> {
        let target = self.programs.get(&program)
            .ok_or(GraphicsError::UnknownProgram(program))?;

        match (name, value) {
            ("uProjection", UniformValue::Mat4(matrix)) => {
                self.queue.write_buffer(&target.camera_buffer, PROJECTION_OFFSET, bytemuck::cast_slice(matrix));
            },
            ("uView", UniformValue::Mat4(matrix)) => {
                self.queue.write_buffer(&target.camera_buffer, VIEW_OFFSET, bytemuck::cast_slice(matrix));
            },
            // Samplers are fixed bindings here, units map to bindings 1..=8.
            ("uTextures", UniformValue::IntArray(_)) => {},
            _ => log::trace!("Uniform '{name}' has no binding, ignored"),
        }
        Ok(())
    }

    fn draw_indexed(&mut self, vertex_buffer: BufferId, index_buffer: BufferId, index_count: u32) -> Result<(), GraphicsError> {
        let program = self.bound_program.ok_or(GraphicsError::NoProgramBound)?;
        let units = self.bound_textures;
        self.ensure_texture_bind_group(units)?;

        let Self { frame, programs, vertex_buffers, index_buffers, texture_bind_groups, .. } = self;

        let frame = frame.as_mut().ok_or(GraphicsError::NoActiveFrame)?;
        let program = programs.get(&program).ok_or(GraphicsError::UnknownProgram(program))?;
        let vertices = vertex_buffers.get(&vertex_buffer).ok_or(GraphicsError::UnknownBuffer(vertex_buffer))?;
        let indices = index_buffers.get(&index_buffer).ok_or(GraphicsError::UnknownBuffer(index_buffer))?;
        let textures = texture_bind_groups.get(&units).ok_or(GraphicsError::MissingTextureBindings(units))?;

        let available = indices.size() / std::mem::size_of::<u32>() as u64;
        if index_count as u64 > available {
            return Err(GraphicsError::IndexOutOfBounds { buffer: index_buffer, requested: index_count, available });
        }

        let load = match frame.clear_color.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let mut renderpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Batch Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderpass.set_pipeline(&program.pipeline);
        renderpass.set_bind_group(0, &program.camera_bind_group, &[]);
        renderpass.set_bind_group(1, textures, &[]);
        renderpass.set_vertex_buffer(0, vertices.buffer.slice(..));
        renderpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        renderpass.draw_indexed(0..index_count, 0, 0..1);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(vertices) = self.vertex_buffers.remove(&buffer) {
            vertices.buffer.destroy();
        } else if let Some(indices) = self.index_buffers.remove(&buffer) {
            indices.destroy();
        }
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.texture_bind_groups.retain(|units, _| !units.contains(&Some(texture)));
        for unit in self.bound_textures.iter_mut().filter(|unit| **unit == Some(texture)) {
            *unit = None;
        }
        self.textures.remove(&texture);
    }

    fn release_program(&mut self, program: ProgramId) {
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.programs.remove(&program);
    }
}
