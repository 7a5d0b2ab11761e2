//! The GPU capability the sprite core draws through.
//!
//! Everything above this trait (batches, shaders, textures) only ever holds
//! opaque ids. [`crate::rendering::wgpu_backend::WgpuContext`] drives a real
//! device, [`crate::rendering::headless::HeadlessContext`] records commands in
//! memory.

use crate::game::math::Color;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub u32);

/// One `f32`-based vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u32,
    pub offset: u64,
}

/// Interleaved vertex layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: &'static [VertexAttribute],
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Mat4([f32; 16]),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Float(f32),
    Int(i32),
    IntArray(Vec<i32>),
}

#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    #[error("No suitable graphics adapter found")]
    NoAdapter,

    #[error("Could not request device, reason='{0}'")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("Could not create surface, reason='{0}'")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("Surface unavailable, reason='{0}'")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("Unknown program {0:?}")]
    UnknownProgram(ProgramId),

    #[error("Upload of {len} bytes at offset {offset} overflows buffer of {capacity} bytes")]
    UploadOutOfBounds {
        offset: u64,
        len: u64,
        capacity: u64,
    },

    #[error("Texture data has {actual} bytes, expected {expected}")]
    TextureDataSize {
        expected: usize,
        actual: usize,
    },

    #[error("Texture unit {0} is outside of the supported range")]
    InvalidTextureUnit(u32),

    #[error("Draw issued outside of a frame")]
    NoActiveFrame,

    #[error("Draw issued without a bound program")]
    NoProgramBound,

    #[error("Draw of {requested} indices reads past the {available} stored in {buffer:?}")]
    IndexOutOfBounds {
        buffer: BufferId,
        requested: u32,
        available: u64,
    },

    #[error("No texture bind group for units {0:?}")]
    MissingTextureBindings([Option<TextureId>; MAX_TEXTURE_UNIT as usize]),

    #[error("Shader program failed to compile, reason='{0}'")]
    ProgramCompile(String),
}

/// Highest texture unit a context has to support. Unit 0 is the reserved
/// "no texture" slot, units `1..=8` carry a batch's textures.
pub const MAX_TEXTURE_UNIT: u32 = 8;

pub trait GraphicsContext {
    /// Starts a frame, clearing the target with `clear_color`.
    fn begin_frame(&mut self, clear_color: Color) -> Result<(), GraphicsError>;

    /// Submits and presents everything drawn since [`Self::begin_frame`].
    fn end_frame(&mut self) -> Result<(), GraphicsError>;

    fn resize(&mut self, width: u32, height: u32);

    /// Allocates a dynamic vertex buffer of `size_bytes`, laid out as `layout`.
    fn create_vertex_buffer(&mut self, size_bytes: u64, layout: &VertexLayout) -> Result<BufferId, GraphicsError>;

    /// Allocates a static index buffer holding `indices`.
    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<BufferId, GraphicsError>;

    fn upload_vertices(&mut self, buffer: BufferId, offset_bytes: u64, data: &[u8]) -> Result<(), GraphicsError>;

    /// Uploads tightly packed RGBA8 pixels, first row is the bottom of the image.
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GraphicsError>;

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GraphicsError>;

    fn unbind_texture(&mut self, unit: u32);

    fn compile_program(&mut self, vertex_source: &str, fragment_source: &str, layout: &VertexLayout) -> Result<ProgramId, GraphicsError>;

    fn use_program(&mut self, program: ProgramId) -> Result<(), GraphicsError>;

    fn detach_program(&mut self);

    /// Program selected by the last [`Self::use_program`], if still bound.
    fn bound_program(&self) -> Option<ProgramId>;

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue) -> Result<(), GraphicsError>;

    /// Draws `index_count` indices as a triangle list with the bound program and textures.
    fn draw_indexed(&mut self, vertex_buffer: BufferId, index_buffer: BufferId, index_count: u32) -> Result<(), GraphicsError>;

    fn release_buffer(&mut self, buffer: BufferId);

    fn release_texture(&mut self, texture: TextureId);

    fn release_program(&mut self, program: ProgramId);
}
