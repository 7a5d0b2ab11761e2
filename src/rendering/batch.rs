//! Fixed-capacity sprite batch.
//!
//! A batch packs up to `max_batch_size` quads into one interleaved vertex
//! buffer and draws them with a single indexed call. Up to
//! [`MAX_BATCH_TEXTURES`] distinct textures can be sampled per batch; texture
//! slot 0 in the vertex data means "solid color, no texture".

use std::rc::Rc;

use bytemuck::{
    Pod,
    Zeroable
};

use crate::game::{
    camera::Camera,
    entity::EntityId,
    math::{Color, Vector2F},
    sprite::SpriteRenderer,
    transform::Transform
};

use super::{
    gfx::{
        BufferId,
        GraphicsContext,
        GraphicsError,
        VertexAttribute,
        VertexLayout
    },
    shader::{Shader, ShaderError},
    texture::Texture
};

pub const MAX_BATCH_TEXTURES: usize = 8;

const POS_SIZE: u32 = 2;
const COLOR_SIZE: u32 = 4;
const TEX_COORDS_SIZE: u32 = 2;
const TEX_SLOT_SIZE: u32 = 1;

const POS_OFFSET: u64 = 0;
const COLOR_OFFSET: u64 = POS_OFFSET + POS_SIZE as u64 * FLOAT_BYTES;
const TEX_COORDS_OFFSET: u64 = COLOR_OFFSET + COLOR_SIZE as u64 * FLOAT_BYTES;
const TEX_SLOT_OFFSET: u64 = TEX_COORDS_OFFSET + TEX_COORDS_SIZE as u64 * FLOAT_BYTES;

const FLOAT_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Floats per vertex: position(2) + color(4) + uv(2) + texture slot(1).
pub const VERTEX_SIZE: usize = (POS_SIZE + COLOR_SIZE + TEX_COORDS_SIZE + TEX_SLOT_SIZE) as usize;
pub const VERTEX_SIZE_BYTES: usize = VERTEX_SIZE * FLOAT_BYTES as usize;

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

/// Unit offsets of the quad corners: top-right, bottom-right, bottom-left, top-left.
pub const CORNER_OFFSETS: [Vector2F; 4] = [
    Vector2F { x: 1.0, y: 1.0 },
    Vector2F { x: 1.0, y: 0.0 },
    Vector2F { x: 0.0, y: 0.0 },
    Vector2F { x: 0.0, y: 1.0 },
];

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
    pub texture_slot: f32,
}

impl Vertex {
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: VERTEX_SIZE_BYTES as u64,
        attributes: &[
            VertexAttribute { location: 0, components: POS_SIZE, offset: POS_OFFSET },
            VertexAttribute { location: 1, components: COLOR_SIZE, offset: COLOR_OFFSET },
            VertexAttribute { location: 2, components: TEX_COORDS_SIZE, offset: TEX_COORDS_OFFSET },
            VertexAttribute { location: 3, components: TEX_SLOT_SIZE, offset: TEX_SLOT_OFFSET },
        ],
    };
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Batch is full ({0} sprites)")]
    BatchFull(usize),

    #[error("No texture slot left in batch for '{0}'")]
    TextureSlotsExhausted(String),

    #[error("Batch used before start()")]
    NotStarted,

    #[error("Batch already started")]
    AlreadyStarted,

    #[error("GraphicsError, reason='{0}'")]
    Graphics(#[from] GraphicsError),

    #[error("ShaderError, reason='{0}'")]
    Shader(#[from] ShaderError),
}

/// Everything a batch needs to build one quad. The transform is copied so
/// the batch never aliases the owning entity.
#[derive(Debug, Clone)]
pub struct SpriteQuad {
    pub owner: Option<EntityId>,
    pub transform: Transform,
    pub color: Color,
    pub texture: Option<Rc<Texture>>,
    pub uv: [Vector2F; 4],
}

impl SpriteQuad {
    pub fn new(transform: Transform, sprite: &SpriteRenderer) -> Self {
        Self {
            owner: sprite.owner(),
            transform,
            color: sprite.color(),
            texture: sprite.texture().cloned(),
            uv: sprite.tex_coords()
        }
    }
}

/// Occupant of one vertex group.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpriteSlot {
    pub owner: Option<EntityId>,
    pub texture_slot: u32,
}

#[derive(Debug, Copy, Clone)]
struct BatchBuffers {
    vertices: BufferId,
    indices: BufferId,
}

pub struct RenderBatch {
    max_batch_size: usize,
    sprites: Vec<SpriteSlot>,
    vertices: Vec<Vertex>,
    textures: Vec<Rc<Texture>>,
    shader: Rc<Shader>,
    buffers: Option<BatchBuffers>,
    has_room: bool,
}

impl RenderBatch {
    pub fn new(max_batch_size: usize, shader: Rc<Shader>) -> Self {
        Self {
            max_batch_size,
            sprites: Vec::with_capacity(max_batch_size),
            vertices: vec![Vertex::default(); max_batch_size * VERTICES_PER_QUAD],
            textures: Vec::with_capacity(MAX_BATCH_TEXTURES),
            shader,
            buffers: None,
            has_room: max_batch_size > 0,
        }
    }

    /// Allocates the GPU side: a dynamic vertex buffer for the whole capacity
    /// and a static index buffer.
    pub fn start(&mut self, gfx: &mut dyn GraphicsContext) -> Result<(), BatchError> {
        if self.buffers.is_some() {
            return Err(BatchError::AlreadyStarted);
        }

        let size_bytes = (self.vertices.len() * VERTEX_SIZE_BYTES) as u64;
        let vertices = gfx.create_vertex_buffer(size_bytes, &Vertex::LAYOUT)?;
        let indices = match gfx.create_index_buffer(&generate_indices(self.max_batch_size)) {
            Ok(indices) => indices,
            Err(e) => {
                gfx.release_buffer(vertices);
                return Err(e.into());
            }
        };

        log::debug!("Batch started, capacity {} sprites, vbo={:?} ebo={:?}", self.max_batch_size, vertices, indices);
        self.buffers = Some(BatchBuffers { vertices, indices });
        Ok(())
    }

    /// Appends a sprite at the next free slot and writes its four vertices
    /// into the local buffer. Nothing is uploaded until [`Self::render`].
    ///
    /// Rejects the sprite, leaving the batch untouched, when the batch is
    /// full or when it brings a new texture and all texture slots are taken.
    pub fn add_sprite(&mut self, sprite: &SpriteQuad) -> Result<usize, BatchError> {
        if self.buffers.is_none() {
            return Err(BatchError::NotStarted);
        }
        if !self.has_room {
            return Err(BatchError::BatchFull(self.max_batch_size));
        }

        let texture_slot = match &sprite.texture {
            None => 0,
            Some(texture) => match self.texture_index(texture) {
                Some(index) => index as u32 + 1,
                None if self.has_texture_room() => {
                    self.textures.push(texture.clone());
                    log::debug!("Batch registered texture '{}' at slot {}", texture.label(), self.textures.len());
                    self.textures.len() as u32
                },
                None => return Err(BatchError::TextureSlotsExhausted(texture.label().to_string())),
            },
        };

        let index = self.sprites.len();
        self.sprites.push(SpriteSlot { owner: sprite.owner, texture_slot });
        self.load_vertex_properties(index, sprite, texture_slot);

        if self.sprites.len() == self.max_batch_size {
            self.has_room = false;
        }

        log::trace!("Sprite {:?} placed in slot {} (texture slot {})", sprite.owner, index, texture_slot);
        Ok(index)
    }

    fn load_vertex_properties(&mut self, index: usize, sprite: &SpriteQuad, texture_slot: u32) {
        let offset = index * VERTICES_PER_QUAD;
        let color = sprite.color.to_array();

        for (corner, vertex) in self.vertices[offset..offset + VERTICES_PER_QUAD].iter_mut().enumerate() {
            *vertex = Vertex {
                position: sprite.transform.corner(CORNER_OFFSETS[corner]).to_array(),
                color,
                uv: sprite.uv[corner].to_array(),
                texture_slot: texture_slot as f32,
            };
        }
    }

    /// Uploads the whole vertex buffer and issues this batch's single draw call.
    pub fn render(&self, gfx: &mut dyn GraphicsContext, camera: &Camera) -> Result<(), BatchError> {
        let buffers = self.buffers.ok_or(BatchError::NotStarted)?;

        gfx.upload_vertices(buffers.vertices, 0, bytemuck::cast_slice(&self.vertices))?;

        self.shader.use_program(gfx)?;
        self.shader.upload_mat4(gfx, "uProjection", camera.projection_matrix())?;
        self.shader.upload_mat4(gfx, "uView", &camera.view_matrix())?;

        for (i, texture) in self.textures.iter().enumerate() {
            texture.bind(gfx, i as u32 + 1)?;
        }
        self.shader.upload_int_array(gfx, "uTextures", &texture_units())?;

        let result = gfx.draw_indexed(buffers.vertices, buffers.indices, self.index_count());

        for (i, texture) in self.textures.iter().enumerate() {
            texture.unbind(gfx, i as u32 + 1);
        }
        self.shader.detach(gfx);

        result.map_err(BatchError::from)
    }

    /// Frees the GPU buffers. The batch has to be started again before reuse.
    pub fn release(&mut self, gfx: &mut dyn GraphicsContext) {
        if let Some(buffers) = self.buffers.take() {
            gfx.release_buffer(buffers.vertices);
            gfx.release_buffer(buffers.indices);
            log::debug!("Batch released vbo={:?} ebo={:?}", buffers.vertices, buffers.indices);
        }
    }

    pub fn has_room(&self) -> bool {
        self.has_room
    }

    pub fn has_texture_room(&self) -> bool {
        self.textures.len() < MAX_BATCH_TEXTURES
    }

    pub fn has_texture(&self, texture: &Texture) -> bool {
        self.texture_index(texture).is_some()
    }

    fn texture_index(&self, texture: &Texture) -> Option<usize> {
        self.textures.iter().position(|t| t.id() == texture.id())
    }

    /// Whether `sprite` could be added right now.
    pub fn accepts(&self, sprite: &SpriteQuad) -> bool {
        self.has_room && match &sprite.texture {
            None => true,
            Some(texture) => self.has_texture(texture) || self.has_texture_room(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn index_count(&self) -> u32 {
        (self.sprites.len() * INDICES_PER_QUAD) as u32
    }

    pub fn slots(&self) -> &[SpriteSlot] {
        &self.sprites
    }

    /// Vertices of the occupied slots.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices[..self.sprites.len() * VERTICES_PER_QUAD]
    }

    /// Full local buffer as packed floats, `max_batch_size * 4 * 9` long.
    pub fn vertex_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Texture unit for every texture slot, slot 0 included.
fn texture_units() -> [i32; MAX_BATCH_TEXTURES + 1] {
    std::array::from_fn(|unit| unit as i32)
}

/// Index pattern for sprite `i`: `4i+3, 4i+2, 4i, 4i, 4i+2, 4i+1`.
pub fn quad_indices(index: u32) -> [u32; INDICES_PER_QUAD] {
    let offset = 4 * index;
    [
        offset + 3, offset + 2, offset,
        offset, offset + 2, offset + 1,
    ]
}

pub fn generate_indices(max_batch_size: usize) -> Vec<u32> {
    (0..max_batch_size as u32)
        .flat_map(quad_indices)
        .collect()
}

#[cfg(test)]
use super::{
    headless::{GpuCommand, HeadlessContext},
    shader::ShaderSource
};

#[cfg(test)]
fn test_shader(gfx: &mut HeadlessContext) -> Rc<Shader> {
    let source = ShaderSource::parse("#type vertex\nv\n#type fragment\nf\n").unwrap();
    Rc::new(Shader::compile(gfx, "test", source, &Vertex::LAYOUT).unwrap())
}

#[cfg(test)]
fn started_batch(gfx: &mut HeadlessContext, max_batch_size: usize) -> RenderBatch {
    let mut batch = RenderBatch::new(max_batch_size, test_shader(gfx));
    batch.start(gfx).unwrap();
    batch
}

#[cfg(test)]
fn texture(id: u32) -> Rc<Texture> {
    Rc::new(Texture::new(super::gfx::TextureId(id), 16, 16, format!("tex{id}")))
}

#[cfg(test)]
fn colored_quad(x: f32, y: f32) -> SpriteQuad {
    let sprite = SpriteRenderer::from_color(Color::new(0.5, 0.25, 1.0, 1.0));
    SpriteQuad::new(Transform::new(Vector2F::new(x, y), Vector2F::new(10.0, 20.0)), &sprite)
}

#[cfg(test)]
fn textured_quad(texture: &Rc<Texture>) -> SpriteQuad {
    let sprite = SpriteRenderer::from_texture(texture.clone());
    SpriteQuad::new(Transform::default(), &sprite)
}

#[test]
fn test_vertex_is_nine_packed_floats() {
    assert_eq!(std::mem::size_of::<Vertex>(), 9 * 4);
    assert_eq!(Vertex::LAYOUT.attributes[3].offset, 32);
}

#[test]
fn test_index_pattern() {
    assert_eq!(quad_indices(0), [3, 2, 0, 0, 2, 1]);
    assert_eq!(quad_indices(1), [7, 6, 4, 4, 6, 5]);

    let indices = generate_indices(3);
    assert_eq!(indices.len(), 18);
    for i in 0..3u32 {
        let start = 6 * i as usize;
        assert_eq!(&indices[start..start + 6], &[4 * i + 3, 4 * i + 2, 4 * i, 4 * i, 4 * i + 2, 4 * i + 1]);
    }
}

#[test]
fn test_start_uploads_static_indices() {
    let mut gfx = HeadlessContext::new();
    let _batch = started_batch(&mut gfx, 5);

    let index_buffer = gfx.commands().iter().find_map(|c| match c {
        GpuCommand::CreateIndexBuffer { buffer, .. } => Some(*buffer),
        _ => None,
    }).unwrap();
    assert_eq!(gfx.index_data(index_buffer).unwrap(), generate_indices(5).as_slice());
}

#[test]
fn test_start_twice_fails() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 2);
    assert!(matches!(batch.start(&mut gfx), Err(BatchError::AlreadyStarted)));
}

#[test]
fn test_add_before_start_fails() {
    let mut gfx = HeadlessContext::new();
    let mut batch = RenderBatch::new(2, test_shader(&mut gfx));
    assert!(matches!(batch.add_sprite(&colored_quad(0.0, 0.0)), Err(BatchError::NotStarted)));
}

#[test]
fn test_has_room_until_capacity() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 3);

    for i in 0..3 {
        assert!(batch.has_room(), "room expected before sprite {i}");
        assert_eq!(batch.add_sprite(&colored_quad(0.0, 0.0)).unwrap(), i);
    }
    assert!(!batch.has_room());
    assert!(matches!(batch.add_sprite(&colored_quad(0.0, 0.0)), Err(BatchError::BatchFull(3))));
    assert_eq!(batch.sprite_count(), 3);
}

#[test]
fn test_corner_positions() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 2);
    batch.add_sprite(&colored_quad(100.0, 50.0)).unwrap();

    let vertices = batch.vertices();
    assert_eq!(vertices[0].position, [110.0, 70.0]);
    assert_eq!(vertices[1].position, [110.0, 50.0]);
    assert_eq!(vertices[2].position, [100.0, 50.0]);
    assert_eq!(vertices[3].position, [100.0, 70.0]);
    assert!(vertices.iter().all(|v| v.color == [0.5, 0.25, 1.0, 1.0]));
}

#[test]
fn test_vertex_floats_layout() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 2);
    batch.add_sprite(&colored_quad(0.0, 0.0)).unwrap();
    batch.add_sprite(&colored_quad(1.0, 2.0)).unwrap();

    let floats = batch.vertex_floats();
    assert_eq!(floats.len(), 2 * 4 * 9);
    // second sprite, first corner (top-right)
    let base = 4 * VERTEX_SIZE;
    assert_eq!(&floats[base..base + 2], &[11.0, 22.0]);
    assert_eq!(floats[base + 8], 0.0);
}

#[test]
fn test_untextured_sprites_use_slot_zero() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 4);
    batch.add_sprite(&textured_quad(&texture(100))).unwrap();
    batch.add_sprite(&colored_quad(0.0, 0.0)).unwrap();

    assert!(batch.vertices()[4..8].iter().all(|v| v.texture_slot == 0.0));
    assert_eq!(batch.slots()[1].texture_slot, 0);
}

#[test]
fn test_shared_texture_gets_one_stable_slot() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 8);
    let first = texture(100);
    let second = texture(200);

    batch.add_sprite(&textured_quad(&first)).unwrap();
    batch.add_sprite(&textured_quad(&second)).unwrap();
    batch.add_sprite(&textured_quad(&first)).unwrap();

    let slots: Vec<u32> = batch.slots().iter().map(|s| s.texture_slot).collect();
    assert_eq!(slots, vec![1, 2, 1]);
    assert_eq!(batch.texture_count(), 2);
    assert!(batch.vertices()[8..12].iter().all(|v| v.texture_slot == 1.0));
}

#[test]
fn test_ninth_texture_is_rejected() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 20);
    for id in 0..MAX_BATCH_TEXTURES as u32 {
        batch.add_sprite(&textured_quad(&texture(id + 1))).unwrap();
    }
    assert!(!batch.has_texture_room());

    let extra = texture(99);
    assert!(!batch.accepts(&textured_quad(&extra)));
    assert!(matches!(batch.add_sprite(&textured_quad(&extra)), Err(BatchError::TextureSlotsExhausted(_))));
    assert_eq!(batch.sprite_count(), MAX_BATCH_TEXTURES);

    // known textures and plain colors still fit
    assert_eq!(batch.add_sprite(&textured_quad(&texture(3))).unwrap(), MAX_BATCH_TEXTURES);
    assert!(batch.add_sprite(&colored_quad(0.0, 0.0)).is_ok());
}

#[test]
fn test_render_issues_one_draw_call() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 10);
    let tex_id = gfx.create_texture(1, 1, &[255; 4]).unwrap();
    let tex = Rc::new(Texture::new(tex_id, 1, 1, "white"));
    batch.add_sprite(&textured_quad(&tex)).unwrap();
    batch.add_sprite(&colored_quad(0.0, 0.0)).unwrap();

    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));
    gfx.clear_commands();
    batch.render(&mut gfx, &camera).unwrap();

    assert_eq!(gfx.draw_calls(), 1);
    assert!(gfx.commands().contains(&GpuCommand::BindTexture { unit: 1, texture: tex_id }));
    assert!(gfx.commands().iter().any(|c| matches!(c, GpuCommand::DrawIndexed { index_count: 12, .. })));
    assert!(gfx.commands().contains(&GpuCommand::UnbindTexture { unit: 1 }));
    assert_eq!(gfx.commands().last(), Some(&GpuCommand::DetachProgram));
}

#[test]
fn test_render_reuploads_identical_vertices() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 4);
    batch.add_sprite(&colored_quad(3.0, 4.0)).unwrap();
    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));

    batch.render(&mut gfx, &camera).unwrap();
    let vertex_buffer = gfx.commands().iter().find_map(|c| match c {
        GpuCommand::CreateVertexBuffer { buffer, .. } => Some(*buffer),
        _ => None,
    }).unwrap();
    let first = gfx.vertex_data(vertex_buffer).unwrap().to_vec();

    batch.render(&mut gfx, &camera).unwrap();
    assert_eq!(gfx.vertex_data(vertex_buffer).unwrap(), first.as_slice());
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::UploadVertices { offset_bytes: 0, len, .. } if *len == 4 * 4 * VERTEX_SIZE_BYTES)), 2);
}

#[test]
fn test_release_frees_buffers() {
    let mut gfx = HeadlessContext::new();
    let mut batch = started_batch(&mut gfx, 4);
    assert_eq!(gfx.live_buffers(), 2);

    batch.release(&mut gfx);
    assert_eq!(gfx.live_buffers(), 0);
    assert!(!batch.is_started());
}
