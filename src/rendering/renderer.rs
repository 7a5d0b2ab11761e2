use std::rc::Rc;

use crate::game::{
    camera::Camera,
    entity::Entity
};

use super::{
    batch::{BatchError, RenderBatch, SpriteQuad},
    gfx::GraphicsContext,
    shader::Shader
};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Where a sprite ended up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpriteLocation {
    pub batch: usize,
    pub slot: usize,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RenderStats {
    pub batches: usize,
    pub sprites: usize,
    pub draw_calls: usize,
}

/// Routes sprites into batches and draws the batches in creation order.
///
/// Routing is first-fit: a sprite goes to the first batch with room that
/// either already has its texture or can still take one more. Draw order
/// therefore follows batch order, not depth.
pub struct Renderer {
    max_batch_size: usize,
    shader: Rc<Shader>,
    batches: Vec<RenderBatch>,
}

impl Renderer {
    pub fn new(shader: Rc<Shader>) -> Self {
        Self::with_max_batch_size(shader, DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(shader: Rc<Shader>, max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            shader,
            batches: vec![],
        }
    }

    /// Registers the entity's sprite renderer, if it has one.
    pub fn add_entity(&mut self, gfx: &mut dyn GraphicsContext, entity: &Entity) -> Result<Option<SpriteLocation>, BatchError> {
        match entity.sprite_renderer() {
            Some(sprite) => self.add(gfx, &SpriteQuad::new(entity.transform, sprite)).map(Some),
            None => Ok(None),
        }
    }

    pub fn add(&mut self, gfx: &mut dyn GraphicsContext, sprite: &SpriteQuad) -> Result<SpriteLocation, BatchError> {
        if let Some(batch_index) = self.batches.iter().position(|b| b.accepts(sprite)) {
            let slot = self.batches[batch_index].add_sprite(sprite)?;
            return Ok(SpriteLocation { batch: batch_index, slot });
        }

        let mut batch = RenderBatch::new(self.max_batch_size, self.shader.clone());
        batch.start(gfx)?;
        let slot = batch.add_sprite(sprite)?;
        self.batches.push(batch);

        log::debug!("Renderer created batch #{}", self.batches.len() - 1);
        Ok(SpriteLocation { batch: self.batches.len() - 1, slot })
    }

    pub fn render(&self, gfx: &mut dyn GraphicsContext, camera: &Camera) -> Result<RenderStats, BatchError> {
        let mut stats = RenderStats {
            batches: self.batches.len(),
            ..Default::default()
        };

        for batch in self.batches.iter() {
            batch.render(gfx, camera)?;
            stats.sprites += batch.sprite_count();
            stats.draw_calls += 1;
        }

        log::trace!("Rendered {stats:?}");
        Ok(stats)
    }

    /// Frees every batch's GPU buffers and forgets the batches.
    pub fn release(&mut self, gfx: &mut dyn GraphicsContext) {
        for batch in self.batches.iter_mut() {
            batch.release(gfx);
        }
        log::debug!("Renderer released {} batches", self.batches.len());
        self.batches.clear();
    }

    pub fn batches(&self) -> &[RenderBatch] {
        &self.batches
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn shader(&self) -> &Rc<Shader> {
        &self.shader
    }
}

#[cfg(test)]
use {
    super::{
        batch::{Vertex, MAX_BATCH_TEXTURES},
        gfx::TextureId,
        headless::HeadlessContext,
        shader::ShaderSource,
        texture::Texture
    },
    crate::game::{
        math::{Color, Vector2F},
        sprite::SpriteRenderer,
        transform::Transform
    }
};

#[cfg(test)]
fn test_renderer(gfx: &mut HeadlessContext, max_batch_size: usize) -> Renderer {
    let source = ShaderSource::parse("#type vertex\nv\n#type fragment\nf\n").unwrap();
    let shader = Rc::new(Shader::compile(gfx, "test", source, &Vertex::LAYOUT).unwrap());
    Renderer::with_max_batch_size(shader, max_batch_size)
}

#[cfg(test)]
fn quad(texture: Option<u32>) -> SpriteQuad {
    let sprite = match texture {
        Some(id) => SpriteRenderer::from_texture(Rc::new(Texture::new(TextureId(id), 8, 8, format!("tex{id}")))),
        None => SpriteRenderer::from_color(Color::WHITE),
    };
    SpriteQuad::new(Transform::default(), &sprite)
}

#[test]
fn test_overflow_creates_second_batch() {
    let mut gfx = HeadlessContext::new();
    let mut renderer = test_renderer(&mut gfx, 1000);

    for _ in 0..1001 {
        renderer.add(&mut gfx, &quad(None)).unwrap();
    }

    assert_eq!(renderer.batches().len(), 2);
    assert_eq!(renderer.batches()[0].sprite_count(), 1000);
    assert_eq!(renderer.batches()[1].sprite_count(), 1);
}

#[test]
fn test_ninth_texture_goes_to_new_batch() {
    let mut gfx = HeadlessContext::new();
    let mut renderer = test_renderer(&mut gfx, 100);

    for id in 1..=MAX_BATCH_TEXTURES as u32 {
        assert_eq!(renderer.add(&mut gfx, &quad(Some(id))).unwrap().batch, 0);
    }
    assert!(renderer.batches()[0].has_room());

    let location = renderer.add(&mut gfx, &quad(Some(9))).unwrap();
    assert_eq!(location, SpriteLocation { batch: 1, slot: 0 });

    // first fit still prefers the earlier batch when it can take the sprite
    assert_eq!(renderer.add(&mut gfx, &quad(Some(4))).unwrap().batch, 0);
    assert_eq!(renderer.add(&mut gfx, &quad(None)).unwrap().batch, 0);
    assert_eq!(renderer.add(&mut gfx, &quad(Some(10))).unwrap().batch, 1);
}

#[test]
fn test_render_draws_each_batch_once_in_order() {
    let mut gfx = HeadlessContext::new();
    let mut renderer = test_renderer(&mut gfx, 2);
    for _ in 0..5 {
        renderer.add(&mut gfx, &quad(None)).unwrap();
    }

    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));
    gfx.clear_commands();
    let stats = renderer.render(&mut gfx, &camera).unwrap();

    assert_eq!(stats, RenderStats { batches: 3, sprites: 5, draw_calls: 3 });
    let counts: Vec<u32> = gfx.commands().iter().filter_map(|c| match c {
        super::headless::GpuCommand::DrawIndexed { index_count, .. } => Some(*index_count),
        _ => None,
    }).collect();
    assert_eq!(counts, vec![12, 12, 6]);
}

#[test]
fn test_entity_without_sprite_is_skipped() {
    let mut gfx = HeadlessContext::new();
    let mut renderer = test_renderer(&mut gfx, 10);
    let entity = crate::game::entity::Entity::new("ghost");

    assert_eq!(renderer.add_entity(&mut gfx, &entity).unwrap(), None);
    assert!(renderer.batches().is_empty());
}

#[test]
fn test_release_frees_all_batches() {
    let mut gfx = HeadlessContext::new();
    let mut renderer = test_renderer(&mut gfx, 1);
    renderer.add(&mut gfx, &quad(None)).unwrap();
    renderer.add(&mut gfx, &quad(None)).unwrap();
    assert_eq!(gfx.live_buffers(), 4);

    renderer.release(&mut gfx);
    assert_eq!(gfx.live_buffers(), 0);
    assert!(renderer.batches().is_empty());
}
