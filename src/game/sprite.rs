use std::rc::Rc;

use crate::rendering::texture::Texture;

use super::{
    entity::EntityId,
    math::{Color, Rect2F, Vector2F}
};

/// UV rectangle covering the whole texture, corners TR, BR, BL, TL.
pub const DEFAULT_TEX_COORDS: [Vector2F; 4] = [
    Vector2F { x: 1.0, y: 1.0 },
    Vector2F { x: 1.0, y: 0.0 },
    Vector2F { x: 0.0, y: 0.0 },
    Vector2F { x: 0.0, y: 1.0 },
];

/// A region of a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub texture: Rc<Texture>,
    pub tex_coords: [Vector2F; 4],
}

impl Sprite {
    pub fn new(texture: Rc<Texture>, tex_coords: [Vector2F; 4]) -> Self {
        Self { texture, tex_coords }
    }

    pub fn whole(texture: Rc<Texture>) -> Self {
        Self { texture, tex_coords: DEFAULT_TEX_COORDS }
    }
}

/// Visual attributes of an entity: a tint color and optionally a texture region.
#[derive(Debug, Clone)]
pub struct SpriteRenderer {
    color: Color,
    sprite: Option<Sprite>,
    owner: Option<EntityId>,
}

impl SpriteRenderer {
    pub fn from_color(color: Color) -> Self {
        Self {
            color,
            sprite: None,
            owner: None
        }
    }

    pub fn from_texture(texture: Rc<Texture>) -> Self {
        Self::from_sprite(Sprite::whole(texture))
    }

    pub fn from_sprite(sprite: Sprite) -> Self {
        Self {
            color: Color::WHITE,
            sprite: Some(sprite),
            owner: None
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.sprite.as_ref().map(|s| &s.texture)
    }

    pub fn tex_coords(&self) -> [Vector2F; 4] {
        self.sprite.as_ref()
            .map(|s| s.tex_coords)
            .unwrap_or(DEFAULT_TEX_COORDS)
    }

    /// Entity this renderer is attached to.
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<EntityId>) {
        self.owner = owner;
    }

    pub fn start(&mut self) {}

    pub fn update(&mut self, _dt: f32) {}
}

#[derive(Debug, thiserror::Error)]
pub enum SpritesheetError {
    #[error("Sprite size must be non-zero, got {width}x{height}")]
    ZeroSpriteSize {
        width: u32,
        height: u32,
    },
}

/// A texture sliced into equally sized sprites.
#[derive(Debug)]
pub struct Spritesheet {
    texture: Rc<Texture>,
    sprites: Vec<Sprite>,
}

impl Spritesheet {
    /// Slices `count` sprites starting at the top-left cell, going right and
    /// wrapping to the next row down once the texture width is reached.
    pub fn new(texture: Rc<Texture>, sprite_width: u32, sprite_height: u32, count: usize, spacing: u32) -> Result<Self, SpritesheetError> {
        if sprite_width == 0 || sprite_height == 0 {
            return Err(SpritesheetError::ZeroSpriteSize { width: sprite_width, height: sprite_height });
        }

        let texture_width = texture.width() as f32;
        let texture_height = texture.height() as f32;

        // Bottom-left corner of the current cell, in pixels.
        let mut current_x = 0i64;
        let mut current_y = texture.height() as i64 - sprite_height as i64;

        let mut sprites = Vec::with_capacity(count);
        for _ in 0..count {
            let uv_rect = Rect2F::new(
                current_x as f32 / texture_width,
                current_y as f32 / texture_height,
                sprite_width as f32 / texture_width,
                sprite_height as f32 / texture_height
            );
            sprites.push(Sprite::new(texture.clone(), uv_rect.corners()));

            current_x += (sprite_width + spacing) as i64;
            if current_x >= texture.width() as i64 {
                current_x = 0;
                current_y -= (sprite_height + spacing) as i64;
            }
        }

        log::debug!("Spritesheet '{}' sliced into {} sprites", texture.label(), sprites.len());
        Ok(Self { texture, sprites })
    }

    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    pub fn sprite(&self, index: usize) -> Option<&Sprite> {
        self.sprites.get(index)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

#[cfg(test)]
fn sheet_texture() -> Rc<Texture> {
    Rc::new(Texture::new(crate::rendering::gfx::TextureId(1), 32, 32, "sheet"))
}

#[test]
fn test_color_renderer_has_default_uv_and_no_texture() {
    let renderer = SpriteRenderer::from_color(Color::BLACK);
    assert!(renderer.texture().is_none());
    assert_eq!(renderer.tex_coords(), DEFAULT_TEX_COORDS);
    assert_eq!(renderer.color(), Color::BLACK);
}

#[test]
fn test_texture_renderer_is_white() {
    let renderer = SpriteRenderer::from_texture(sheet_texture());
    assert_eq!(renderer.color(), Color::WHITE);
    assert_eq!(renderer.texture().unwrap().label(), "sheet");
}

#[test]
fn test_spritesheet_slices_top_left_first() {
    let sheet = Spritesheet::new(sheet_texture(), 16, 16, 4, 0).unwrap();
    assert_eq!(sheet.len(), 4);

    let first = sheet.sprite(0).unwrap();
    assert_eq!(first.tex_coords, [
        Vector2F::new(0.5, 1.0),
        Vector2F::new(0.5, 0.5),
        Vector2F::new(0.0, 0.5),
        Vector2F::new(0.0, 1.0),
    ]);

    let second = sheet.sprite(1).unwrap();
    assert_eq!(second.tex_coords[0], Vector2F::new(1.0, 1.0));
    assert_eq!(second.tex_coords[2], Vector2F::new(0.5, 0.5));

    let third = sheet.sprite(2).unwrap();
    assert_eq!(third.tex_coords, [
        Vector2F::new(0.5, 0.5),
        Vector2F::new(0.5, 0.0),
        Vector2F::new(0.0, 0.0),
        Vector2F::new(0.0, 0.5),
    ]);

    assert!(sheet.sprite(4).is_none());
}

#[test]
fn test_spritesheet_rejects_zero_size() {
    assert!(matches!(
        Spritesheet::new(sheet_texture(), 0, 16, 1, 0),
        Err(SpritesheetError::ZeroSpriteSize { width: 0, height: 16 })
    ));
}
