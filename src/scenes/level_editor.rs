use std::rc::Rc;

use rand::seq::IndexedRandom;

use crate::{
    app::EngineError,
    assets::AssetPool,
    config::DemoConfig,
    game::{
        entity::Entity,
        math::{Color, Vector2F},
        scene::{Scene, SceneLogic},
        sprite::SpriteRenderer,
        transform::Transform
    },
    rendering::{
        gfx::GraphicsContext,
        texture::Texture
    }
};

const TILE_PIXELS: u32 = 4;
const PALETTE: [[u8; 3]; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
];
// Sprites picked from the sheet, shown side by side.
const SHEET_SPRITES: [(usize, f32); 2] = [(0, 100.0), (6, 400.0)];
const SHEET_SPRITE_SIZE: f32 = 256.0;

/// Demo scene: sprites from an optional spritesheet plus a grid of generated
/// tiles, with the camera swaying sideways.
pub struct LevelEditorScene {
    demo: DemoConfig,
    elapsed: f32,
}

impl LevelEditorScene {
    pub fn new(demo: DemoConfig) -> Self {
        log::info!("Entering level editor scene...");
        Self { demo, elapsed: 0.0 }
    }

    fn generate_tiles(&self, assets: &mut AssetPool, gfx: &mut dyn GraphicsContext) -> Result<Vec<Rc<Texture>>, EngineError> {
        let mut rng = rand::rng();
        let mut tiles = Vec::with_capacity(self.demo.textures);

        for i in 0..self.demo.textures {
            let [r, g, b] = *PALETTE.choose(&mut rng).unwrap_or(&PALETTE[0]);
            let shade = rand::random_range(96..=224u16);
            let dark = [r, g, b].map(|c| (c as u16 * shade / 255) as u8);

            let mut pixels = Vec::with_capacity((TILE_PIXELS * TILE_PIXELS * 4) as usize);
            for y in 0..TILE_PIXELS {
                for x in 0..TILE_PIXELS {
                    let [r, g, b] = if (x + y) % 2 == 0 { [r, g, b] } else { dark };
                    pixels.extend_from_slice(&[r, g, b, 255]);
                }
            }

            tiles.push(assets.insert_texture(format!("generated/tile_{i}"), TILE_PIXELS, TILE_PIXELS, &pixels, gfx)?);
        }
        Ok(tiles)
    }

    fn add_sheet_sprites(&self, scene: &mut Scene, assets: &mut AssetPool, gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        let Some(sheet_config) = &self.demo.spritesheet else {
            return Ok(());
        };

        let sheet = assets.load_spritesheet(
            &sheet_config.path,
            sheet_config.sprite_width,
            sheet_config.sprite_height,
            sheet_config.count,
            sheet_config.spacing,
            gfx
        )?;

        for (index, x) in SHEET_SPRITES {
            let Some(sprite) = sheet.sprite(index) else {
                log::warn!("Spritesheet {:?} has no sprite #{index}", sheet_config.path);
                continue;
            };
            let transform = Transform::new(Vector2F::new(x, 100.0), Vector2F::new(SHEET_SPRITE_SIZE, SHEET_SPRITE_SIZE));
            scene.add_entity(Entity::with_transform(format!("obj{index}"), transform)
                .with_component(SpriteRenderer::from_sprite(sprite.clone())));
        }
        Ok(())
    }
}

impl SceneLogic for LevelEditorScene {
    fn name(&self) -> &str {
        "Level Editor"
    }

    fn init(&mut self, scene: &mut Scene, assets: &mut AssetPool, gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        self.add_sheet_sprites(scene, assets, gfx)?;

        let tiles = self.generate_tiles(assets, gfx)?;
        let size = self.demo.sprite_size.max(1.0);
        let columns = ((scene.camera().viewport().x / size) as usize).max(1);
        let mut rng = rand::rng();

        for i in 0..self.demo.sprites {
            let position = Vector2F::new((i % columns) as f32 * size, (i / columns) as f32 * size);
            let transform = Transform::new(position, Vector2F::new(size, size));

            // Every third tile is a plain color quad.
            let sprite = match tiles.get(i % tiles.len().max(1)) {
                Some(texture) if i % 3 != 0 => SpriteRenderer::from_texture(texture.clone()),
                _ => SpriteRenderer::from_color(PALETTE.choose(&mut rng)
                    .map(|rgb| Color::from_rgb8(*rgb))
                    .unwrap_or(Color::WHITE)),
            };
            scene.add_entity(Entity::with_transform(format!("tile{i}"), transform).with_component(sprite));
        }

        log::info!("Level editor populated with {} entities", scene.entities().len());
        Ok(())
    }

    fn update(&mut self, scene: &mut Scene, dt: f32) {
        self.elapsed += dt;
        scene.camera_mut().position.x = self.elapsed.sin() * self.demo.pan_amplitude;
    }
}

#[cfg(test)]
use crate::{
    app::run_headless,
    config::EngineConfig
};

#[test]
fn test_demo_populates_grid() {
    let mut config = EngineConfig::default();
    config.demo.sprites = 300;
    config.demo.textures = 10;
    config.renderer.max_batch_size = 1000;

    let summary = run_headless(config.clone(), Box::new(LevelEditorScene::new(config.demo)), 2).unwrap();

    assert_eq!(summary.last_frame.sprites, 300);
    // ten textures do not fit the eight slots of one batch
    assert_eq!(summary.last_frame.batches, 2);
}

#[test]
fn test_demo_without_textures_uses_one_batch() {
    let mut config = EngineConfig::default();
    config.demo.sprites = 50;
    config.demo.textures = 0;

    let summary = run_headless(config.clone(), Box::new(LevelEditorScene::new(config.demo)), 1).unwrap();
    assert_eq!(summary.last_frame, crate::rendering::renderer::RenderStats { batches: 1, sprites: 50, draw_calls: 1 });
}
