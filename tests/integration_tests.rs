use std::{io::Write, rc::Rc};

use sprite_batcher::{
    app::{run_headless, Engine, EngineError},
    assets::{AssetError, AssetPool},
    config::{ConfigError, EngineConfig},
    game::{
        camera::Camera,
        entity::Entity,
        math::{Color, Vector2F},
        scene::{Scene, SceneLogic},
        sprite::{SpriteRenderer, Spritesheet},
        transform::Transform
    },
    rendering::{
        batch::{BatchError, RenderBatch, SpriteQuad, Vertex, VERTEX_SIZE},
        gfx::GraphicsContext,
        headless::{GpuCommand, HeadlessContext},
        renderer::{RenderStats, Renderer},
        shader::{Shader, ShaderError, ShaderSource},
        texture::Texture
    }
};

fn default_shader(gfx: &mut HeadlessContext, assets: &mut AssetPool) -> Rc<Shader> {
    assets.default_shader(gfx).unwrap()
}

fn camera() -> Camera {
    Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0))
}

fn textured(texture: &Rc<Texture>, x: f32) -> Entity {
    Entity::with_transform("textured", Transform::new(Vector2F::new(x, 0.0), Vector2F::new(16.0, 16.0)))
        .with_component(SpriteRenderer::from_texture(texture.clone()))
}

struct Sprites {
    count: usize,
}

impl SceneLogic for Sprites {
    fn name(&self) -> &str {
        "sprites"
    }

    fn init(&mut self, scene: &mut Scene, _assets: &mut AssetPool, _gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        for i in 0..self.count {
            scene.add_entity(Entity::with_transform(format!("s{i}"), Transform::new(Vector2F::new(i as f32, 0.0), Vector2F::ONE))
                .with_component(SpriteRenderer::from_color(Color::WHITE)));
        }
        Ok(())
    }
}

#[test]
fn test_thousand_and_one_sprites_make_two_draw_calls() {
    let summary = run_headless(EngineConfig::default(), Box::new(Sprites { count: 1001 }), 1).unwrap();
    assert_eq!(summary.last_frame, RenderStats { batches: 2, sprites: 1001, draw_calls: 2 });
}

#[test]
fn test_shared_texture_keeps_slot_across_frames() {
    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let shader = default_shader(&mut gfx, &mut assets);
    let texture = assets.insert_texture("tiles/grass", 2, 2, &[200; 16], &mut gfx).unwrap();

    let mut scene = Scene::new("slots", camera(), Renderer::new(shader));
    scene.add_entity(Entity::new("plain").with_component(SpriteRenderer::from_color(Color::BLACK)));
    scene.add_entity(textured(&texture, 16.0));
    scene.add_entity(textured(&texture, 32.0));
    scene.start(&mut gfx).unwrap();

    for _ in 0..2 {
        scene.update(0.016, &mut gfx).unwrap();
        let batch = &scene.renderer().batches()[0];
        let slots: Vec<f32> = batch.vertices().iter()
            .map(|vertex| vertex.texture_slot)
            .collect();
        assert_eq!(batch.vertex_floats().len(), 1000 * 4 * VERTEX_SIZE);
        assert_eq!(slots, [[0.0; 4], [1.0; 4], [1.0; 4]].concat());
    }

    let binds = gfx.count_commands(|c| matches!(c, GpuCommand::BindTexture { unit: 1, .. }));
    assert_eq!(binds, 2);
}

#[test]
fn test_ninth_texture_starts_second_draw_call() {
    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let shader = default_shader(&mut gfx, &mut assets);
    let mut renderer = Renderer::new(shader);

    for i in 0..9 {
        let texture = assets.insert_texture(format!("tex/{i}"), 1, 1, &[255; 4], &mut gfx).unwrap();
        renderer.add_entity(&mut gfx, &textured(&texture, i as f32)).unwrap();
    }

    assert_eq!(renderer.batches().len(), 2);
    assert_eq!(renderer.batches()[0].texture_count(), 8);
    assert_eq!(renderer.batches()[1].texture_count(), 1);

    gfx.clear_commands();
    let stats = renderer.render(&mut gfx, &camera()).unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(gfx.draw_calls(), 2);
}

#[test]
fn test_batch_rejects_ninth_texture_without_mutation() {
    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let shader = default_shader(&mut gfx, &mut assets);
    let mut batch = RenderBatch::new(16, shader);
    batch.start(&mut gfx).unwrap();

    for i in 0..8 {
        let texture = assets.insert_texture(format!("tex/{i}"), 1, 1, &[255; 4], &mut gfx).unwrap();
        batch.add_sprite(&SpriteQuad::new(Transform::default(), &SpriteRenderer::from_texture(texture))).unwrap();
    }

    let ninth = assets.insert_texture("tex/8", 1, 1, &[255; 4], &mut gfx).unwrap();
    let result = batch.add_sprite(&SpriteQuad::new(Transform::default(), &SpriteRenderer::from_texture(ninth)));

    assert!(matches!(result, Err(BatchError::TextureSlotsExhausted(_))));
    assert_eq!(batch.sprite_count(), 8);
    assert_eq!(batch.texture_count(), 8);
    assert!(batch.has_room());
}

#[test]
fn test_vertices_reach_the_gpu_buffer() {
    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let shader = default_shader(&mut gfx, &mut assets);
    let mut renderer = Renderer::new(shader);

    let transform = Transform::new(Vector2F::new(10.0, 20.0), Vector2F::new(30.0, 40.0));
    renderer.add(&mut gfx, &SpriteQuad::new(transform, &SpriteRenderer::from_color(Color::WHITE))).unwrap();
    renderer.render(&mut gfx, &camera()).unwrap();

    let vertex_buffer = gfx.commands().iter().find_map(|c| match c {
        GpuCommand::DrawIndexed { vertex_buffer, .. } => Some(*vertex_buffer),
        _ => None,
    }).unwrap();
    let bytes = gfx.vertex_data(vertex_buffer).unwrap();
    let uploaded: Vec<Vertex> = bytes.chunks_exact(std::mem::size_of::<Vertex>())
        .take(4)
        .map(bytemuck::pod_read_unaligned)
        .collect();

    assert_eq!(uploaded[0].position, [40.0, 60.0]);
    assert_eq!(uploaded[1].position, [40.0, 20.0]);
    assert_eq!(uploaded[2].position, [10.0, 20.0]);
    assert_eq!(uploaded[3].position, [10.0, 60.0]);
}

#[test]
fn test_shader_file_loads_once() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "#type vertex\nA\n#type fragment\nB\n").unwrap();

    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let first = assets.shader(file.path(), &mut gfx).unwrap();
    let second = assets.shader(file.path(), &mut gfx).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(first.source(), &ShaderSource { vertex: "A\n".to_string(), fragment: "B\n".to_string() });
    assert_eq!(gfx.count_commands(|c| matches!(c, GpuCommand::CompileProgram { .. })), 1);
}

#[test]
fn test_shader_file_with_single_tag_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "#type vertex\nA\n").unwrap();

    let mut gfx = HeadlessContext::new();
    let result = AssetPool::new().shader(file.path(), &mut gfx);
    assert!(matches!(result, Err(AssetError::Shader(ShaderError::MissingTypeTag(1)))));
}

#[test]
fn test_missing_shader_file_is_io_error() {
    let mut gfx = HeadlessContext::new();
    let result = AssetPool::new().shader("does/not/exist.wgsl", &mut gfx);
    assert!(matches!(result, Err(AssetError::Shader(ShaderError::Io { .. }))));
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "renderer": {{ "max_batch_size": 2 }}, "demo": {{ "sprites": 5, "textures": 0 }} }}"#).unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.renderer.max_batch_size, 2);
    assert_eq!(config.demo.sprites, 5);

    let summary = run_headless(config, Box::new(Sprites { count: 5 }), 1).unwrap();
    assert_eq!(summary.last_frame.batches, 3);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "renderer": {{ "max_batch_size": 0 }} }}"#).unwrap();
    assert!(matches!(EngineConfig::load(file.path()), Err(ConfigError::Invalid(_))));

    let mut broken = tempfile::NamedTempFile::new().unwrap();
    write!(broken, "not json").unwrap();
    assert!(matches!(EngineConfig::load(broken.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_spritesheet_sprites_share_one_texture_slot() {
    let mut gfx = HeadlessContext::new();
    let mut assets = AssetPool::new();
    let shader = default_shader(&mut gfx, &mut assets);
    let texture = assets.insert_texture("sheet", 32, 32, &[128; 32 * 32 * 4], &mut gfx).unwrap();
    let sheet = assets.add_spritesheet("sheet", Spritesheet::new(texture, 16, 16, 4, 0).unwrap());

    let mut renderer = Renderer::new(shader);
    for i in 0..sheet.len() {
        let sprite = SpriteRenderer::from_sprite(sheet.sprite(i).unwrap().clone());
        renderer.add(&mut gfx, &SpriteQuad::new(Transform::default(), &sprite)).unwrap();
    }

    assert_eq!(renderer.batches().len(), 1);
    assert_eq!(renderer.batches()[0].texture_count(), 1);
    assert!(renderer.batches()[0].slots().iter().all(|slot| slot.texture_slot == 1));
}

#[test]
fn test_engine_shutdown_releases_everything() {
    let mut gfx = HeadlessContext::new();
    let mut engine = Engine::new(EngineConfig::default());
    engine.request_scene(Box::new(Sprites { count: 10 }));
    engine.frame(&mut gfx, 0.016).unwrap();
    assert!(gfx.live_buffers() > 0);

    engine.shutdown(&mut gfx);
    assert_eq!(gfx.live_buffers(), 0);
    assert_eq!(gfx.live_textures(), 0);
}
