pub mod window;

use std::time::Instant;

use crate::{
    assets::{AssetError, AssetPool},
    config::{ConfigError, EngineConfig},
    game::{
        camera::Camera,
        math::Vector2F,
        scene::{Scene, SceneError, SceneLogic}
    },
    rendering::{
        gfx::{GraphicsContext, GraphicsError},
        headless::HeadlessContext,
        renderer::{RenderStats, Renderer}
    }
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("EngineError, reason='{0}'")]
    Config(#[from] ConfigError),
    #[error("EngineError, reason='{0}'")]
    Asset(#[from] AssetError),
    #[error("EngineError, reason='{0}'")]
    Scene(#[from] SceneError),
    #[error("EngineError, reason='{0}'")]
    Graphics(#[from] GraphicsError),
    #[error("EngineError, reason='{0}'")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("EngineError, reason='{0}'")]
    Window(#[from] winit::error::OsError),
}

struct ActiveScene {
    scene: Scene,
    logic: Box<dyn SceneLogic>,
}

/// Application context owned by the frame loop driver.
///
/// Holds the asset cache and the active scene. Scene switches requested with
/// [`Engine::request_scene`] happen at the start of the next frame.
pub struct Engine {
    config: EngineConfig,
    assets: AssetPool,
    active: Option<ActiveScene>,
    pending: Option<Box<dyn SceneLogic>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            assets: AssetPool::new(),
            active: None,
            pending: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetPool {
        &self.assets
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.active.as_ref().map(|active| &active.scene)
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.active.as_mut().map(|active| &mut active.scene)
    }

    /// Replaces the active scene on the next frame. A later request overrides an earlier one.
    pub fn request_scene(&mut self, logic: Box<dyn SceneLogic>) {
        log::debug!("Scene '{}' requested", logic.name());
        self.pending = Some(logic);
    }

    /// Switches scene if one was requested, then runs one update and draws it.
    pub fn frame(&mut self, gfx: &mut dyn GraphicsContext, dt: f32) -> Result<RenderStats, EngineError> {
        self.switch_scene(gfx)?;

        gfx.begin_frame(self.config.renderer.clear_color)?;
        let stats = match self.active.as_mut() {
            Some(ActiveScene { scene, logic }) => {
                logic.update(scene, dt);
                scene.update(dt, gfx)
            },
            None => Ok(RenderStats::default()),
        };
        // The frame is closed even when the scene failed to draw.
        let ended = gfx.end_frame();

        let stats = stats?;
        ended?;
        Ok(stats)
    }

    fn switch_scene(&mut self, gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        let Some(mut logic) = self.pending.take() else {
            return Ok(());
        };

        if let Some(mut previous) = self.active.take() {
            log::info!("Leaving scene '{}'", previous.scene.name());
            previous.scene.release(gfx);
        }

        let shader = match &self.config.renderer.shader {
            Some(path) => self.assets.shader(path, gfx)?,
            None => self.assets.default_shader(gfx)?,
        };
        let camera = Camera::new(Vector2F::zero(), self.config.camera.viewport());
        let renderer = Renderer::with_max_batch_size(shader, self.config.renderer.max_batch_size);

        let mut scene = Scene::new(logic.name(), camera, renderer);
        logic.init(&mut scene, &mut self.assets, gfx)?;
        scene.start(gfx)?;

        log::info!("Entered scene '{}'", scene.name());
        self.active = Some(ActiveScene { scene, logic });
        Ok(())
    }

    /// Releases the active scene and every cached asset.
    pub fn shutdown(&mut self, gfx: &mut dyn GraphicsContext) {
        self.pending = None;
        if let Some(mut active) = self.active.take() {
            active.scene.release(gfx);
        }
        self.assets.release(gfx);
        log::info!("Engine shut down");
    }
}

/// Wall-clock time between frames.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
        }
    }

    /// Seconds since the previous tick, or since creation for the first one.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        self.frames += 1;
        dt
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

pub const HEADLESS_FRAME_TIME: f32 = 1.0 / 60.0;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeadlessSummary {
    pub frames: u32,
    pub last_frame: RenderStats,
    pub total_draw_calls: usize,
    pub recorded_commands: usize,
}

/// Runs `frames` fixed-step frames of `logic` against an in-memory graphics context.
pub fn run_headless(config: EngineConfig, logic: Box<dyn SceneLogic>, frames: u32) -> Result<HeadlessSummary, EngineError> {
    config.validate()?;

    let mut gfx = HeadlessContext::new();
    let mut engine = Engine::new(config);
    engine.request_scene(logic);

    let mut summary = HeadlessSummary::default();
    for frame in 0..frames {
        let stats = engine.frame(&mut gfx, HEADLESS_FRAME_TIME)?;
        log::debug!("Frame {frame}: {stats:?}");

        summary.frames += 1;
        summary.total_draw_calls += stats.draw_calls;
        summary.last_frame = stats;
    }
    summary.recorded_commands = gfx.commands().len();

    engine.shutdown(&mut gfx);
    log::info!("Headless run finished: {summary:?}");
    Ok(summary)
}

#[cfg(test)]
use {
    crate::{
        game::{
            entity::Entity,
            math::Color,
            sprite::SpriteRenderer,
            transform::Transform
        },
        rendering::{
            batch::BatchError,
            headless::GpuCommand
        }
    },
    std::{cell::RefCell, rc::Rc}
};

#[cfg(test)]
struct TexturedScene;

#[cfg(test)]
impl SceneLogic for TexturedScene {
    fn name(&self) -> &str {
        "textured"
    }

    fn init(&mut self, scene: &mut Scene, assets: &mut AssetPool, gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        let texture = assets.insert_texture("tiles/stone", 1, 1, &[90; 4], gfx)?;
        scene.add_entity(Entity::new("stone").with_component(SpriteRenderer::from_texture(texture)));
        Ok(())
    }
}

#[cfg(test)]
struct GridScene {
    name: &'static str,
    sprites: usize,
    updates: Rc<RefCell<u32>>,
}

#[cfg(test)]
impl SceneLogic for GridScene {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&mut self, scene: &mut Scene, _assets: &mut AssetPool, _gfx: &mut dyn GraphicsContext) -> Result<(), EngineError> {
        for i in 0..self.sprites {
            let transform = Transform::new(Vector2F::new(i as f32 * 8.0, 0.0), Vector2F::new(8.0, 8.0));
            scene.add_entity(Entity::with_transform(format!("cell{i}"), transform)
                .with_component(SpriteRenderer::from_color(Color::WHITE)));
        }
        Ok(())
    }

    fn update(&mut self, scene: &mut Scene, dt: f32) {
        *self.updates.borrow_mut() += 1;
        scene.camera_mut().position.x += dt;
    }
}

#[test]
fn test_frame_without_scene_draws_nothing() {
    let mut gfx = HeadlessContext::new();
    let mut engine = Engine::new(EngineConfig::default());

    assert_eq!(engine.frame(&mut gfx, 0.1).unwrap(), RenderStats::default());
    assert_eq!(gfx.frames(), 1);
}

#[test]
fn test_scene_switch_releases_previous_buffers() {
    let mut gfx = HeadlessContext::new();
    let mut config = EngineConfig::default();
    config.renderer.max_batch_size = 10;
    let mut engine = Engine::new(config);
    let updates = Rc::new(RefCell::new(0));

    engine.request_scene(Box::new(GridScene { name: "first", sprites: 25, updates: updates.clone() }));
    let stats = engine.frame(&mut gfx, 0.1).unwrap();
    assert_eq!(stats.batches, 3);
    assert_eq!(gfx.live_buffers(), 6);

    engine.request_scene(Box::new(GridScene { name: "second", sprites: 5, updates: updates.clone() }));
    let stats = engine.frame(&mut gfx, 0.1).unwrap();
    assert_eq!(stats.batches, 1);
    assert_eq!(gfx.live_buffers(), 2);
    assert_eq!(engine.scene().unwrap().name(), "second");
    assert_eq!(*updates.borrow(), 2);

    engine.shutdown(&mut gfx);
    assert_eq!(gfx.live_buffers(), 0);
    assert!(engine.scene().is_none());
}

#[test]
fn test_logic_update_runs_before_draw() {
    let mut gfx = HeadlessContext::new();
    let mut engine = Engine::new(EngineConfig::default());
    engine.request_scene(Box::new(GridScene { name: "pan", sprites: 1, updates: Rc::new(RefCell::new(0)) }));

    engine.frame(&mut gfx, 0.5).unwrap();
    engine.frame(&mut gfx, 0.25).unwrap();
    assert_eq!(engine.scene().unwrap().camera().position.x, 0.75);
}

#[test]
fn test_headless_run_reports_stats() {
    let logic = Box::new(GridScene { name: "grid", sprites: 1001, updates: Rc::new(RefCell::new(0)) });
    let summary = run_headless(EngineConfig::default(), logic, 3).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.last_frame, RenderStats { batches: 2, sprites: 1001, draw_calls: 2 });
    assert_eq!(summary.total_draw_calls, 6);
}

#[test]
fn test_failed_draw_still_ends_frame() {
    let mut gfx = HeadlessContext::new();
    let mut engine = Engine::new(EngineConfig::default());
    engine.request_scene(Box::new(TexturedScene));
    engine.frame(&mut gfx, 0.1).unwrap();

    let texture = gfx.commands().iter().find_map(|c| match c {
        GpuCommand::CreateTexture { texture, .. } => Some(*texture),
        _ => None,
    }).unwrap();
    gfx.release_texture(texture);

    let result = engine.frame(&mut gfx, 0.1);
    assert!(matches!(
        result,
        Err(EngineError::Scene(SceneError::Batch(BatchError::Graphics(GraphicsError::UnknownTexture(_)))))
    ));
    assert_eq!(gfx.frames(), 2);
    assert_eq!(gfx.commands().last(), Some(&GpuCommand::EndFrame));
}
