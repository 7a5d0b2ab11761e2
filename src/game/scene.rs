use crate::{
    app::EngineError,
    assets::AssetPool,
    rendering::{
        batch::BatchError,
        gfx::GraphicsContext,
        renderer::{RenderStats, Renderer}
    }
};

use super::{
    camera::Camera,
    entity::{Entity, EntityId}
};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("Scene '{0}' is not running")]
    NotRunning(String),
    #[error("SceneError, reason='{0}'")]
    Batch(#[from] BatchError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SceneState {
    Uninitialized,
    Running,
}

/// Entity store with a camera and a renderer.
///
/// Entities added while the scene is running are queued and registered at
/// the start of the next update, always before that frame is drawn.
pub struct Scene {
    name: String,
    camera: Camera,
    renderer: Renderer,
    entities: Vec<Entity>,
    // entities[started..] are queued
    started: usize,
    next_id: EntityId,
    state: SceneState,
}

impl Scene {
    pub fn new<S: AsRef<str>>(name: S, camera: Camera, renderer: Renderer) -> Self {
        Self {
            name: name.as_ref().to_string(),
            camera,
            renderer,
            entities: vec![],
            started: 0,
            next_id: 0,
            state: SceneState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SceneState::Running
    }

    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;

        entity.attach(id);
        log::trace!("Scene '{}' queued entity '{}' as #{id}", self.name, entity.name());
        self.entities.push(entity);
        id
    }

    /// Uninitialized to running. Starts every queued entity.
    pub fn start(&mut self, gfx: &mut dyn GraphicsContext) -> Result<(), SceneError> {
        if self.is_running() {
            return Ok(());
        }
        self.flush_queued(gfx)?;
        self.state = SceneState::Running;
        log::info!("Scene '{}' running with {} entities", self.name, self.entities.len());
        Ok(())
    }

    pub fn update(&mut self, dt: f32, gfx: &mut dyn GraphicsContext) -> Result<RenderStats, SceneError> {
        if !self.is_running() {
            return Err(SceneError::NotRunning(self.name.clone()));
        }

        self.flush_queued(gfx)?;
        for entity in self.entities.iter_mut() {
            entity.update(dt);
        }

        Ok(self.renderer.render(gfx, &self.camera)?)
    }

    fn flush_queued(&mut self, gfx: &mut dyn GraphicsContext) -> Result<(), SceneError> {
        while self.started < self.entities.len() {
            let entity = &mut self.entities[self.started];
            entity.start();
            self.renderer.add_entity(gfx, entity)?;
            self.started += 1;
        }
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == Some(id))
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id() == Some(id))
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn queued_count(&self) -> usize {
        self.entities.len() - self.started
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Frees the renderer's GPU buffers and requeues every entity, so a later
    /// [`Scene::start`] starts and registers them again.
    pub fn release(&mut self, gfx: &mut dyn GraphicsContext) {
        self.renderer.release(gfx);
        self.started = 0;
        self.state = SceneState::Uninitialized;
        log::info!("Scene '{}' released", self.name);
    }
}

/// The part of a scene a game supplies.
pub trait SceneLogic {
    fn name(&self) -> &str;

    /// Loads resources and populates the freshly created scene.
    fn init(&mut self, scene: &mut Scene, assets: &mut AssetPool, gfx: &mut dyn GraphicsContext) -> Result<(), EngineError>;

    /// Runs before the scene updates its entities.
    fn update(&mut self, _scene: &mut Scene, _dt: f32) {}
}

#[cfg(test)]
use {
    super::{
        math::{Color, Vector2F},
        sprite::SpriteRenderer,
        transform::Transform
    },
    crate::rendering::{
        batch::Vertex,
        headless::HeadlessContext,
        shader::{Shader, ShaderSource}
    },
    std::rc::Rc
};

#[cfg(test)]
fn test_scene(gfx: &mut HeadlessContext) -> Scene {
    let source = ShaderSource::parse("#type vertex\nv\n#type fragment\nf\n").unwrap();
    let shader = Rc::new(Shader::compile(gfx, "test", source, &Vertex::LAYOUT).unwrap());
    let camera = Camera::new(Vector2F::zero(), Vector2F::new(1280.0, 720.0));
    Scene::new("test", camera, Renderer::with_max_batch_size(shader, 4))
}

#[cfg(test)]
fn colored(name: &str, x: f32) -> Entity {
    Entity::with_transform(name, Transform::new(Vector2F::new(x, 0.0), Vector2F::new(32.0, 32.0)))
        .with_component(SpriteRenderer::from_color(Color::WHITE))
}

#[test]
fn test_update_before_start_fails() {
    let mut gfx = HeadlessContext::new();
    let mut scene = test_scene(&mut gfx);
    assert_eq!(scene.state(), SceneState::Uninitialized);
    assert!(matches!(scene.update(0.016, &mut gfx), Err(SceneError::NotRunning(_))));
}

#[test]
fn test_start_registers_queued_sprites() {
    let mut gfx = HeadlessContext::new();
    let mut scene = test_scene(&mut gfx);
    let first = scene.add_entity(colored("a", 0.0));
    let second = scene.add_entity(colored("b", 40.0));
    scene.add_entity(Entity::new("no sprite"));

    assert_ne!(first, second);
    assert_eq!(scene.entity(second).unwrap().sprite_renderer().unwrap().owner(), Some(second));
    assert_eq!(scene.queued_count(), 3);
    assert!(scene.renderer().batches().is_empty());

    scene.start(&mut gfx).unwrap();
    assert!(scene.is_running());
    assert_eq!(scene.queued_count(), 0);
    assert_eq!(scene.renderer().batches()[0].sprite_count(), 2);
}

#[test]
fn test_entity_added_while_running_is_drawn_same_frame() {
    let mut gfx = HeadlessContext::new();
    let mut scene = test_scene(&mut gfx);
    scene.add_entity(colored("a", 0.0));
    scene.start(&mut gfx).unwrap();

    let stats = scene.update(0.016, &mut gfx).unwrap();
    assert_eq!(stats.sprites, 1);

    scene.add_entity(colored("late", 64.0));
    let stats = scene.update(0.016, &mut gfx).unwrap();
    assert_eq!(stats.sprites, 2);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_release_returns_to_uninitialized() {
    let mut gfx = HeadlessContext::new();
    let mut scene = test_scene(&mut gfx);
    for i in 0..5 {
        scene.add_entity(colored("e", i as f32 * 10.0));
    }
    scene.start(&mut gfx).unwrap();
    assert_eq!(scene.renderer().batches().len(), 2);

    scene.release(&mut gfx);
    assert_eq!(gfx.live_buffers(), 0);
    assert!(!scene.is_running());
}

#[test]
fn test_restart_after_release_draws_every_sprite() {
    let mut gfx = HeadlessContext::new();
    let mut scene = test_scene(&mut gfx);
    scene.add_entity(colored("a", 0.0));
    scene.add_entity(colored("b", 40.0));
    scene.start(&mut gfx).unwrap();

    scene.release(&mut gfx);
    assert_eq!(scene.queued_count(), 2);
    assert!(matches!(scene.update(0.016, &mut gfx), Err(SceneError::NotRunning(_))));

    scene.start(&mut gfx).unwrap();
    let stats = scene.update(0.016, &mut gfx).unwrap();
    assert_eq!(stats, RenderStats { batches: 1, sprites: 2, draw_calls: 1 });
}
