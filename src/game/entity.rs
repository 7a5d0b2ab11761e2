use super::{
    component::{BehaviorContext, Component, ComponentKind},
    sprite::SpriteRenderer,
    transform::Transform
};

pub type EntityId = u32;

/// Named container of components with one transform.
///
/// Components run in insertion order. Several components of the same kind
/// may be added, lookups return the first one.
#[derive(Debug)]
pub struct Entity {
    id: Option<EntityId>,
    name: String,
    pub transform: Transform,
    components: Vec<Component>,
}

impl Entity {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self::with_transform(name, Transform::default())
    }

    pub fn with_transform<S: AsRef<str>>(name: S, transform: Transform) -> Self {
        Self {
            id: None,
            name: name.as_ref().to_string(),
            transform,
            components: vec![],
        }
    }

    /// Scene-assigned handle, `None` until the entity is added to a scene.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn attach(&mut self, id: EntityId) {
        self.id = Some(id);
        for component in self.components.iter_mut() {
            component.attach(self.id);
        }
    }

    pub fn add_component<C: Into<Component>>(&mut self, component: C) {
        let mut component = component.into();
        component.attach(self.id);
        self.components.push(component);
    }

    /// Builder form of [`Self::add_component`].
    pub fn with_component<C: Into<Component>>(mut self, component: C) -> Self {
        self.add_component(component);
        self
    }

    pub fn get_component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind() == kind)
    }

    pub fn get_component_mut(&mut self, kind: ComponentKind) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.kind() == kind)
    }

    pub fn sprite_renderer(&self) -> Option<&SpriteRenderer> {
        self.get_component(ComponentKind::SpriteRenderer)
            .and_then(Component::as_sprite_renderer)
    }

    /// Removes the first component of `kind`, if any.
    pub fn remove_component(&mut self, kind: ComponentKind) -> Option<Component> {
        let position = self.components.iter().position(|c| c.kind() == kind)?;
        let mut removed = self.components.remove(position);
        removed.attach(None);
        Some(removed)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn start(&mut self) {
        let mut ctx = BehaviorContext {
            entity: self.id,
            name: &self.name,
            transform: &mut self.transform,
        };
        for component in self.components.iter_mut() {
            component.start(&mut ctx);
        }
    }

    pub fn update(&mut self, dt: f32) {
        let mut ctx = BehaviorContext {
            entity: self.id,
            name: &self.name,
            transform: &mut self.transform,
        };
        for component in self.components.iter_mut() {
            component.update(dt, &mut ctx);
        }
    }
}

#[cfg(test)]
use {
    super::{component::Behavior, math::{Color, Vector2F}},
    std::{cell::RefCell, rc::Rc}
};

#[cfg(test)]
struct Recorder {
    tag: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

#[cfg(test)]
impl Behavior for Recorder {
    fn kind(&self) -> &'static str {
        "recorder"
    }

    fn start(&mut self, ctx: &mut BehaviorContext<'_>) {
        self.log.borrow_mut().push(format!("start {} on {}", self.tag, ctx.name));
    }

    fn update(&mut self, dt: f32, ctx: &mut BehaviorContext<'_>) {
        ctx.transform.position += Vector2F::new(dt, 0.0);
        self.log.borrow_mut().push(format!("update {}", self.tag));
    }
}

#[test]
fn test_missing_component_lookup_is_none() {
    let entity = Entity::new("empty");
    assert!(entity.sprite_renderer().is_none());
    assert!(entity.get_component(ComponentKind::Behavior("recorder")).is_none());
}

#[test]
fn test_first_of_duplicate_components_wins() {
    let mut entity = Entity::new("twice");
    entity.add_component(SpriteRenderer::from_color(Color::BLACK));
    entity.add_component(SpriteRenderer::from_color(Color::WHITE));

    assert_eq!(entity.components().len(), 2);
    assert_eq!(entity.sprite_renderer().unwrap().color(), Color::BLACK);

    entity.remove_component(ComponentKind::SpriteRenderer).unwrap();
    assert_eq!(entity.sprite_renderer().unwrap().color(), Color::WHITE);

    entity.remove_component(ComponentKind::SpriteRenderer).unwrap();
    assert!(entity.remove_component(ComponentKind::SpriteRenderer).is_none());
}

#[test]
fn test_attach_sets_back_reference() {
    let mut entity = Entity::new("owned").with_component(SpriteRenderer::from_color(Color::WHITE));
    assert_eq!(entity.sprite_renderer().unwrap().owner(), None);

    entity.attach(7);
    assert_eq!(entity.sprite_renderer().unwrap().owner(), Some(7));

    entity.add_component(SpriteRenderer::from_color(Color::BLACK));
    let removed = entity.remove_component(ComponentKind::SpriteRenderer).unwrap();
    assert_eq!(removed.as_sprite_renderer().unwrap().owner(), None);
    assert_eq!(entity.sprite_renderer().unwrap().owner(), Some(7));
}

#[test]
fn test_dispatch_in_insertion_order() {
    let log = Rc::new(RefCell::new(vec![]));
    let mut entity = Entity::new("ordered")
        .with_component(Box::new(Recorder { tag: "a", log: log.clone() }))
        .with_component(SpriteRenderer::from_color(Color::WHITE))
        .with_component(Box::new(Recorder { tag: "b", log: log.clone() }));

    entity.start();
    entity.update(0.5);
    entity.update(0.25);

    assert_eq!(*log.borrow(), vec![
        "start a on ordered",
        "start b on ordered",
        "update a",
        "update b",
        "update a",
        "update b",
    ]);
    assert_eq!(entity.transform.position, Vector2F::new(1.5, 0.0));
}
