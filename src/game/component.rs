use super::{
    entity::EntityId,
    sprite::SpriteRenderer,
    transform::Transform
};

/// Tag used to look components up on an entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    SpriteRenderer,
    Behavior(&'static str),
}

/// What a behavior can see of its entity while it runs.
pub struct BehaviorContext<'a> {
    pub entity: Option<EntityId>,
    pub name: &'a str,
    pub transform: &'a mut Transform,
}

/// User logic attached to an entity.
pub trait Behavior {
    /// Name identifying this kind of behavior for lookups.
    fn kind(&self) -> &'static str;

    fn start(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    fn update(&mut self, dt: f32, ctx: &mut BehaviorContext<'_>);
}

pub enum Component {
    SpriteRenderer(SpriteRenderer),
    Behavior(Box<dyn Behavior>),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::SpriteRenderer(_) => ComponentKind::SpriteRenderer,
            Component::Behavior(behavior) => ComponentKind::Behavior(behavior.kind()),
        }
    }

    pub fn as_sprite_renderer(&self) -> Option<&SpriteRenderer> {
        match self {
            Component::SpriteRenderer(sprite) => Some(sprite),
            _ => None,
        }
    }

    pub(crate) fn attach(&mut self, owner: Option<EntityId>) {
        if let Component::SpriteRenderer(sprite) = self {
            sprite.set_owner(owner);
        }
    }

    pub(crate) fn start(&mut self, ctx: &mut BehaviorContext<'_>) {
        match self {
            Component::SpriteRenderer(sprite) => sprite.start(),
            Component::Behavior(behavior) => behavior.start(ctx),
        }
    }

    pub(crate) fn update(&mut self, dt: f32, ctx: &mut BehaviorContext<'_>) {
        match self {
            Component::SpriteRenderer(sprite) => sprite.update(dt),
            Component::Behavior(behavior) => behavior.update(dt, ctx),
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::SpriteRenderer(sprite) => f.debug_tuple("SpriteRenderer").field(sprite).finish(),
            Component::Behavior(behavior) => write!(f, "Behavior({})", behavior.kind()),
        }
    }
}

impl From<SpriteRenderer> for Component {
    fn from(value: SpriteRenderer) -> Self {
        Component::SpriteRenderer(value)
    }
}

impl<B: Behavior + 'static> From<Box<B>> for Component {
    fn from(value: Box<B>) -> Self {
        Component::Behavior(value)
    }
}
