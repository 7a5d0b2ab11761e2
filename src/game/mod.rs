pub mod camera;
pub mod component;
pub mod entity;
pub mod math;
pub mod scene;
pub mod sprite;
pub mod transform;
