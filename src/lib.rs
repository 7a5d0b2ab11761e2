//! Minimal 2D engine core: an entity-component scene model feeding a sprite
//! renderer that packs sprites into as few draw calls as possible.

pub mod app;
pub mod assets;
pub mod config;
pub mod game;
pub mod rendering;
pub mod scenes;
