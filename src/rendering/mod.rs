pub mod batch;
pub mod gfx;
pub mod headless;
pub mod renderer;
pub mod shader;
pub mod texture;
pub mod wgpu_backend;
