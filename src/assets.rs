use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc
};

use crate::{
    game::sprite::{Spritesheet, SpritesheetError},
    rendering::{
        batch::Vertex,
        gfx::{GraphicsContext, GraphicsError},
        shader::{Shader, ShaderError, ShaderSource},
        texture::Texture
    }
};

pub const DEFAULT_SHADER_NAME: &str = "default";
const DEFAULT_SHADER_SOURCE: &str = include_str!("../assets/shaders/default.wgsl");

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("AssetError, image '{path}', reason='{source}'")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("AssetError, reason='{0}'")]
    Shader(#[from] ShaderError),
    #[error("Spritesheet '{0}' was never registered")]
    SpritesheetNotRegistered(PathBuf),
    #[error("AssetError, reason='{0}'")]
    InvalidSpritesheet(#[from] SpritesheetError),
    #[error("AssetError, reason='{0}'")]
    Graphics(#[from] GraphicsError),
}

/// Load-once cache of shaders, textures and spritesheets.
///
/// Every path is made absolute before lookup so different spellings of the
/// same file share one handle.
#[derive(Default)]
pub struct AssetPool {
    shaders: HashMap<PathBuf, Rc<Shader>>,
    textures: HashMap<PathBuf, Rc<Texture>>,
    spritesheets: HashMap<PathBuf, Rc<Spritesheet>>,
    default_shader: Option<Rc<Shader>>,
}

fn resolve<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl AssetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shader<P: AsRef<Path>>(&mut self, path: P, gfx: &mut dyn GraphicsContext) -> Result<Rc<Shader>, AssetError> {
        let key = resolve(path);
        if let Some(shader) = self.shaders.get(&key) {
            return Ok(shader.clone());
        }

        let source = ShaderSource::load(&key)?;
        let shader = Rc::new(Shader::compile(gfx, key.display().to_string(), source, &Vertex::LAYOUT)?);
        log::info!("Loaded shader {:?}", key);
        self.shaders.insert(key, shader.clone());
        Ok(shader)
    }

    /// The shader bundled with the crate, compiled on first use.
    pub fn default_shader(&mut self, gfx: &mut dyn GraphicsContext) -> Result<Rc<Shader>, AssetError> {
        if let Some(shader) = &self.default_shader {
            return Ok(shader.clone());
        }

        let source = ShaderSource::parse(DEFAULT_SHADER_SOURCE)?;
        let shader = Rc::new(Shader::compile(gfx, DEFAULT_SHADER_NAME, source, &Vertex::LAYOUT)?);
        self.default_shader = Some(shader.clone());
        Ok(shader)
    }

    pub fn texture<P: AsRef<Path>>(&mut self, path: P, gfx: &mut dyn GraphicsContext) -> Result<Rc<Texture>, AssetError> {
        let key = resolve(path);
        if let Some(texture) = self.textures.get(&key) {
            return Ok(texture.clone());
        }

        let image = Texture::decode_file(&key)
            .map_err(|source| AssetError::Image { path: key.clone(), source })?;
        let texture = Rc::new(Texture::upload(gfx, image.width(), image.height(), image.as_raw(), key.display().to_string())?);
        log::info!("Loaded texture {:?} ({}x{})", key, texture.width(), texture.height());
        self.textures.insert(key, texture.clone());
        Ok(texture)
    }

    /// Registers pixels generated at runtime under `key`. An existing entry is returned as is.
    pub fn insert_texture<P: AsRef<Path>>(&mut self, key: P, width: u32, height: u32, rgba: &[u8], gfx: &mut dyn GraphicsContext) -> Result<Rc<Texture>, AssetError> {
        let key = resolve(key);
        if let Some(texture) = self.textures.get(&key) {
            return Ok(texture.clone());
        }

        let label = key.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| key.display().to_string());
        let texture = Rc::new(Texture::upload(gfx, width, height, rgba, label)?);
        self.textures.insert(key, texture.clone());
        Ok(texture)
    }

    /// First registration under a path wins, later ones are ignored.
    pub fn add_spritesheet<P: AsRef<Path>>(&mut self, path: P, sheet: Spritesheet) -> Rc<Spritesheet> {
        let key = resolve(path);
        self.spritesheets.entry(key)
            .or_insert_with(|| Rc::new(sheet))
            .clone()
    }

    /// Loads the texture at `path`, slices it and registers the sheet under the same path.
    pub fn load_spritesheet<P: AsRef<Path>>(
        &mut self,
        path: P,
        sprite_width: u32,
        sprite_height: u32,
        count: usize,
        spacing: u32,
        gfx: &mut dyn GraphicsContext
    ) -> Result<Rc<Spritesheet>, AssetError> {
        if let Ok(sheet) = self.spritesheet(&path) {
            return Ok(sheet);
        }

        let texture = self.texture(&path, gfx)?;
        let sheet = Spritesheet::new(texture, sprite_width, sprite_height, count, spacing)?;
        Ok(self.add_spritesheet(path, sheet))
    }

    pub fn spritesheet<P: AsRef<Path>>(&self, path: P) -> Result<Rc<Spritesheet>, AssetError> {
        let key = resolve(path);
        self.spritesheets.get(&key)
            .cloned()
            .ok_or(AssetError::SpritesheetNotRegistered(key))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len() + self.default_shader.iter().count()
    }

    /// Frees every cached GPU resource and empties the pool.
    pub fn release(&mut self, gfx: &mut dyn GraphicsContext) {
        self.spritesheets.clear();
        for (_, texture) in self.textures.drain() {
            gfx.release_texture(texture.id());
        }
        for (_, shader) in self.shaders.drain() {
            shader.release(gfx);
        }
        if let Some(shader) = self.default_shader.take() {
            shader.release(gfx);
        }
        log::debug!("Asset pool released");
    }
}

#[cfg(test)]
use crate::rendering::headless::HeadlessContext;

#[test]
fn test_same_path_yields_same_texture() {
    let mut gfx = HeadlessContext::new();
    let mut pool = AssetPool::new();

    let first = pool.insert_texture("textures/white", 1, 1, &[255; 4], &mut gfx).unwrap();
    let second = pool.insert_texture("textures/white", 1, 1, &[0; 4], &mut gfx).unwrap();
    let cwd = std::env::current_dir().unwrap();
    let third = pool.insert_texture(cwd.join("textures/white"), 1, 1, &[0; 4], &mut gfx).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert!(Rc::ptr_eq(&first, &third));
    assert_eq!(first.label(), "white");
    assert_eq!(gfx.live_textures(), 1);
}

#[test]
fn test_default_shader_compiles_once() {
    let mut gfx = HeadlessContext::new();
    let mut pool = AssetPool::new();

    let a = pool.default_shader(&mut gfx).unwrap();
    let b = pool.default_shader(&mut gfx).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert!(a.source().vertex.contains("vs_main"));
    assert!(a.source().fragment.contains("fs_main"));
}

#[test]
fn test_missing_spritesheet_is_an_error() {
    let pool = AssetPool::new();
    assert!(matches!(
        pool.spritesheet("assets/textures/spritesheet.png"),
        Err(AssetError::SpritesheetNotRegistered(_))
    ));
}

#[test]
fn test_first_spritesheet_registration_wins() {
    let mut gfx = HeadlessContext::new();
    let mut pool = AssetPool::new();
    let texture = pool.insert_texture("sheet.png", 32, 32, &[255; 32 * 32 * 4], &mut gfx).unwrap();

    let first = pool.add_spritesheet("sheet.png", Spritesheet::new(texture.clone(), 16, 16, 4, 0).unwrap());
    let second = pool.add_spritesheet("sheet.png", Spritesheet::new(texture, 8, 8, 16, 0).unwrap());

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(pool.spritesheet("sheet.png").unwrap().len(), 4);
}

#[test]
fn test_release_frees_textures_and_shaders() {
    let mut gfx = HeadlessContext::new();
    let mut pool = AssetPool::new();
    pool.insert_texture("a", 1, 1, &[255; 4], &mut gfx).unwrap();
    pool.default_shader(&mut gfx).unwrap();

    pool.release(&mut gfx);
    assert_eq!(gfx.live_textures(), 0);
    assert_eq!(pool.texture_count(), 0);
    assert_eq!(pool.shader_count(), 0);
}
