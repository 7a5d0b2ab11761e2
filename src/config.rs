use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    game::math::{Color, Vector2F},
    rendering::renderer::DEFAULT_MAX_BATCH_SIZE
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ConfigError, file '{path}', reason='{source}'")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ConfigError, reason='{0}'")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config, reason='{0}'")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Sprite Batcher".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub max_batch_size: usize,
    pub clear_color: Color,
    /// Shader file with `#type` sections, the bundled shader is used when unset.
    pub shader: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            clear_color: Color::new(0.1, 0.1, 0.1, 1.0),
            shader: None,
        }
    }
}

/// Logical viewport in world units, 40x22.5 tiles of 32 units by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl CameraConfig {
    pub fn viewport(&self) -> Vector2F {
        Vector2F::new(self.viewport_width, self.viewport_height)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            viewport_width: 32.0 * 40.0,
            viewport_height: 32.0 * 22.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpritesheetConfig {
    pub path: PathBuf,
    pub sprite_width: u32,
    pub sprite_height: u32,
    pub count: usize,
    pub spacing: u32,
}

impl Default for SpritesheetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/textures/spritesheet.png"),
            sprite_width: 16,
            sprite_height: 16,
            count: 26,
            spacing: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Sprites laid out in a grid by the demo scene.
    pub sprites: usize,
    /// Distinct generated textures shared by those sprites.
    pub textures: usize,
    pub sprite_size: f32,
    /// How far the camera sways left and right, in world units.
    pub pan_amplitude: f32,
    pub spritesheet: Option<SpritesheetConfig>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            sprites: 2000,
            textures: 12,
            sprite_size: 16.0,
            pan_amplitude: 64.0,
            spritesheet: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub camera: CameraConfig,
    pub demo: DemoConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.max_batch_size == 0 {
            return Err(ConfigError::Invalid("renderer.max_batch_size must be greater than 0".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!("window size {}x{} must be non-zero", self.window.width, self.window.height)));
        }
        if self.camera.viewport_width <= 0.0 || self.camera.viewport_height <= 0.0 {
            return Err(ConfigError::Invalid("camera viewport must be positive".to_string()));
        }
        if self.demo.sprites > 0 && self.demo.textures == 0 && self.demo.spritesheet.is_none() {
            log::warn!("Demo sprites will be drawn untextured");
        }
        if let Some(sheet) = &self.demo.spritesheet {
            if sheet.sprite_width == 0 || sheet.sprite_height == 0 {
                return Err(ConfigError::Invalid("spritesheet sprite size must be non-zero".to_string()));
            }
        }
        Ok(())
    }
}

#[test]
fn test_defaults_are_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.renderer.max_batch_size, 1000);
    assert_eq!(config.camera.viewport(), Vector2F::new(1280.0, 720.0));
}

#[test]
fn test_partial_json_falls_back_to_defaults() {
    let config: EngineConfig = serde_json::from_str(r#"{ "renderer": { "max_batch_size": 16 } }"#).unwrap();
    assert_eq!(config.renderer.max_batch_size, 16);
    assert_eq!(config.window, WindowConfig::default());
    assert!(config.renderer.shader.is_none());
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let mut config = EngineConfig::default();
    config.renderer.max_batch_size = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}
