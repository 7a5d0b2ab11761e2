use std::path::Path;

use super::gfx::{
    GraphicsContext,
    GraphicsError,
    TextureId
};

/// GPU-resident image. Two textures are the same texture when their ids match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    label: String,
}

impl Texture {
    pub fn new<S: AsRef<str>>(id: TextureId, width: u32, height: u32, label: S) -> Self {
        Self {
            id,
            width,
            height,
            label: label.as_ref().to_string()
        }
    }

    /// Uploads raw RGBA8 pixels, bottom row first.
    pub fn upload<S: AsRef<str>>(gfx: &mut dyn GraphicsContext, width: u32, height: u32, rgba: &[u8], label: S) -> Result<Self, GraphicsError> {
        let id = gfx.create_texture(width, height, rgba)?;
        log::debug!("Texture '{}' uploaded as {:?} ({}x{})", label.as_ref(), id, width, height);
        Ok(Self::new(id, width, height, label))
    }

    /// Decodes an image file flipped vertically, so `v = 0` ends up at the bottom of the image.
    pub fn decode_file(path: &Path) -> Result<image::RgbaImage, image::ImageError> {
        Ok(image::open(path)?.flipv().to_rgba8())
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bind(&self, gfx: &mut dyn GraphicsContext, unit: u32) -> Result<(), GraphicsError> {
        gfx.bind_texture(unit, self.id)
    }

    pub fn unbind(&self, gfx: &mut dyn GraphicsContext, unit: u32) {
        gfx.unbind_texture(unit);
    }
}
