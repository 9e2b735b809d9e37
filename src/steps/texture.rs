//! Texture resizing and re-encoding.

use crate::config::ImageFormat;
use crate::document::{Document, MaterialId, Texture, TextureSlot};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageError};
use regex::Regex;
use std::io::Cursor;

/// JPEG quality used unless a step asks for another.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
/// JPEG quality for normal maps, where block artifacts show up as lighting errors.
pub const NORMAL_JPEG_QUALITY: u8 = 95;

/// Which textures a compression step touches.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSelector {
    All,
    /// Textures whose name or URI matches `pattern` at its start; with
    /// `matching: false`, every texture that does not.
    Name { pattern: String, matching: bool },
    /// Textures referenced through material slot `slot`; with
    /// `matching: false`, textures referenced through any other slot.
    Slot { slot: String, matching: bool },
}

enum Filter {
    All,
    Name(Regex, bool),
    Slot(String, bool),
}

impl Filter {
    fn selects(&self, texture: &Texture, users: &[(MaterialId, TextureSlot)]) -> bool {
        match self {
            Filter::All => true,
            Filter::Name(pattern, matching) => {
                let hit = [texture.name.as_deref(), texture.uri.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|s| pattern.is_match(s));
                hit == *matching
            }
            Filter::Slot(slot, matching) => users.iter().any(|(_, used)| (used.slot == *slot) == *matching),
        }
    }
}

/// Resize textures larger than `resize` (keeping aspect ratio) and encode
/// them as `format`. Unset `format` keeps each texture's own encoding;
/// textures already within bounds and in the target format are left alone.
pub struct TextureCompress {
    filter: Filter,
    format: Option<ImageFormat>,
    resize: Option<u32>,
    quality: u8,
}

impl TextureCompress {
    pub fn new(
        selector: &TextureSelector,
        format: Option<ImageFormat>,
        resize: Option<u32>,
        quality: Option<u8>,
    ) -> Result<Self, regex::Error> {
        let filter = match selector {
            TextureSelector::All => Filter::All,
            TextureSelector::Name { pattern, matching } => {
                Filter::Name(Regex::new(&format!("^(?:{})", pattern))?, *matching)
            }
            TextureSelector::Slot { slot, matching } => Filter::Slot(slot.clone(), *matching),
        };
        Ok(Self {
            filter,
            format,
            resize,
            quality: quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        })
    }

    fn compress(&self, texture: &mut Texture) -> Result<bool, StepError> {
        let Some(current) = ImageFormat::from_mime_type(&texture.mime_type) else {
            log::warn!("Leaving texture with MIME type {} untouched", texture.mime_type);
            return Ok(false);
        };
        let target = self.format.unwrap_or(current);
        let image = match image::load_from_memory(&texture.data) {
            Ok(image) => image,
            Err(ImageError::Unsupported(e)) => {
                log::warn!("Cannot decode {} texture: {}", texture.mime_type, e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let oversized = self
            .resize
            .filter(|r| image.width() > *r || image.height() > *r);
        if oversized.is_none() && target == current {
            return Ok(false);
        }
        let image = match oversized {
            Some(size) => image.resize(size, size, FilterType::Lanczos3),
            None => image,
        };
        texture.data = encode(&image, target, self.quality)?;
        texture.mime_type = target.mime_type().to_string();
        Ok(true)
    }
}

impl TransformStep for TextureCompress {
    fn name(&self) -> &'static str {
        "textureCompress"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let users = doc.texture_users();
        let mut changed = 0;
        for (texture, users) in doc.textures.iter_mut().zip(&users) {
            if self.filter.selects(texture, users) && self.compress(texture)? {
                changed += 1;
            }
        }
        log::debug!("Re-encoded {} textures", changed);
        Ok(())
    }
}

/// Encode an image. `quality` applies to lossy formats.
pub(crate) fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, StepError> {
    let (width, height) = (image.width(), image.height());
    let mut bytes = Vec::new();
    let cursor = Cursor::new(&mut bytes);
    match format {
        ImageFormat::Png => {
            if image.color().has_alpha() {
                let rgba = image.to_rgba8();
                PngEncoder::new(cursor).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            } else {
                let rgb = image.to_rgb8();
                PngEncoder::new(cursor).write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
            }
        }
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(cursor, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFormat::Webp => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(cursor).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        }
        ImageFormat::Avif => encode_avif(image, cursor, quality)?,
    }
    Ok(bytes)
}

#[cfg(feature = "avif")]
fn encode_avif(image: &DynamicImage, cursor: Cursor<&mut Vec<u8>>, quality: u8) -> Result<(), StepError> {
    let rgba = image.to_rgba8();
    image::codecs::avif::AvifEncoder::new_with_speed_quality(cursor, 8, quality).write_image(
        rgba.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(())
}

#[cfg(not(feature = "avif"))]
fn encode_avif(_image: &DynamicImage, _cursor: Cursor<&mut Vec<u8>>, _quality: u8) -> Result<(), StepError> {
    Err(StepError::UnsupportedFormat(
        "avif (build with the `avif` feature)".to_string(),
    ))
}
