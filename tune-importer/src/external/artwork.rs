//! Artwork normalization
//!
//! Embedded cover art is downsized to fit within 500x500 and re-encoded as
//! JPEG before it is written back on save.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use super::ArtworkNormalizer;
use crate::models::Artwork;

const MAX_DIMENSION: u32 = 500;

/// Normalizer producing JPEG artwork no larger than 500x500
#[derive(Debug, Clone)]
pub struct JpegNormalizer {
    max_dimension: u32,
}

impl JpegNormalizer {
    pub fn new() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
        }
    }

    fn encode(&self, img: DynamicImage) -> anyhow::Result<Vec<u8>> {
        let img = if img.width() > self.max_dimension || img.height() > self.max_dimension {
            img.thumbnail(self.max_dimension, self.max_dimension)
        } else {
            img
        };

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    }
}

impl Default for JpegNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtworkNormalizer for JpegNormalizer {
    fn normalize(&self, artwork: &Artwork) -> anyhow::Result<Artwork> {
        let img = image::load_from_memory(&artwork.data)?;
        let data = self.encode(img)?;
        Ok(Artwork::new("image/jpeg", data))
    }
}
