//! Synthetic message and image content

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::Rng;
use std::io::Cursor;

use crate::error::PlanError;
use crate::platform::ImageUpload;

const WORDS: &[&str] = &[
    "alpha", "bravo", "build", "cache", "channel", "deploy", "design", "draft", "error", "fix",
    "green", "latency", "merge", "meeting", "notes", "patch", "plan", "queue", "release",
    "review", "rollback", "schema", "server", "ship", "sprint", "staging", "team", "test",
    "ticket", "today", "update", "upload", "user", "version", "weekly", "window",
];

/// Caption attached to media posts
pub const MEDIA_CAPTION: &str = "test media message";

/// Plain text message of 3 to 20 words
pub fn random_message<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(3..=20);
    let words: Vec<&str> = (0..len)
        .map(|_| WORDS[rng.random_range(0..WORDS.len())])
        .collect();

    let mut message = words.join(" ");
    if let Some(first) = message.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    message.push('.');
    message
}

/// Random blocky JPEG between 64 and 256 pixels on each side
pub fn random_image<R: Rng + ?Sized>(rng: &mut R) -> Result<ImageUpload, PlanError> {
    let width = rng.random_range(64..=256);
    let height = rng.random_range(64..=256);
    let block = rng.random_range(8..=32u32);
    let palette: Vec<[u8; 3]> = (0..6).map(|_| rng.random()).collect();

    let img = RgbImage::from_fn(width, height, |x, y| {
        let idx = ((x / block) as usize * 7 + (y / block) as usize * 3) % palette.len();
        Rgb(palette[idx])
    });

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| PlanError::Fixture(e.to_string()))?;

    Ok(ImageUpload {
        filename: format!("loadtest-{}x{}.jpg", width, height),
        content_type: "image/jpeg",
        bytes,
    })
}

/// Images rendered once and shared by every worker of a run
#[derive(Debug, Default)]
pub struct ImagePool {
    images: Vec<ImageUpload>,
}

impl ImagePool {
    pub fn render<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self, PlanError> {
        let images = (0..size)
            .map(|_| random_image(rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// A pooled image, or a freshly rendered one when the pool is empty
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ImageUpload, PlanError> {
        if self.images.is_empty() {
            return random_image(rng);
        }
        Ok(self.images[rng.random_range(0..self.images.len())].clone())
    }
}
