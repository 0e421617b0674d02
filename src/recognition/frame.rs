use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

/// One decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    /// Where the frame came from (spool file name), for diagnostics.
    pub origin: Option<String>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            origin: None,
        }
    }

    pub fn with_origin(image: DynamicImage, origin: impl Into<String>) -> Self {
        Self {
            image,
            origin: Some(origin.into()),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Cut the region out of the frame, clamped to the frame bounds.
    pub fn crop(&self, region: &BoundingBox) -> DynamicImage {
        let clamped = region.clamp_to(self.dimensions());
        self.image
            .crop_imm(clamped.x, clamped.y, clamped.width, clamped.height)
    }
}

/// Axis-aligned face region in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn clamp_to(&self, (frame_width, frame_height): (u32, u32)) -> BoundingBox {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        BoundingBox {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}
