use super::frame::{BoundingBox, Frame};

/// Reference capture resolution the minimum face size is expressed against.
const REFERENCE_WIDTH: f64 = 640.0;
const REFERENCE_HEIGHT: f64 = 480.0;

/// Finds candidate face regions in a frame. Zero or more per frame.
pub trait FaceDetector {
    fn detect_regions(&self, frame: &Frame) -> Vec<BoundingBox>;
}

/// Detector for kiosk cameras whose capture software already crops to the
/// face: the whole frame is the region, provided it is large enough to be a
/// face at all.
#[derive(Debug, Clone)]
pub struct FullFrameDetector {
    min_width: u32,
    min_height: u32,
}

impl FullFrameDetector {
    /// `min_fraction` is the smallest accepted face size as a share of a
    /// 640x480 capture.
    pub fn new(min_fraction: f64) -> Self {
        Self {
            min_width: (REFERENCE_WIDTH * min_fraction).round() as u32,
            min_height: (REFERENCE_HEIGHT * min_fraction).round() as u32,
        }
    }
}

impl FaceDetector for FullFrameDetector {
    fn detect_regions(&self, frame: &Frame) -> Vec<BoundingBox> {
        let (width, height) = frame.dimensions();
        if width < self.min_width || height < self.min_height {
            return Vec::new();
        }
        vec![BoundingBox::new(0, 0, width, height)]
    }
}
