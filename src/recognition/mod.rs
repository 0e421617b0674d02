pub mod classifier;
pub mod detector;
pub mod frame;
pub mod loop_worker;
pub mod phash;
pub mod sink;
pub mod source;

pub use classifier::{Classification, Classifier, GalleryClassifier, GalleryEntry, GalleryFile};
pub use detector::{FaceDetector, FullFrameDetector};
pub use frame::{BoundingBox, Frame};
pub use loop_worker::{
    recognition_loop, Decision, LoopOutcome, LoopParams, LoopSummary, RecognitionEvent,
    RecognitionObserver, RecognitionRig, SharedFrameSource, StopReason,
};
pub use sink::{capture_path, FsImageSink, ImageSink};
pub use source::{FrameSource, SpoolFrameSource};
