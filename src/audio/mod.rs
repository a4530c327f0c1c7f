//! Audio representation and transforms
//!
//! Handles:
//! - The PCM audio value object shared by every pipeline stage
//! - Sample-rate conversion and stereo downmixing
//! - Fixed-size re-chunking of variable-length audio byte streams

mod chunker;
mod pcm;
mod resample;

pub use chunker::FrameChunker;
pub use pcm::{Audio, DEFAULT_SILENCE_THRESHOLD};
pub use resample::resample;
