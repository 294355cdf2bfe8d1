//! Audio module - clip data handed to the playback engine
//!
//! This module provides:
//! - Immutable decoded sample buffers
//! - Clips and cues (main + aux pairs)
//! - Audio file loading

mod buffer;
mod clip;
mod file;

pub use buffer::{AudioBuffer, BufferError, MIN_PLAYABLE_SAMPLES};
pub use clip::{track_ok, Clip, Cue};
pub use file::{decode_file, load_clip, DecodedAudio, FileError};
