//! Playback engine
//!
//! This module provides:
//! - The realtime mixer that runs inside the device callback
//! - Lock-free state shared between the control and audio threads
//! - Quadratic fade envelopes
//! - Observer notifications
//! - The stream controller (device lifecycle and control surface)
//! - The thread that owns the open host stream

mod controller;
mod events;
mod fade;
mod mixer;
mod state;
mod worker;

pub use controller::{StreamController, EVENT_CAPACITY};
pub use events::{
    EventBus, EventDispatcher, HaltHook, MixerEvent, PlaybackEvent, SubscriptionId,
};
pub use fade::{fade_in_gain, fade_out_gain, FadeEnvelope};
pub use mixer::{CallbackStatus, RealtimeMixer};
pub use state::{PlaybackState, SharedPlayback, StreamState};
pub use worker::{SettleHandle, StreamWorker};

/// Fixed output sample rate (Hz)
pub const SAMPLE_RATE: u32 = 44_100;

/// Fixed device buffer size in frames
pub const BUFFER_FRAMES: u32 = 256;

/// Channels on the main bus
pub const MAIN_CHANNELS: usize = 2;

/// Channels on the aux bus, present only on devices with four or more outputs
pub const AUX_CHANNELS: usize = 2;

/// Convert a duration in milliseconds to a frame count at `SAMPLE_RATE`
pub fn ms_to_frames(ms: u32) -> usize {
    (ms as u64 * SAMPLE_RATE as u64 / 1000) as usize
}
