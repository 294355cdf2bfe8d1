//! soundboard - live-performance clip playback
//!
//! Pre-loaded clips are queued by an operator and played through an output
//! device. The realtime path (`playback::RealtimeMixer`) runs inside the
//! device callback; everything else happens on the control thread.
//!
//! ```no_run
//! use std::sync::Arc;
//! use soundboard::{audio, StreamController};
//!
//! let mut controller = StreamController::with_default_host();
//! let clip = Arc::new(audio::load_clip("intro.wav").unwrap());
//! if controller.open_device("Speakers") {
//!     controller.queue_clip(clip);
//!     controller.start(0).unwrap();
//! }
//! ```

pub mod audio;
pub mod device;
pub mod error;
pub mod playback;
pub mod settings;

pub use audio::{AudioBuffer, Clip, Cue};
pub use device::{AudioHost, CpalHost, DeviceDirectory, OfflineHost};
pub use error::PlaybackError;
pub use playback::{PlaybackEvent, StreamController, StreamState};
pub use settings::Settings;
