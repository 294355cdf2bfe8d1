//! Playback state shared between the control and audio threads
//!
//! The audio thread owns a `PlaybackState` outright and never waits on the
//! control thread. Everything the two sides exchange goes through
//! `SharedPlayback`, which is built only from atomics:
//! - the queue is a single slot holding an `Arc<Cue>`; the control thread
//!   stores into it (last writer wins) and the audio thread swaps it out
//! - the active cue and sample cursor are published back for status queries
//! - volume is an `f32` stored as bits in an `AtomicU32`
//! - control requests (start, clear, fade-out) are single slots the audio
//!   thread takes at the top of its next callback, so repeating a request
//!   while the stream is idle never piles up

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::fade::FadeEnvelope;
use crate::audio::{AudioBuffer, Clip, Cue};

/// Stream lifecycle as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Closed,
    Open,
    Running,
    /// Running with a fade-out armed; halts when the fade completes
    FadingOut,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::Running,
            3 => Self::FadingOut,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::Running => 2,
            Self::FadingOut => 3,
        }
    }

    /// The mixer is producing audio in this state
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::FadingOut)
    }
}

/// Lock-free handoff surface between the control and audio threads
pub struct SharedPlayback {
    queued: ArcSwapOption<Cue>,
    active: ArcSwapOption<Cue>,
    active_sample: AtomicUsize,
    volume: AtomicU32,
    state: AtomicU8,
    start_request: AtomicUsize,
    clear_request: AtomicBool,
    fade_out_request: AtomicUsize,
}

/// Empty value of the frame-count request slots
const NO_REQUEST: usize = usize::MAX;

impl SharedPlayback {
    pub fn new() -> Self {
        Self {
            queued: ArcSwapOption::empty(),
            active: ArcSwapOption::empty(),
            active_sample: AtomicUsize::new(0),
            volume: AtomicU32::new(1.0_f32.to_bits()),
            state: AtomicU8::new(StreamState::Closed.as_u8()),
            start_request: AtomicUsize::new(NO_REQUEST),
            clear_request: AtomicBool::new(false),
            fade_out_request: AtomicUsize::new(NO_REQUEST),
        }
    }

    /// Replace the queued cue, discarding any unconsumed one
    pub fn queue(&self, cue: Option<Arc<Cue>>) {
        self.queued.store(cue);
    }

    /// Take the queued cue, leaving the slot empty
    pub fn take_queued(&self) -> Option<Arc<Cue>> {
        self.queued.swap(None)
    }

    pub fn queued(&self) -> Option<Arc<Cue>> {
        self.queued.load_full()
    }

    pub fn active(&self) -> Option<Arc<Cue>> {
        self.active.load_full()
    }

    pub fn active_clip(&self) -> Option<Arc<Clip>> {
        self.active().map(|cue| Arc::clone(&cue.main))
    }

    pub fn publish_active(&self, cue: Option<Arc<Cue>>) {
        self.active.store(cue);
    }

    pub fn active_sample(&self) -> usize {
        self.active_sample.load(Ordering::Relaxed)
    }

    pub fn publish_sample(&self, sample: usize) {
        self.active_sample.store(sample, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn stream_state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_stream_state(&self, state: StreamState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns whether this call made the transition, so a halt raced
    /// between the two threads is only acted on once.
    pub fn transition(&self, from: &[StreamState], to: StreamState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !from.contains(&StreamState::from_u8(current)) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Ask the mixer to (re)arm the fade-in and drop any fade-out. A later
    /// request replaces an unconsumed one.
    pub fn request_start(&self, fade_in: usize) {
        self.start_request
            .store(fade_in.min(NO_REQUEST - 1), Ordering::Release);
    }

    pub fn take_start_request(&self) -> Option<usize> {
        match self.start_request.swap(NO_REQUEST, Ordering::AcqRel) {
            NO_REQUEST => None,
            fade_in => Some(fade_in),
        }
    }

    /// Ask the mixer to drop its active cue
    pub fn request_clear(&self) {
        self.clear_request.store(true, Ordering::Release);
    }

    pub fn take_clear_request(&self) -> bool {
        self.clear_request.swap(false, Ordering::AcqRel)
    }

    /// Ask the mixer to fade out over `total` frames. The first unconsumed
    /// request wins. Returns false if one was already pending.
    pub fn request_fade_out(&self, total: usize) -> bool {
        self.fade_out_request
            .compare_exchange(
                NO_REQUEST,
                total.min(NO_REQUEST - 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Withdraw a fade-out the mixer has not picked up yet
    pub fn cancel_fade_out(&self) {
        self.fade_out_request.store(NO_REQUEST, Ordering::Release);
    }

    pub fn take_fade_out_request(&self) -> Option<usize> {
        match self.fade_out_request.swap(NO_REQUEST, Ordering::AcqRel) {
            NO_REQUEST => None,
            total => Some(total),
        }
    }

    /// Forget every cue, the cursor, and any pending request
    pub fn reset(&self) {
        self.queued.store(None);
        self.active.store(None);
        self.active_sample.store(0, Ordering::Relaxed);
        self.start_request.store(NO_REQUEST, Ordering::Release);
        self.clear_request.store(false, Ordering::Release);
        self.cancel_fade_out();
    }
}

impl Default for SharedPlayback {
    fn default() -> Self {
        Self::new()
    }
}

/// State owned by the audio thread
#[derive(Debug, Default)]
pub struct PlaybackState {
    pub active: Option<Arc<Cue>>,
    /// Offset into the active main buffer, always channel aligned
    pub cursor: usize,
    pub fade_in: FadeEnvelope,
    pub fade_out: Option<FadeEnvelope>,
}

impl PlaybackState {
    pub fn active_clip(&self) -> Option<&Clip> {
        self.active.as_deref().map(|cue| cue.main.as_ref())
    }

    pub fn main_buffer(&self) -> Option<&AudioBuffer> {
        self.active.as_deref().and_then(Cue::main_buffer)
    }

    pub fn is_playable(&self) -> bool {
        self.main_buffer().is_some()
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade_out.is_some()
    }
}
