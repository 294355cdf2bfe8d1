//! Realtime mixer
//!
//! `RealtimeMixer::render` is the body of the device callback. Per frame it
//! picks the read offset in the active clip, handles end-of-clip promotion,
//! applies volume and fades, and writes the main pair (and the aux pair on
//! four-channel devices).
//!
//! Nothing here locks or logs. Control requests are taken from single-slot
//! atomics in `SharedPlayback`; notifications and retired cues leave as
//! `MixerEvent`s on an SPSC ring.

use std::sync::Arc;

use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use super::events::MixerEvent;
use super::fade::FadeEnvelope;
use super::state::{PlaybackState, SharedPlayback};
use super::{AUX_CHANNELS, MAIN_CHANNELS};
use crate::audio::{AudioBuffer, Cue};

/// Retired cues parked while the event ring is full
const RETIRE_SLOTS: usize = 8;

/// Result of one callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Continue,
    /// Playback ended; the stream should stop now
    Halt,
}

pub struct RealtimeMixer {
    shared: Arc<SharedPlayback>,
    state: PlaybackState,
    out_channels: usize,
    events: HeapProd<MixerEvent>,
    retired: [Option<Arc<Cue>>; RETIRE_SLOTS],
}

impl RealtimeMixer {
    /// `out_channels` of four or more enables the aux pair, anything less
    /// is treated as plain stereo.
    pub fn new(
        shared: Arc<SharedPlayback>,
        out_channels: u16,
        events: HeapProd<MixerEvent>,
    ) -> Self {
        let out_channels = if out_channels as usize >= MAIN_CHANNELS + AUX_CHANNELS {
            MAIN_CHANNELS + AUX_CHANNELS
        } else {
            MAIN_CHANNELS
        };

        Self {
            shared,
            state: PlaybackState::default(),
            out_channels,
            events,
            retired: Default::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Fill one interleaved device buffer
    pub fn render(&mut self, out: &mut [f32]) -> CallbackStatus {
        self.flush_retired();
        self.apply_requests();
        out.fill(0.0);
        let status = self.mix(out);
        self.shared.publish_sample(self.state.cursor);
        status
    }

    fn mix(&mut self, out: &mut [f32]) -> CallbackStatus {
        let volume = self.shared.volume();

        if self.state.active.is_none() {
            self.promote();
        }
        if !self.state.is_playable() {
            return self.skip_unplayable();
        }

        for frame in out.chunks_exact_mut(self.out_channels) {
            let (channels, len) = match self.state.main_buffer() {
                Some(buffer) => (buffer.channels(), buffer.len()),
                None => return self.skip_unplayable(),
            };

            // A fade-out reads ahead of the cursor instead of moving it
            let mut read = self.state.cursor;
            if let Some(fade) = self.state.fade_out {
                read += fade.elapsed * channels;
            }

            if read + 1 > len {
                let ended_auto_stop = self.state.active_clip().is_some_and(|c| c.auto_stop);
                self.state.cursor = 0;
                read = 0;
                self.promote();
                if !self.state.is_playable() {
                    return self.skip_unplayable();
                }
                if ended_auto_stop {
                    return self.end_playback();
                }
            }

            let mut gain = volume * self.state.fade_in.step_in();
            let mut fade_done = false;
            if let Some(fade) = self.state.fade_out.as_mut() {
                gain *= fade.step_out();
                fade_done = fade.is_complete();
            }

            let advance = match self.state.active.as_deref() {
                Some(cue) => write_frame(frame, cue, read, gain),
                None => 0,
            };

            if fade_done {
                return self.end_playback();
            }
            if !self.state.is_fading_out() {
                self.state.cursor += advance;
            }
        }

        CallbackStatus::Continue
    }

    /// Start first: it drops a stale fade-out before a new one is armed
    fn apply_requests(&mut self) {
        if let Some(fade_in) = self.shared.take_start_request() {
            self.state.fade_in = FadeEnvelope::new(fade_in);
            self.state.fade_out = None;
        }
        if self.shared.take_clear_request() {
            self.clear_active();
        }
        if let Some(total) = self.shared.take_fade_out_request() {
            if total > 0 && self.state.fade_out.is_none() {
                self.state.fade_out = Some(FadeEnvelope::new(total));
            }
        }
    }

    /// Move the queued cue into the active slot. Leaves the slot empty if
    /// nothing was queued.
    fn promote(&mut self) {
        let next = self.shared.take_queued();
        self.shared.publish_active(next.clone());
        self.state.cursor = 0;

        if let Some(previous) = std::mem::replace(&mut self.state.active, next) {
            self.retire(previous);
        }
        if let Some(cue) = self.state.active.clone() {
            self.push(MixerEvent::TrackStarted(cue));
        }
        self.push(MixerEvent::QueueChanged);
    }

    fn clear_active(&mut self) {
        self.state.cursor = 0;
        self.shared.publish_active(None);
        if let Some(previous) = self.state.active.take() {
            self.retire(previous);
        }
    }

    /// Unplayable cues are dropped so the next start promotes the queue
    fn skip_unplayable(&mut self) -> CallbackStatus {
        self.clear_active();
        self.end_playback()
    }

    fn end_playback(&mut self) -> CallbackStatus {
        self.state.fade_out = None;
        self.push(MixerEvent::Stopped);
        CallbackStatus::Halt
    }

    fn push(&mut self, event: MixerEvent) {
        // A full ring drops the notification rather than blocking the callback
        let _ = self.events.try_push(event);
    }

    /// Hand a cue to the dispatcher thread to be dropped there. With the
    /// ring full it is parked until a later callback can send it.
    fn retire(&mut self, cue: Arc<Cue>) {
        if let Err(MixerEvent::Retired(cue)) = self.events.try_push(MixerEvent::Retired(cue)) {
            // All slots taken only if the dispatcher has stalled; the cue is
            // then dropped here
            if let Some(slot) = self.retired.iter_mut().find(|slot| slot.is_none()) {
                *slot = Some(cue);
            }
        }
    }

    fn flush_retired(&mut self) {
        for slot in self.retired.iter_mut() {
            let Some(cue) = slot.take() else {
                continue;
            };
            if let Err(MixerEvent::Retired(cue)) = self.events.try_push(MixerEvent::Retired(cue)) {
                *slot = Some(cue);
                return;
            }
        }
    }

    /// Number of retired cues still waiting for room on the ring
    pub fn parked_cues(&self) -> usize {
        self.retired.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Write one output frame and return the main clip's channel count
#[inline]
fn write_frame(frame: &mut [f32], cue: &Cue, read: usize, gain: f32) -> usize {
    let Some(main) = cue.main_buffer() else {
        return 0;
    };

    let (left, right) = main.stereo_frame(read);
    frame[0] = left * gain;
    frame[1] = right * gain;

    if frame.len() >= MAIN_CHANNELS + AUX_CHANNELS {
        if let Some(aux) = cue.aux_buffer() {
            let (aux_left, aux_right) = aux.stereo_frame(aux_offset(main, aux, read));
            frame[2] = aux_left * gain;
            frame[3] = aux_right * gain;
        }
    }

    main.channels()
}

/// Aux position follows the main clip's frame count and loops on its own length
#[inline]
fn aux_offset(main: &AudioBuffer, aux: &AudioBuffer, main_read: usize) -> usize {
    (main_read / main.channels()) * aux.channels() % aux.len()
}
