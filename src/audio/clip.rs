//! Clips and cues
//!
//! A `Clip` is what the catalog hands to the engine: a decoded buffer plus
//! the playback flags the engine honours. A `Cue` pairs a main clip with an
//! optional aux clip and is the unit that moves through the queue.

use std::sync::Arc;

use super::buffer::AudioBuffer;

/// A named, playable unit
#[derive(Debug, Clone, Default)]
pub struct Clip {
    name: String,
    buffer: Option<Arc<AudioBuffer>>,

    /// Start the stream as soon as this clip is queued
    pub auto_play: bool,

    /// Stop at the end of this clip instead of chaining into the queue
    pub auto_stop: bool,

    /// Clip routed to the aux bus when this one is queued with `queue_clip`
    pub paired_aux: Option<Arc<Clip>>,

    /// Tempo, for the catalog's display
    pub tempo_bpm: Option<f32>,

    /// Trigger key assigned by the catalog
    pub trigger_key: Option<String>,

    /// Name of the clip the catalog queues after this one
    pub auto_queue: Option<String>,
}

impl Clip {
    pub fn new(name: impl Into<String>, buffer: AudioBuffer) -> Self {
        Self {
            name: name.into(),
            buffer: Some(Arc::new(buffer)),
            ..Default::default()
        }
    }

    /// A clip whose audio failed to load
    pub fn without_buffer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn with_auto_stop(mut self, auto_stop: bool) -> Self {
        self.auto_stop = auto_stop;
        self
    }

    pub fn with_paired_aux(mut self, aux: Option<Arc<Clip>>) -> Self {
        self.paired_aux = aux;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_deref()
    }

    /// Buffer present and above the minimum playable length
    pub fn is_playable(&self) -> bool {
        self.buffer().is_some_and(AudioBuffer::is_playable)
    }
}

/// Whether an optional clip can be played
pub fn track_ok(clip: Option<&Clip>) -> bool {
    clip.is_some_and(Clip::is_playable)
}

/// A main clip and the aux clip that plays alongside it
#[derive(Debug, Clone)]
pub struct Cue {
    pub main: Arc<Clip>,
    pub aux: Option<Arc<Clip>>,
}

impl Cue {
    pub fn new(main: Arc<Clip>, aux: Option<Arc<Clip>>) -> Self {
        Self { main, aux }
    }

    /// Main buffer, if the main clip is playable
    #[inline]
    pub fn main_buffer(&self) -> Option<&AudioBuffer> {
        self.main.buffer().filter(|b| b.is_playable())
    }

    /// Aux buffer, if an aux clip is attached and playable
    #[inline]
    pub fn aux_buffer(&self) -> Option<&AudioBuffer> {
        self.aux
            .as_deref()
            .and_then(Clip::buffer)
            .filter(|b| b.is_playable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::MIN_PLAYABLE_SAMPLES;

    #[test]
    fn test_track_ok() {
        assert!(!track_ok(None));
        assert!(!track_ok(Some(&Clip::without_buffer("missing"))));

        let short = AudioBuffer::new(vec![0.0; MIN_PLAYABLE_SAMPLES], 1).unwrap();
        assert!(!track_ok(Some(&Clip::new("short", short))));

        let long = AudioBuffer::new(vec![0.0; 1000], 2).unwrap();
        assert!(track_ok(Some(&Clip::new("long", long))));
    }

    #[test]
    fn test_cue_skips_unplayable_aux() {
        let main = Arc::new(Clip::new(
            "main",
            AudioBuffer::new(vec![0.0; 1000], 2).unwrap(),
        ));
        let aux = Arc::new(Clip::without_buffer("aux"));
        let cue = Cue::new(main, Some(aux));
        assert!(cue.main_buffer().is_some());
        assert!(cue.aux_buffer().is_none());
    }
}
