//! Decoded sample storage
//!
//! An `AudioBuffer` holds a whole clip in memory as interleaved `f32`
//! samples. It is built once by the decoder and never mutated afterwards,
//! so the audio thread can read it through an `Arc` without locking.

use thiserror::Error;

/// Buffers with this many samples or fewer are treated as unplayable
pub const MIN_PLAYABLE_SAMPLES: usize = 512;

/// Errors raised when constructing a buffer
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("Channel count must be at least 1")]
    NoChannels,

    #[error("{samples} samples do not divide into {channels} channels")]
    Misaligned { samples: usize, channels: usize },
}

/// Immutable interleaved sample buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: usize,
}

impl AudioBuffer {
    /// Create a buffer from interleaved samples
    pub fn new(samples: Vec<f32>, channels: usize) -> Result<Self, BufferError> {
        if channels == 0 {
            return Err(BufferError::NoChannels);
        }
        if samples.len() % channels != 0 {
            return Err(BufferError::Misaligned {
                samples: samples.len(),
                channels,
            });
        }
        Ok(Self { samples, channels })
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total sample count across all channels
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Whether the buffer is long enough to be worth playing
    pub fn is_playable(&self) -> bool {
        self.samples.len() > MIN_PLAYABLE_SAMPLES
    }

    /// Read one frame starting at `offset` as a stereo pair.
    ///
    /// Mono buffers duplicate the single channel. Out-of-range reads yield
    /// silence rather than panicking, since this runs on the audio thread.
    #[inline]
    pub fn stereo_frame(&self, offset: usize) -> (f32, f32) {
        let left = self.samples.get(offset).copied().unwrap_or(0.0);
        let right = if self.channels < 2 {
            left
        } else {
            self.samples.get(offset + 1).copied().unwrap_or(0.0)
        };
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_channels() {
        assert_eq!(AudioBuffer::new(vec![0.0; 4], 0), Err(BufferError::NoChannels));
    }

    #[test]
    fn test_rejects_misaligned_samples() {
        assert_eq!(
            AudioBuffer::new(vec![0.0; 5], 2),
            Err(BufferError::Misaligned {
                samples: 5,
                channels: 2
            })
        );
    }

    #[test]
    fn test_playable_threshold() {
        let at_threshold = AudioBuffer::new(vec![0.0; MIN_PLAYABLE_SAMPLES], 2).unwrap();
        assert!(!at_threshold.is_playable());

        let small = AudioBuffer::new(vec![0.0; 8], 1).unwrap();
        assert!(!small.is_playable());

        let above = AudioBuffer::new(vec![0.0; MIN_PLAYABLE_SAMPLES + 2], 2).unwrap();
        assert!(above.is_playable());
    }

    #[test]
    fn test_stereo_frame() {
        let stereo = AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2).unwrap();
        assert_eq!(stereo.stereo_frame(2), (0.3, 0.4));
        assert_eq!(stereo.frames(), 2);

        let mono = AudioBuffer::new(vec![0.5, 0.6], 1).unwrap();
        assert_eq!(mono.stereo_frame(1), (0.6, 0.6));

        assert_eq!(stereo.stereo_frame(10), (0.0, 0.0));
    }
}
