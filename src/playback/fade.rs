//! Fade envelopes
//!
//! Both curves are quadratic in elapsed samples: fade-in eases in from
//! silence, fade-out falls away from full volume and reaches zero exactly
//! at the end of the window.

/// Progress through a fade window, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FadeEnvelope {
    pub elapsed: usize,
    pub total: usize,
}

impl FadeEnvelope {
    pub fn new(total: usize) -> Self {
        Self { elapsed: 0, total }
    }

    /// Still inside the window
    #[inline]
    pub fn is_active(&self) -> bool {
        self.elapsed < self.total
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.total
    }

    /// Fade-in gain for the current frame, then advance
    #[inline]
    pub fn step_in(&mut self) -> f32 {
        if !self.is_active() {
            return 1.0;
        }
        let gain = fade_in_gain(self.elapsed, self.total);
        self.elapsed += 1;
        gain
    }

    /// Fade-out gain for the current frame, then advance
    #[inline]
    pub fn step_out(&mut self) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        let gain = fade_out_gain(self.elapsed, self.total);
        self.elapsed += 1;
        gain
    }
}

/// `elapsed² / total²`, clamped to unity outside the window
#[inline]
pub fn fade_in_gain(elapsed: usize, total: usize) -> f32 {
    if total == 0 || elapsed >= total {
        return 1.0;
    }
    let t = elapsed as f32 / total as f32;
    t * t
}

/// `1 - elapsed² / total²`, zero once the window is over
#[inline]
pub fn fade_out_gain(elapsed: usize, total: usize) -> f32 {
    if total == 0 || elapsed >= total {
        return 0.0;
    }
    let t = elapsed as f32 / total as f32;
    1.0 - t * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_boundaries() {
        assert_eq!(fade_in_gain(0, 100), 0.0);
        assert_eq!(fade_in_gain(100, 100), 1.0);
        assert_eq!(fade_in_gain(50, 100), 0.25);
        assert_eq!(fade_in_gain(0, 0), 1.0);
    }

    #[test]
    fn test_fade_out_is_strictly_decreasing() {
        let total = 4410;
        let mut previous = fade_out_gain(0, total);
        assert_eq!(previous, 1.0);
        for elapsed in 1..=total {
            let gain = fade_out_gain(elapsed, total);
            assert!(gain < previous, "gain rose at {}", elapsed);
            previous = gain;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_envelope_steps() {
        let mut fade = FadeEnvelope::new(2);
        assert_eq!(fade.step_in(), 0.0);
        assert_eq!(fade.step_in(), 0.25);
        assert!(fade.is_complete());
        assert_eq!(fade.step_in(), 1.0);
        assert_eq!(fade.elapsed, 2);

        let mut fade = FadeEnvelope::new(2);
        assert_eq!(fade.step_out(), 1.0);
        assert_eq!(fade.step_out(), 0.75);
        assert!(fade.is_complete());
    }
}
