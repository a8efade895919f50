//! Linear channel transitions
//!
//! A transition samples the universe once at start and interpolates every
//! target channel from that fixed starting vector. Manual writes made while
//! a transition is running are overridden by the next transition frame; a
//! manual write is expected to cancel the playback that owns the transition
//! instead (the engine enforces that).

use std::time::Duration;

use tokio::time::Instant;

use crate::universe::UNIVERSE_SIZE;

/// An in-flight linear fade towards a set of target channel values
#[derive(Debug, Clone)]
pub struct Transition {
    start: [u8; UNIVERSE_SIZE],
    targets: Vec<(u16, u8)>,
    started: Instant,
    duration: Duration,
}

impl Transition {
    /// Begin a transition from the given starting vector.
    ///
    /// `targets` are 1-based `(channel, value)` pairs; channels absent from
    /// it keep their current value.
    pub fn new(
        start: [u8; UNIVERSE_SIZE],
        targets: Vec<(u16, u8)>,
        started: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            start,
            targets,
            started,
            duration,
        }
    }

    /// Fraction complete at `now`, in 0.0..=1.0
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// True once the full duration has elapsed
    pub fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }

    /// The interpolated frame for `now`.
    ///
    /// Emits `round(start + (target - start) * e/D)` per channel; at or past
    /// the end this is exactly the target vector.
    pub fn frame_at(&self, now: Instant) -> Vec<(u16, u8)> {
        let frac = self.progress(now);
        self.targets
            .iter()
            .map(|&(channel, target)| {
                let from = self.start[channel as usize - 1] as f64;
                let value = from + (target as f64 - from) * frac;
                (channel, value.round().clamp(0.0, 255.0) as u8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_vector(pairs: &[(usize, u8)]) -> [u8; UNIVERSE_SIZE] {
        let mut v = [0u8; UNIVERSE_SIZE];
        for &(i, value) in pairs {
            v[i] = value;
        }
        v
    }

    #[tokio::test(start_paused = true)]
    async fn test_midpoint_interpolation() {
        let t0 = Instant::now();
        let transition = Transition::new(
            start_vector(&[]),
            vec![(6, 255), (7, 255)],
            t0,
            Duration::from_secs(1),
        );

        let frame = transition.frame_at(t0 + Duration::from_millis(500));
        assert_eq!(frame, vec![(6, 128), (7, 128)]);
        assert!(!transition.finished(t0 + Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_target_exactly() {
        let t0 = Instant::now();
        let transition = Transition::new(
            start_vector(&[(0, 200)]),
            vec![(1, 10)],
            t0,
            Duration::from_secs(2),
        );

        let frame = transition.frame_at(t0 + Duration::from_secs(5));
        assert_eq!(frame, vec![(1, 10)]);
        assert!(transition.finished(t0 + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_downward_fade() {
        let t0 = Instant::now();
        let transition = Transition::new(
            start_vector(&[(0, 100)]),
            vec![(1, 0)],
            t0,
            Duration::from_secs(1),
        );

        let frame = transition.frame_at(t0 + Duration::from_millis(250));
        assert_eq!(frame, vec![(1, 75)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_is_immediate() {
        let t0 = Instant::now();
        let transition = Transition::new(
            start_vector(&[]),
            vec![(1, 42)],
            t0,
            Duration::ZERO,
        );
        assert!(transition.finished(t0));
        assert_eq!(transition.frame_at(t0), vec![(1, 42)]);
    }
}
