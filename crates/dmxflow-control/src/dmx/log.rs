//! Frame logger for dry runs
//!
//! Stands in for a network sender: each frame is summarized through
//! `tracing` instead of being put on the wire. Handy for testing shows on a
//! machine with no lighting network attached.

use dmxflow_core::UNIVERSE_SIZE;

use crate::Result;

/// DMX sender that logs frames instead of transmitting them
pub struct LogSender {
    universe: u16,
    frames: u64,
}

impl LogSender {
    /// Create a log sender for the given universe label
    pub fn new(universe: u16) -> Self {
        tracing::info!(universe, "Log sender created");
        Self { universe, frames: 0 }
    }

    /// "Send" a frame by logging its non-zero channels
    pub fn send_frame(&mut self, channels: &[u8; UNIVERSE_SIZE]) -> Result<()> {
        self.frames += 1;
        let active: Vec<(usize, u8)> = channels
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0)
            .map(|(i, &v)| (i + 1, v))
            .collect();
        if active.is_empty() {
            tracing::debug!(universe = self.universe, frame = self.frames, "all channels at 0");
        } else {
            tracing::info!(
                universe = self.universe,
                frame = self.frames,
                active = ?active,
                "frame"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sender_counts_frames() {
        let mut sender = LogSender::new(1);
        let mut channels = [0u8; UNIVERSE_SIZE];
        channels[0] = 255;
        sender.send_frame(&channels).unwrap();
        sender.send_frame(&channels).unwrap();
        assert_eq!(sender.frames, 2);
    }
}
