//! The authoritative DMX universe buffer
//!
//! A single 512-channel buffer shared by the playback engine and every
//! sender. Writers are serialized behind a mutex; readers get point-in-time
//! snapshots through a `tokio::sync::watch` channel, so a sender ticker never
//! blocks on a writer and never observes a half-applied batch.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{CoreError, Result};
use crate::follower::FollowerMap;

/// Number of channels in a DMX universe
pub const UNIVERSE_SIZE: usize = 512;

/// An immutable point-in-time copy of the universe
pub type UniverseSnapshot = Arc<[u8; UNIVERSE_SIZE]>;

struct Inner {
    channels: [u8; UNIVERSE_SIZE],
    followers: FollowerMap,
}

/// Shared universe buffer with follower mirroring.
///
/// All mutation goes through [`write`](UniverseBuffer::write),
/// [`write_many`](UniverseBuffer::write_many) or
/// [`blackout`](UniverseBuffer::blackout); each publishes a fresh snapshot
/// after the whole batch (including mirrored followers) has been applied.
pub struct UniverseBuffer {
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<UniverseSnapshot>,
}

impl UniverseBuffer {
    /// Create a zeroed universe with the given follower map
    pub fn new(mut followers: FollowerMap) -> Self {
        followers.sanitize();
        let channels = [0u8; UNIVERSE_SIZE];
        let (snapshot_tx, _) = watch::channel(Arc::new(channels));
        Self {
            inner: Mutex::new(Inner {
                channels,
                followers,
            }),
            snapshot_tx,
        }
    }

    /// Set one channel (1-based) and mirror it to its followers
    pub fn write(&self, channel: u16, value: u8) -> Result<()> {
        self.write_many(&[(channel, value)])
    }

    /// Apply a batch of channel writes atomically.
    ///
    /// Followers are mirrored inside the same batch, so a snapshot taken by a
    /// sender either sees the entire batch (followers included) or none of it.
    pub fn write_many(&self, values: &[(u16, u8)]) -> Result<()> {
        for (channel, _) in values {
            if !(1..=UNIVERSE_SIZE as u16).contains(channel) {
                return Err(CoreError::InvalidChannel(*channel));
            }
        }

        let mut inner = self.inner.lock();
        for &(channel, value) in values {
            inner.channels[channel as usize - 1] = value;
            if inner.followers.mirrors(channel) {
                // single hop: follower writes are not mirrored again
                let followers: Vec<u16> = inner.followers.followers_of(channel).to_vec();
                for f in followers {
                    inner.channels[f as usize - 1] = value;
                }
            }
        }
        self.publish(&inner);
        Ok(())
    }

    /// Zero all 512 channels
    pub fn blackout(&self) {
        let mut inner = self.inner.lock();
        inner.channels = [0u8; UNIVERSE_SIZE];
        self.publish(&inner);
    }

    /// Current snapshot
    pub fn snapshot(&self) -> UniverseSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshots; each sender ticker holds its own receiver
    pub fn subscribe(&self) -> watch::Receiver<UniverseSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Value of one channel (1-based)
    pub fn get(&self, channel: u16) -> Result<u8> {
        if !(1..=UNIVERSE_SIZE as u16).contains(&channel) {
            return Err(CoreError::InvalidChannel(channel));
        }
        Ok(self.snapshot()[channel as usize - 1])
    }

    /// Replace the follower map at runtime
    pub fn set_followers(&self, mut followers: FollowerMap) {
        followers.sanitize();
        let mut inner = self.inner.lock();
        inner.followers = followers;
    }

    /// Copy of the active follower map
    pub fn followers(&self) -> FollowerMap {
        self.inner.lock().followers.clone()
    }

    fn publish(&self, inner: &Inner) {
        // send_replace never fails even with zero receivers
        self.snapshot_tx.send_replace(Arc::new(inner.channels));
    }
}

impl Default for UniverseBuffer {
    fn default() -> Self {
        Self::new(FollowerMap::default())
    }
}
