//! Follower channel mapping
//!
//! A follower channel mirrors every value written to its leader. The relation
//! is a single hop deep: followers never re-trigger further followers, so a
//! chain `1 -> 2 -> 3` leaves channel 3 untouched when channel 1 is written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping from leader channels to the channels that mirror them.
///
/// Channel numbers are 1-based, matching the external DMX numbering.
/// Self-references are dropped when the map is sanitized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowerMap {
    /// Whether mirroring is applied on writes
    #[serde(default)]
    pub enabled: bool,
    /// leader channel -> follower channels
    #[serde(default)]
    pub map: BTreeMap<u16, Vec<u16>>,
}

impl FollowerMap {
    /// Create an empty, disabled map
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove self-references and out-of-range channels.
    ///
    /// Returns the number of entries that were dropped.
    pub fn sanitize(&mut self) -> usize {
        let mut dropped = 0;
        self.map.retain(|leader, followers| {
            if !(1..=512).contains(leader) {
                dropped += followers.len();
                return false;
            }
            let before = followers.len();
            followers.retain(|f| f != leader && (1..=512).contains(f));
            followers.sort_unstable();
            followers.dedup();
            dropped += before - followers.len();
            !followers.is_empty()
        });
        dropped
    }

    /// Followers of `leader`, or an empty slice
    pub fn followers_of(&self, leader: u16) -> &[u16] {
        self.map.get(&leader).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when mirroring is on and `leader` has at least one follower
    pub fn mirrors(&self, leader: u16) -> bool {
        self.enabled && !self.followers_of(leader).is_empty()
    }
}
