//! DMX output system
//!
//! This module puts universe snapshots on the wire via Art-Net and sACN.
//!
//! ## Art-Net
//!
//! UDP broadcast or unicast on port 6454, 32768 port-addresses, with an
//! ArtDMX sequence number that wraps 1..=255 (0 is "disabled" on the wire).
//!
//! ## sACN (E1.31)
//!
//! Layered ACN packets on port 5568, multicast to `239.255.x.y` by default,
//! priority 100, with a stable per-sender CID.
//!
//! ## Fan-out
//!
//! [`DmxManager`] runs one ticker task per sender at its configured fps;
//! [`RetransmitLoop`] injects extra frames on a fixed interval when enabled.

pub mod artnet;
pub mod log;
pub mod manager;
pub mod retransmit;
pub mod sacn;

pub use artnet::{ArtNetSender, ARTNET_PORT};
pub use log::LogSender;
pub use manager::{DmxManager, SenderStats, SenderStatus};
pub use retransmit::RetransmitLoop;
pub use sacn::{E131Sender, SACN_PORT};
