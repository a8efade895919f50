//! Art-Net protocol implementation (Art-Net 3, ArtDMX)
//!
//! Art-Net is a UDP-based protocol for transmitting DMX512 over Ethernet.

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;

use dmxflow_core::UNIVERSE_SIZE;

use crate::{error::ControlError, Result};

/// Default Art-Net UDP port
pub const ARTNET_PORT: u16 = 6454;

/// Highest valid Art-Net port-address
pub const ARTNET_MAX_UNIVERSE: u16 = 32767;

/// Art-Net sender for outputting DMX frames
pub struct ArtNetSender {
    socket: UdpSocket,
    target: SocketAddr,
    universe: u16,
    sequence: u8,
}

impl ArtNetSender {
    /// Create a new Art-Net sender
    ///
    /// # Arguments
    /// * `universe` - Art-Net port-address (0-32767)
    /// * `target` - Unicast or broadcast IPv4; empty selects `255.255.255.255`
    /// * `port` - UDP port, normally [`ARTNET_PORT`]
    pub async fn new(universe: u16, target: &str, port: u16) -> Result<Self> {
        if universe > ARTNET_MAX_UNIVERSE {
            return Err(ControlError::Dmx(format!(
                "Invalid Art-Net universe: {universe} (must be 0-{ARTNET_MAX_UNIVERSE})"
            )));
        }

        let ip: IpAddr = if target.is_empty() {
            IpAddr::from([255, 255, 255, 255])
        } else {
            target
                .parse()
                .map_err(|e| ControlError::Dmx(format!("Invalid Art-Net target address: {e}")))?
        };

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        tracing::info!(universe, target = %ip, port, "Art-Net sender created");

        Ok(Self {
            socket,
            target: SocketAddr::new(ip, port),
            universe,
            sequence: 0,
        })
    }

    /// Send one DMX frame.
    ///
    /// Send failures come back classified: fatal for closed-socket
    /// conditions, transient for everything else.
    pub async fn send_frame(&mut self, channels: &[u8; UNIVERSE_SIZE]) -> Result<()> {
        let packet = self.build_packet(channels);
        self.socket
            .send_to(&packet, self.target)
            .await
            .map_err(ControlError::classify_send)?;
        tracing::trace!(universe = self.universe, "Sent ArtDMX packet");
        Ok(())
    }

    /// Advance the sequence counter: 1..=255, wrapping back to 1.
    ///
    /// 0 means "sequence disabled" on the wire, so it is never emitted.
    fn next_sequence(&mut self) -> u8 {
        self.sequence = if self.sequence >= 255 {
            1
        } else {
            self.sequence + 1
        };
        self.sequence
    }

    /// Build an ArtDMX packet
    fn build_packet(&mut self, channels: &[u8; UNIVERSE_SIZE]) -> Vec<u8> {
        let mut packet = vec![0u8; 18 + UNIVERSE_SIZE];

        // Header: "Art-Net\0"
        packet[0..8].copy_from_slice(b"Art-Net\0");

        // OpCode: OpDmx (0x5000), little-endian
        packet[8..10].copy_from_slice(&0x5000u16.to_le_bytes());

        // Protocol version 14, big-endian
        packet[10..12].copy_from_slice(&14u16.to_be_bytes());

        // Sequence
        packet[12] = self.next_sequence();

        // Physical port (0)
        packet[13] = 0;

        // Port-Address (sub-net/universe/net), little-endian
        packet[14..16].copy_from_slice(&self.universe.to_le_bytes());

        // Length (512 channels, big-endian; must be even)
        packet[16..18].copy_from_slice(&(UNIVERSE_SIZE as u16).to_be_bytes());

        // DMX data
        packet[18..].copy_from_slice(channels);

        packet
    }

    /// Destination of this sender
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// The configured port-address
    pub fn universe(&self) -> u16 {
        self.universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_packet_structure() {
        let mut sender = ArtNetSender::new(1, "", ARTNET_PORT).await.unwrap();

        let channels = [0u8; UNIVERSE_SIZE];
        let packet = sender.build_packet(&channels);

        assert_eq!(&packet[0..8], b"Art-Net\0");

        // OpCode little-endian
        assert_eq!(packet[8], 0x00);
        assert_eq!(packet[9], 0x50);

        // Protocol version big-endian
        assert_eq!(packet[10], 0);
        assert_eq!(packet[11], 14);

        // Port-Address little-endian
        assert_eq!(packet[14], 1);
        assert_eq!(packet[15], 0);

        // Length big-endian (512)
        assert_eq!(packet[16], 0x02);
        assert_eq!(packet[17], 0x00);

        assert_eq!(packet.len(), 18 + 512);
    }

    #[tokio::test]
    async fn test_sequence_skips_zero() {
        let mut sender = ArtNetSender::new(0, "", ARTNET_PORT).await.unwrap();
        let channels = [0u8; UNIVERSE_SIZE];

        let first = sender.build_packet(&channels)[12];
        assert_eq!(first, 1);

        sender.sequence = 255;
        let wrapped = sender.build_packet(&channels)[12];
        assert_eq!(wrapped, 1, "sequence wraps 255 -> 1, never 0");
    }

    #[tokio::test]
    async fn test_sequence_advances_by_one() {
        let mut sender = ArtNetSender::new(0, "", ARTNET_PORT).await.unwrap();
        let channels = [0u8; UNIVERSE_SIZE];

        let a = sender.build_packet(&channels)[12];
        let b = sender.build_packet(&channels)[12];
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn test_invalid_universe() {
        assert!(ArtNetSender::new(40000, "", ARTNET_PORT).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_target() {
        assert!(ArtNetSender::new(0, "not-an-ip", ARTNET_PORT).await.is_err());
    }

    #[tokio::test]
    async fn test_channel_data_lands_at_offset_18() {
        let mut sender = ArtNetSender::new(0, "", ARTNET_PORT).await.unwrap();
        let mut channels = [0u8; UNIVERSE_SIZE];
        channels[0] = 0xAA;
        channels[511] = 0x55;

        let packet = sender.build_packet(&channels);
        assert_eq!(packet[18], 0xAA);
        assert_eq!(packet[18 + 511], 0x55);
    }
}
