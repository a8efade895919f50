//! sACN (E1.31) protocol implementation
//!
//! sACN (Streaming ACN) transmits DMX512 in layered UDP packets, normally to
//! the multicast group derived from the universe number.

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;
use uuid::Uuid;

use dmxflow_core::UNIVERSE_SIZE;

use crate::{error::ControlError, Result};

/// Default sACN UDP port
pub const SACN_PORT: u16 = 5568;

/// Highest valid E1.31 universe
pub const SACN_MAX_UNIVERSE: u16 = 63999;

/// Full E1.31 data packet size
const PACKET_SIZE: usize = 638;

/// sACN sender for outputting DMX frames
pub struct E131Sender {
    socket: UdpSocket,
    target: SocketAddr,
    universe: u16,
    sequence: u8,
    priority: u8,
    source_name: String,
    /// Component ID, stable for the lifetime of the sender
    cid: [u8; 16],
}

impl E131Sender {
    /// Create a new sACN sender
    ///
    /// # Arguments
    /// * `universe` - sACN universe (1-63999)
    /// * `source_name` - Source name (truncated to 63 bytes on the wire)
    /// * `target` - Unicast IPv4, or empty to multicast to `239.255.X.Y`
    /// * `port` - UDP port, normally [`SACN_PORT`]
    pub async fn new(
        universe: u16,
        source_name: &str,
        target: &str,
        port: u16,
    ) -> Result<Self> {
        if universe == 0 || universe > SACN_MAX_UNIVERSE {
            return Err(ControlError::Dmx(format!(
                "Invalid sACN universe: {universe} (must be 1-{SACN_MAX_UNIVERSE})"
            )));
        }

        let ip: IpAddr = if target.is_empty() || target == "255.255.255.255" {
            // multicast group 239.255.<universe hi>.<universe lo>
            IpAddr::from([239, 255, (universe >> 8) as u8, (universe & 0xFF) as u8])
        } else {
            target
                .parse()
                .map_err(|e| ControlError::Dmx(format!("Invalid sACN target address: {e}")))?
        };

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_multicast_loop_v4(false)?;

        let cid = *Uuid::new_v4().as_bytes();

        tracing::info!(universe, target = %ip, port, "sACN sender created");

        Ok(Self {
            socket,
            target: SocketAddr::new(ip, port),
            universe,
            sequence: 0,
            priority: 100,
            source_name: source_name.to_string(),
            cid,
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
        self.sequence = self.sequence.wrapping_add(1);
        tracing::trace!(universe = self.universe, "Sent sACN packet");
        Ok(())
    }

    /// Build an E1.31 data packet
    fn build_packet(&self, channels: &[u8; UNIVERSE_SIZE]) -> Vec<u8> {
        let mut packet = vec![0u8; PACKET_SIZE];
        let mut offset = 0;

        // --- Root Layer ---

        // Preamble Size
        packet[offset..offset + 2].copy_from_slice(&0x0010u16.to_be_bytes());
        offset += 2;

        // Post-amble Size
        packet[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        // ACN Packet Identifier "ASC-E1.17"
        packet[offset..offset + 12].copy_from_slice(&[
            0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
        ]);
        offset += 12;

        // Flags and Length: 0x7000 | (638 - 16)
        let root_length = (PACKET_SIZE - 16) as u16;
        packet[offset..offset + 2].copy_from_slice(&(0x7000u16 | root_length).to_be_bytes());
        offset += 2;

        // Vector: VECTOR_ROOT_E131_DATA
        packet[offset..offset + 4].copy_from_slice(&0x00000004u32.to_be_bytes());
        offset += 4;

        // CID
        packet[offset..offset + 16].copy_from_slice(&self.cid);
        offset += 16;

        // --- Framing Layer ---

        // Flags and Length: 0x7000 | (638 - 38)
        let framing_length = (PACKET_SIZE - 38) as u16;
        packet[offset..offset + 2].copy_from_slice(&(0x7000u16 | framing_length).to_be_bytes());
        offset += 2;

        // Vector: VECTOR_E131_DATA_PACKET
        packet[offset..offset + 4].copy_from_slice(&0x00000002u32.to_be_bytes());
        offset += 4;

        // Source Name (64 bytes, null-terminated; at most 63 name bytes)
        let source_bytes = self.source_name.as_bytes();
        let copy_len = source_bytes.len().min(63);
        packet[offset..offset + copy_len].copy_from_slice(&source_bytes[..copy_len]);
        offset += 64;

        // Priority
        packet[offset] = self.priority;
        offset += 1;

        // Synchronization Address (0 = unsynchronized)
        packet[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        // Sequence Number
        packet[offset] = self.sequence;
        offset += 1;

        // Options
        packet[offset] = 0;
        offset += 1;

        // Universe
        packet[offset..offset + 2].copy_from_slice(&self.universe.to_be_bytes());
        offset += 2;

        // --- DMP Layer ---

        // Flags and Length: 0x7000 | (638 - 115)
        let dmp_length = (PACKET_SIZE - 115) as u16;
        packet[offset..offset + 2].copy_from_slice(&(0x7000u16 | dmp_length).to_be_bytes());
        offset += 2;

        // Vector: VECTOR_DMP_SET_PROPERTY
        packet[offset] = 0x02;
        offset += 1;

        // Address Type & Data Type
        packet[offset] = 0xa1;
        offset += 1;

        // First Property Address
        packet[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        // Address Increment
        packet[offset..offset + 2].copy_from_slice(&0x0001u16.to_be_bytes());
        offset += 2;

        // Property value count: start code + 512 channels
        packet[offset..offset + 2].copy_from_slice(&513u16.to_be_bytes());
        offset += 2;

        // DMX Start Code
        packet[offset] = 0x00;
        offset += 1;

        // DMX Data
        packet[offset..offset + UNIVERSE_SIZE].copy_from_slice(channels);

        packet
    }

    /// Destination of this sender
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// The configured universe
    pub fn universe(&self) -> u16 {
        self.universe
    }

    /// Component ID on the wire
    pub fn cid(&self) -> &[u8; 16] {
        &self.cid
    }
}
