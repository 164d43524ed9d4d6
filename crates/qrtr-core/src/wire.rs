//! The QRTR control-packet wire format.
//!
//! Mirrors the kernel's `struct qrtr_ctrl_pkt`: five 32-bit little-endian
//! words, regardless of host endianness. Confirmed field order and the
//! version/instance bit-split against the historical control-socket parser
//! this was distilled from.

/// Address family number for QRTR sockets.
///
/// Some kernel headers expose `linux/qrtr.h` without defining `AF_QIPCRTR`
/// in the userspace socket headers; 42 is the fallback the historical source
/// also falls back to.
pub const AF_QIPCRTR: u16 = 42;

/// Fixed control port the kernel publishes announcements on.
pub const QRTR_PORT_CTRL: u32 = 0xFFFF_FFFF;

/// Client datagram path (informational; payloads are opaque to this crate).
pub const QRTR_TYPE_DATA: u32 = 1;
pub const QRTR_TYPE_NEW_SERVER: u32 = 2;
pub const QRTR_TYPE_DEL_SERVER: u32 = 3;
pub const QRTR_TYPE_NEW_LOOKUP: u32 = 4;

/// Size in bytes of an encoded control packet: 5 little-endian u32 words.
pub const CTRL_PKT_LEN: usize = 20;

/// A decoded QRTR control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlPacket {
    pub cmd: u32,
    pub service: u32,
    /// Packed `version | (instance << 8)` word, as received from the kernel.
    pub instance_word: u32,
    pub node: u32,
    pub port: u32,
}

impl CtrlPacket {
    /// Build a bare `NEW_LOOKUP` request with all other fields zeroed.
    pub fn new_lookup() -> Self {
        Self {
            cmd: QRTR_TYPE_NEW_LOOKUP,
            service: 0,
            instance_word: 0,
            node: 0,
            port: 0,
        }
    }

    /// Encode as the kernel's wire format: 5 little-endian u32 words.
    pub fn encode(&self) -> [u8; CTRL_PKT_LEN] {
        let mut buf = [0u8; CTRL_PKT_LEN];
        buf[0..4].copy_from_slice(&self.cmd.to_le_bytes());
        buf[4..8].copy_from_slice(&self.service.to_le_bytes());
        buf[8..12].copy_from_slice(&self.instance_word.to_le_bytes());
        buf[12..16].copy_from_slice(&self.node.to_le_bytes());
        buf[16..20].copy_from_slice(&self.port.to_le_bytes());
        buf
    }

    /// Decode a received datagram.
    ///
    /// Returns `None` for datagrams shorter than `CTRL_PKT_LEN` (§4.2: "short
    /// packets are ignored"). Trailing bytes beyond the five words are
    /// ignored, matching the kernel's fixed-size struct.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < CTRL_PKT_LEN {
            return None;
        }
        let word = |range: std::ops::Range<usize>| {
            u32::from_le_bytes(buf[range].try_into().unwrap())
        };
        Some(Self {
            cmd: word(0..4),
            service: word(4..8),
            instance_word: word(8..12),
            node: word(12..16),
            port: word(16..20),
        })
    }

    /// Split the packed instance word into `(version, instance)`.
    ///
    /// The kernel packs these as `version = word & 0xFF`, `instance = word >> 8`.
    pub fn version_instance(&self) -> (u32, u32) {
        split_version_instance(self.instance_word)
    }
}

/// Split a kernel instance word into `(version, instance)`.
#[inline]
pub fn split_version_instance(word: u32) -> (u32, u32) {
    (word & 0xFF, word >> 8)
}

/// Pack `(version, instance)` back into a single kernel instance word.
#[inline]
pub fn pack_version_instance(version: u32, instance: u32) -> u32 {
    (version & 0xFF) | (instance << 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pkt = CtrlPacket {
            cmd: QRTR_TYPE_NEW_SERVER,
            service: 0x42,
            instance_word: pack_version_instance(3, 7),
            node: 5,
            port: 1024,
        };
        let encoded = pkt.encode();
        let decoded = CtrlPacket::decode(&encoded).expect("decodes");
        assert_eq!(pkt, decoded);
        assert_eq!(decoded.version_instance(), (3, 7));
    }

    #[test]
    fn test_short_packet_rejected() {
        assert!(CtrlPacket::decode(&[1, 2, 3, 4]).is_none());
        assert!(CtrlPacket::decode(&[]).is_none());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let pkt = CtrlPacket::new_lookup();
        let mut buf = pkt.encode().to_vec();
        buf.extend_from_slice(&[0xAA, 0xBB]);
        let decoded = CtrlPacket::decode(&buf).expect("decodes");
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn test_version_instance_boundaries() {
        assert_eq!(split_version_instance(0), (0, 0));
        assert_eq!(split_version_instance(0xFF), (0xFF, 0));
        assert_eq!(split_version_instance(0x100), (0, 1));
        assert_eq!(split_version_instance(u32::MAX), (0xFF, 0x00FF_FFFF));
        assert_eq!(pack_version_instance(0xFF, 0x00FF_FFFF), u32::MAX);
    }

    #[test]
    fn test_little_endian_byte_order() {
        let pkt = CtrlPacket {
            cmd: 0x0102_0304,
            service: 1,
            instance_word: 2,
            node: 3,
            port: 4,
        };
        let encoded = pkt.encode();
        assert_eq!(&encoded[0..4], &[0x04, 0x03, 0x02, 0x01]);
    }
}
