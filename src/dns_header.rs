//! Minimal DNS header reader.
//!
//! spec.md section 1 marks the full DNS header parser as an external
//! collaborator, specified only by the interface the core uses: `id`, `tc`,
//! `rcode`. This module gives that interface a concrete, minimal body —
//! there is no other producer for it in this crate — grounded in the bit
//! layout `atlas`'s `dns::protocol::DnsHeader` uses for the same 12-byte
//! header, reduced to the three fields the simulator actually reads.
//!
//! The simulator never constructs or serializes a DNS message: queries are
//! retransmitted verbatim from the ingested payload (spec.md section 6,
//! "Egress wire protocol"), so only `read` is needed.

use derive_more::{Display, Error};

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Display, Error, PartialEq, Eq)]
#[display("DNS payload shorter than the 12-byte header minimum ({_0} bytes)")]
pub struct MalformedHeader(#[error(not(source))] pub usize);

/// The result code for a DNS reply, per RFC 1035 §4.1.1, reduced to the
/// single value the simulator tests for (`NOERROR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const NOERROR: ResponseCode = ResponseCode(0);

    pub fn is_noerror(self) -> bool {
        self == Self::NOERROR
    }
}

/// The three header fields the simulator correlates and scores on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub tc: bool,
    pub rcode: ResponseCode,
}

impl DnsHeader {
    /// Reads the fixed 12-byte DNS header from the front of `bytes`.
    ///
    /// Byte layout (RFC 1035 §4.1.1):
    /// - bytes 0-1: `id`
    /// - byte 2, bit `0x02`: `TC` (truncation)
    /// - byte 3, low nibble: `RCODE`
    pub fn read(bytes: &[u8]) -> Result<Self, MalformedHeader> {
        if bytes.len() < HEADER_LEN {
            return Err(MalformedHeader(bytes.len()));
        }

        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let tc = bytes[2] & 0x02 != 0;
        let rcode = ResponseCode(bytes[3] & 0x0F);

        Ok(DnsHeader { id, tc, rcode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(id: u16, tc: bool, rcode: u8) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&id.to_be_bytes());
        buf[2] = if tc { 0x02 } else { 0x00 };
        buf[3] = rcode & 0x0F;
        buf
    }

    #[test]
    fn reads_id_tc_rcode() {
        let bytes = header_bytes(0xBEEF, true, 3);
        let header = DnsHeader::read(&bytes).unwrap();
        assert_eq!(header.id, 0xBEEF);
        assert!(header.tc);
        assert_eq!(header.rcode, ResponseCode(3));
        assert!(!header.rcode.is_noerror());
    }

    #[test]
    fn noerror_is_zero() {
        let bytes = header_bytes(1, false, 0);
        let header = DnsHeader::read(&bytes).unwrap();
        assert!(header.rcode.is_noerror());
    }

    #[test]
    fn payload_shorter_than_12_bytes_is_malformed() {
        let bytes = [0u8; 11];
        assert_eq!(DnsHeader::read(&bytes), Err(MalformedHeader(11)));
    }

    #[test]
    fn extra_trailing_bytes_are_ignored() {
        let mut bytes = header_bytes(7, false, 0).to_vec();
        bytes.extend_from_slice(b"question section goes here");
        let header = DnsHeader::read(&bytes).unwrap();
        assert_eq!(header.id, 7);
    }
}
