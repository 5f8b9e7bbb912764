//! Transport selection.
//!
//! Mirrors `output_dnssim_transport_t` from the original module: four
//! variants are declared, only `UdpOnly` is implemented. The others are kept
//! so the enum documents the full intended surface, matching the original's
//! reserved-but-unimplemented `TCP`/`TLS` values.

/// Which transport(s) the simulator uses to send queries.
///
/// `UdpOnly` is the only variant `Simulator::set_transport` currently
/// accepts; the rest are reserved for a future dual-stack or TCP-fallback
/// implementation and are rejected with `ConfigError::UnsupportedTransport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Send every query over UDP, with no TCP fallback on truncation.
    UdpOnly,
    /// Reserved: UDP with TCP retry on truncated replies. Not implemented.
    Udp,
    /// Reserved: TCP-only transport. Not implemented.
    Tcp,
    /// Reserved: DNS-over-TLS transport. Not implemented.
    Tls,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::UdpOnly
    }
}
