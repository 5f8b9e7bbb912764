//! Error types for the simulator's configuration boundary.
//!
//! Data-path failures (malformed reply, message-id mismatch, truncation) are
//! intentionally *not* represented here: per the simulator's design they are
//! scored into counters, never raised as `Result`s (see `query::run`, which
//! drops and loops on each one instead of returning an error).

use derive_more::{Display, Error, From};

/// Errors raised by the configuration surface (`Simulator::target`,
/// `Simulator::bind`, `Simulator::set_transport`, ...).
///
/// These never occur on the data path; they are the Rust-rewrite equivalent
/// of the original module's `lcritical`/`lfatal` calls at the configuration
/// boundary, returned instead of aborting the process.
#[derive(Debug, Display, From, Error, PartialEq)]
pub enum ConfigError {
    InvalidAddress(std::net::AddrParseError),
    #[display("transport {_0:?} is not implemented (only UdpOnly is)")]
    UnsupportedTransport(#[error(not(source))] crate::transport::Transport),
    #[display("stat_collect interval_ms must be >= 1")]
    InvalidStatsInterval,
    #[display("max_clients must be >= 1")]
    InvalidCapacity,
}

/// Errors that tear down a single request/query pair (spec's `TransportError`
/// class): socket bind, send, or receive-start failure. Always results in the
/// originating input record being counted as `discarded`.
#[derive(Debug, Display, Error)]
pub enum TransportError {
    #[display("failed to bind UDP socket: {_0}")]
    Bind(std::io::Error),
    #[display("failed to send UDP datagram: {_0}")]
    Send(std::io::Error),
    #[display("failed to receive on UDP socket: {_0}")]
    Recv(std::io::Error),
}
