//! UDP query execution.
//!
//! One call to `run` *is* a Request+Query pair for the lifetime of one
//! exchange (see the Design Note in `SPEC_FULL.md` section 12): it owns the
//! socket for as long as the future lives, and Rust's `Drop` closes it the
//! moment the future is dropped — whether because it resolved or because
//! the surrounding `futures_bounded::FuturesTupleSet` evicted it on timeout.
//! There is no separate close-callback cascade to write.

use std::net::{Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

use crate::dns_header::DnsHeader;
use crate::error::TransportError;

const MAX_DATAGRAM: usize = 4096;

/// The validated outcome of a UDP exchange (spec.md section 4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answered {
    pub noerror: bool,
}

/// Binds (optionally to `source`), sends `payload` to `target`, then loops
/// on `recv_from`, applying the validation order from spec.md section 4.4:
/// malformed header, then message-id mismatch, then `TC=1` — each dropping
/// the datagram and looping again — until a reply validates or the task is
/// dropped by its caller's timeout.
///
/// `expected_id` is the DNS message ID parsed from the outbound payload at
/// request creation (`request::create_udp`); this function does not
/// re-parse the request side.
pub async fn run(
    target: SocketAddr,
    source: Option<Ipv6Addr>,
    payload: Vec<u8>,
    expected_id: u16,
) -> Result<Answered, TransportError> {
    let bind_addr: SocketAddr = match source {
        Some(addr) => (addr, 0).into(),
        None => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(TransportError::Bind)?;

    socket
        .send_to(&payload, target)
        .await
        .map_err(TransportError::Send)?;

    log::debug!(
        "sent udp from port: {}",
        socket.local_addr().map(|a| a.port()).unwrap_or(0)
    );

    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (n, _from) = socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::Recv)?;
        let reply = &buf[..n];

        let header = match DnsHeader::read(reply) {
            Ok(header) => header,
            Err(_) => {
                log::debug!("udp response malformed");
                continue;
            }
        };

        if header.id != expected_id {
            log::debug!("udp response msgid mismatch");
            continue;
        }

        if header.tc {
            log::debug!("udp response has TC=1");
            continue;
        }

        return Ok(Answered {
            noerror: header.rcode.is_noerror(),
        });
    }
}
