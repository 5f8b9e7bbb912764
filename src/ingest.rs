//! Ingest pipeline: walks an incoming packet's layer chain to find the
//! client identity and the DNS payload, then dispatches to request
//! creation.
//!
//! spec.md section 6 describes the ingress contract abstractly: "a pointer
//! to an object chain where each node exposes `{ prev, type }`". The chain
//! is produced by an out-of-scope upstream parser; this module only needs
//! to walk it, so `Layer`/`ObjectChain` below are the minimal concrete
//! stand-in for that external protocol, ordered head-first the way the
//! original's `prev`-linked chain is walked tail-first from the packet
//! itself back toward its IP layer.

use std::net::Ipv6Addr;

/// One layer of a parsed packet, in the same shape the original's
/// `core_object_t` union distinguishes by `obj_type`.
#[derive(Debug, Clone)]
pub enum Layer {
    Ip { dst: [u8; 4] },
    Ip6 { dst: Ipv6Addr },
    Payload(Vec<u8>),
    Dns,
}

/// A parsed packet's layer chain, walked from the head (the layer closest
/// to the wrapping capture record) back toward the IP layer — the same
/// direction the original walks `obj_prev` pointers.
#[derive(Debug, Clone, Default)]
pub struct ObjectChain {
    layers: Vec<Layer>,
}

impl ObjectChain {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a layer, head-first (the layer furthest from the IP stack is
    /// pushed first, mirroring how the original's chain is traversed
    /// starting from whatever object was handed to `receive`).
    pub fn push(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }
}

/// Outcome of walking the ingest pipeline for one input record.
///
/// The `client_index >= max_clients` check (spec.md section 4.1 step 6) is
/// not decided here: this function has no `max_clients` to check against,
/// only the layer chain does. `Simulator::receive` applies that bound to a
/// `Dispatched` outcome once it has the client table in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The record was handed off to request creation for `client_index`.
    Dispatched { client_index: u32 },
    /// No `Payload` layer was reachable in the chain (spec.md section 4.1
    /// step 2).
    MissingPayload,
    /// A `Payload` layer was found but no `Ip`/`Ip6` layer preceded it
    /// (section 4.1 step 3).
    MissingIpLayer,
}

/// Extracts the client index from an IP/IP6 layer: the first 4 bytes of the
/// destination address, interpreted as a native-endian `u32` (spec.md
/// section 4.1 step 4: "raw copy of 4 bytes starting at `dst`" — a literal
/// `memcpy` on the original's side, not a byte-order conversion, so this
/// must use `from_ne_bytes` rather than `from_be_bytes`).
pub fn extract_client_index(layer: &Layer) -> Option<u32> {
    match layer {
        Layer::Ip { dst } => Some(u32::from_ne_bytes(*dst)),
        Layer::Ip6 { dst } => {
            let octets = dst.octets();
            Some(u32::from_ne_bytes([octets[0], octets[1], octets[2], octets[3]]))
        }
        Layer::Dns | Layer::Payload(_) => None,
    }
}

/// Walks `chain` to find the `Payload` layer and the client index from the
/// nearest preceding `Ip`/`Ip6` layer (spec.md section 4.1 steps 2-4).
///
/// Returns the payload bytes and client index on success. `max_clients`
/// bounds the accepted client index (step 6); callers still need to apply
/// it since the caller, not this function, owns the `discarded` counter.
pub fn locate_payload_and_client(chain: &ObjectChain) -> IngestOutcome {
    let payload_pos = chain
        .layers
        .iter()
        .position(|l| matches!(l, Layer::Payload(_)));

    let Some(payload_pos) = payload_pos else {
        return IngestOutcome::MissingPayload;
    };

    let client_index = chain.layers[..=payload_pos]
        .iter()
        .rev()
        .find_map(extract_client_index);

    match client_index {
        Some(client_index) => IngestOutcome::Dispatched { client_index },
        None => IngestOutcome::MissingIpLayer,
    }
}

/// Returns the payload bytes, if the chain has a `Payload` layer.
pub fn payload_bytes(chain: &ObjectChain) -> Option<&[u8]> {
    chain.layers.iter().find_map(|l| match l {
        Layer::Payload(bytes) => Some(bytes.as_slice()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip6(last: u8) -> Ipv6Addr {
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last as u16)
    }

    #[test]
    fn dispatches_with_ip6_layer_before_payload() {
        let dst = ip6(5);
        let chain = ObjectChain::new()
            .push(Layer::Ip6 { dst })
            .push(Layer::Payload(vec![0u8; 12]));

        let expected = extract_client_index(&Layer::Ip6 { dst }).unwrap();
        let outcome = locate_payload_and_client(&chain);
        assert_eq!(outcome, IngestOutcome::Dispatched { client_index: expected });
    }

    #[test]
    fn missing_payload_is_reported() {
        let chain = ObjectChain::new().push(Layer::Ip6 { dst: ip6(1) });
        assert_eq!(locate_payload_and_client(&chain), IngestOutcome::MissingPayload);
    }

    #[test]
    fn chain_without_ip_layer_is_missing_ip_layer() {
        // spec.md section 8, scenario 5: input has only Payload.
        let chain = ObjectChain::new().push(Layer::Payload(vec![0u8; 12]));
        assert_eq!(locate_payload_and_client(&chain), IngestOutcome::MissingIpLayer);
    }

    #[test]
    fn client_index_is_first_four_bytes_of_ipv6_dst() {
        let dst = ip6(0x42);
        let layer = Layer::Ip6 { dst };
        let octets = dst.octets();
        let expected = u32::from_ne_bytes([octets[0], octets[1], octets[2], octets[3]]);
        assert_eq!(extract_client_index(&layer), Some(expected));
    }

    #[test]
    fn client_index_is_first_four_bytes_of_ipv4_dst() {
        let layer = Layer::Ip { dst: [10, 0, 0, 7] };
        assert_eq!(extract_client_index(&layer), Some(u32::from_ne_bytes([10, 0, 0, 7])));
    }

}
