//! The event-loop driver and configuration API (spec.md sections 4.9, 5, 6).
//!
//! `Simulator` is the single-threaded, lock-free owner of every piece of
//! mutable state: the source pool, client table, stats chain, stats timer,
//! and the set of in-flight UDP exchanges. All of it is mutated only from
//! `poll`/`run_nowait`/`run`, which run on one task — there is no `Arc` or
//! `Mutex` anywhere in this module, matching spec section 5's "single-
//! threaded cooperative... no locking discipline."

use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use futures_bounded::{FuturesTupleSet, PushError};

use crate::client_table::ClientTable;
use crate::error::{ConfigError, TransportError};
use crate::ingest::{self, IngestOutcome, Layer, ObjectChain};
use crate::query::{self, Answered};
use crate::request::{self, RequestMeta};
use crate::source_pool::SourcePool;
use crate::stats::{StatsChain, StatsTimer};
use crate::transport::Transport;

const DEFAULT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_IN_FLIGHT: usize = 65_536;

/// `FuturesTupleSet` requires a fixed eviction timeout at construction time,
/// but the simulator's per-request timeout (`timeout_ms`) is reconfigurable
/// at any point, including while queries are in flight. Enforcing the real
/// timeout with `tokio::time::timeout` around each pushed future (see
/// `create_request_udp`) means this backstop only needs to be long enough
/// that it never fires before a well-behaved per-query timeout does; it
/// exists solely so the set itself is constructed once and never swapped.
const FUTURES_SET_BACKSTOP: Duration = Duration::from_secs(3600);

/// The per-query future's own outcome: the UDP exchange result, or
/// `Elapsed` if `timeout_ms` fired first. This is the real, reconfigurable
/// timeout; `FuturesTupleSet`'s own timeout is only the backstop above.
type QueryOutcome = Result<Result<Answered, TransportError>, tokio::time::error::Elapsed>;
type QuerySet = FuturesTupleSet<QueryOutcome, RequestMeta>;

/// The outbound request/query lifecycle engine.
pub struct Simulator {
    target: Option<SocketAddr>,
    source_pool: SourcePool,
    transport: Transport,
    client_table: ClientTable,
    stats: StatsChain,
    stats_timer: Option<StatsTimer>,
    timeout_ms: u64,
    free_after_use: bool,

    queries: QuerySet,

    processed: u64,
    discarded: u64,
    timed_out: u64,
    answered_count: u64,
}

impl Simulator {
    /// spec.md section 6: `new(max_clients)`, `capacity >= 1`.
    pub fn new(max_clients: usize) -> Result<Self, ConfigError> {
        if max_clients < 1 {
            return Err(ConfigError::InvalidCapacity);
        }

        Ok(Self {
            target: None,
            source_pool: SourcePool::new(),
            transport: Transport::default(),
            client_table: ClientTable::new(max_clients),
            stats: StatsChain::new(),
            stats_timer: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            free_after_use: true,
            queries: FuturesTupleSet::new(FUTURES_SET_BACKSTOP, DEFAULT_MAX_IN_FLIGHT),
            processed: 0,
            discarded: 0,
            timed_out: 0,
            answered_count: 0,
        })
    }

    /// spec.md section 6: `target(ip, port)` — IPv6-only (section 11).
    pub fn target(&mut self, ip: &str, port: u16) -> Result<(), ConfigError> {
        let ip: Ipv6Addr = ip.parse()?;
        self.target = Some((ip, port).into());
        log::info!("set target to [{ip}]:{port}");
        Ok(())
    }

    /// spec.md section 6: `bind(ip)` — appends to the round-robin source
    /// pool; IPv6-only (section 11).
    pub fn bind(&mut self, ip: &str) -> Result<(), ConfigError> {
        let ip: Ipv6Addr = ip.parse()?;
        self.source_pool.push(ip);
        log::info!("bind to source address {ip}");
        Ok(())
    }

    /// spec.md section 6/9: only `UdpOnly` is implemented; every other
    /// variant is a `ConfigError` rather than the original's process abort
    /// (section 11). Idempotent for `UdpOnly` (section 8).
    pub fn set_transport(&mut self, transport: Transport) -> Result<(), ConfigError> {
        if transport != Transport::UdpOnly {
            return Err(ConfigError::UnsupportedTransport(transport));
        }
        self.transport = transport;
        log::info!("transport set to {transport:?}");
        Ok(())
    }

    /// Per-request timeout; applies to queries pushed after this call.
    ///
    /// Does not touch `self.queries`: the timeout is enforced per-query via
    /// `tokio::time::timeout` at push time (`create_request_udp`), not by
    /// the backing `FuturesTupleSet`, so any query already in flight keeps
    /// running under the timeout that was active when it was created
    /// instead of being silently dropped.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    /// spec.md section 4/6: whether ingested chain objects are considered
    /// released after dispatch. This crate owns no external objects to
    /// release, so the flag only governs whether `receive` borrows or takes
    /// the payload — kept for configuration-surface parity.
    pub fn set_free_after_use(&mut self, free_after_use: bool) {
        self.free_after_use = free_after_use;
    }

    /// spec.md section 6/4.8: `stat_collect(interval_ms)`.
    pub fn stat_collect(&mut self, interval_ms: u64) -> Result<(), ConfigError> {
        if interval_ms < 1 {
            return Err(ConfigError::InvalidStatsInterval);
        }
        self.stats_timer = Some(StatsTimer::new(interval_ms));
        Ok(())
    }

    /// spec.md section 6/4.8: `stat_finish()`.
    pub fn stat_finish(&mut self) {
        self.stats_timer = None;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out
    }

    pub fn answered(&self) -> u64 {
        self.answered_count
    }

    /// `ongoing` = number of live UDP exchanges (spec.md section 3), which
    /// is exactly the bounded future set's current length.
    pub fn ongoing(&self) -> usize {
        self.queries.len()
    }

    pub fn stats(&self) -> &StatsChain {
        &self.stats
    }

    pub fn clients(&self) -> &ClientTable {
        &self.client_table
    }

    /// spec.md section 4.1: `receive(object)`. Accepts one ingested layer
    /// chain; walks it, extracts the client index and payload, and
    /// dispatches to UDP request creation.
    pub fn receive(&mut self, chain: &ObjectChain) {
        self.processed += 1;

        match ingest::locate_payload_and_client(chain) {
            IngestOutcome::MissingPayload => {
                log::warn!("packet discarded: no payload layer in chain");
                self.discarded += 1;
            }
            IngestOutcome::MissingIpLayer => {
                log::warn!("packet discarded: no IP/IP6 layer precedes payload");
                self.discarded += 1;
            }
            IngestOutcome::Dispatched { client_index } => {
                if client_index as usize >= self.client_table.capacity() {
                    log::warn!("packet discarded: client index {client_index} out of range");
                    self.discarded += 1;
                    return;
                }

                let Some(payload) = ingest::payload_bytes(chain) else {
                    log::warn!("packet discarded: no payload layer in chain");
                    self.discarded += 1;
                    return;
                };

                self.create_request_udp(client_index, payload.to_vec());
            }
        }
    }

    /// spec.md section 4.2: `create_request_udp`.
    fn create_request_udp(&mut self, client_index: u32, payload: Vec<u8>) {
        let prepared = match request::create_udp(client_index, payload) {
            Ok(prepared) => prepared,
            Err(_) => {
                log::warn!("packet discarded: malformed DNS header");
                self.discarded += 1;
                return;
            }
        };

        let Some(target) = self.target else {
            log::warn!("packet discarded: no target configured");
            self.discarded += 1;
            return;
        };

        let counters = self
            .client_table
            .get_mut(client_index)
            .expect("client_index already range-checked in receive");
        counters.req_total += 1;
        self.stats.record_request();

        let source = self.source_pool.next();
        let query_id = prepared.query_id;
        let query_payload = prepared.payload;

        let future = query::run(target, source, query_payload, query_id);
        let future = tokio::time::timeout(Duration::from_millis(self.timeout_ms.max(1)), future);

        match self.queries.try_push(future, RequestMeta { client_index }) {
            Ok(()) => {}
            Err(PushError::BeyondCapacity(_)) => {
                log::warn!("packet discarded: too many in-flight queries");
                self.discarded += 1;
            }
            Err(PushError::Replaced(_)) => {
                // `FuturesTupleSet` never replaces by key for this crate
                // (no two in-flight queries ever share a `RequestMeta`
                // equality); unreachable in practice, but not fatal.
                log::warn!("in-flight query slot was replaced unexpectedly");
            }
        }
    }

    /// spec.md section 6: `run_nowait()` — one non-blocking reactor
    /// iteration. Drains every query/timer event currently ready and
    /// returns the number of still-live exchanges (`ongoing`).
    pub async fn run_nowait(&mut self) -> usize {
        use std::future::poll_fn;
        use std::task::Poll;

        poll_fn(|cx| {
            // Nothing in flight and no rotation timer configured: there is
            // no future event left that could ever wake this task (an empty
            // `FuturesTupleSet`'s `poll_unpin` returns `Pending` and never
            // wakes on its own). Report completion immediately instead of
            // waiting forever, matching the `is_empty` guard
            // `nameserver_set.rs` applies before calling `poll_unpin`.
            if self.queries.is_empty() && self.stats_timer.is_none() {
                return Poll::Ready(());
            }

            let mut made_progress = false;

            while !self.queries.is_empty() {
                match self.queries.poll_unpin(cx) {
                    Poll::Ready((outcome, meta)) => {
                        self.finish_query(meta, outcome);
                        made_progress = true;
                    }
                    Poll::Pending => break,
                }
            }

            if let Some(timer) = self.stats_timer.as_mut() {
                use futures::FutureExt;
                if timer.tick().boxed().poll_unpin(cx).is_ready() {
                    self.rotate_stats();
                    made_progress = true;
                }
            }

            if made_progress {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;

        self.ongoing()
    }

    /// Drives `run_nowait` until `ongoing == 0`, the well-behaved shutdown
    /// sequence spec section 5 expects of callers. Ticks the stats timer
    /// along the way exactly as `run_nowait` does, so a caller that only
    /// ever calls `run` still sees stats rotations.
    pub async fn run(&mut self) {
        loop {
            let ongoing = self.run_nowait().await;
            if ongoing == 0 {
                break;
            }
        }
    }

    /// spec.md section 4.4 step 5 / 4.9: the Request's terminal outcome,
    /// whichever layer produced it — an `Ok(Answered)`, a `TransportError`,
    /// the per-query `timeout_ms` firing (`Elapsed`), or (defensively) the
    /// `FuturesTupleSet` backstop firing first. Each of these updates
    /// counters exactly once (invariant 3), since `poll_unpin` yields each
    /// pushed future's result exactly once.
    fn finish_query(
        &mut self,
        meta: RequestMeta,
        outcome: Result<QueryOutcome, futures_bounded::Timeout>,
    ) {
        match outcome {
            Ok(Ok(Ok(answered))) => {
                self.answered_count += 1;
                self.stats.record_answered(answered.noerror);
                if let Some(counters) = self.client_table.get_mut(meta.client_index) {
                    counters.req_answered += 1;
                    if answered.noerror {
                        counters.req_noerror += 1;
                    }
                }
            }
            Ok(Ok(Err(_transport_error))) => {
                self.discarded += 1;
            }
            Ok(Err(_elapsed)) => {
                self.timed_out += 1;
            }
            Err(_backstop_timeout) => {
                log::warn!("query hit the FuturesTupleSet backstop before its own timeout_ms");
                self.timed_out += 1;
            }
        }
    }

    /// spec.md section 4.8 steps 1-3.
    fn rotate_stats(&mut self) {
        log::info!(
            "processed={} answered={} discarded={} ongoing={}",
            self.processed,
            self.stats.sum().answered,
            self.discarded,
            self.ongoing()
        );
        self.stats.rotate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    fn dns_payload(id: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..2].copy_from_slice(&id.to_be_bytes());
        buf
    }

    fn chain_for(dst: Ipv6Addr, payload: Vec<u8>) -> ObjectChain {
        ObjectChain::new()
            .push(Layer::Ip6 { dst })
            .push(Layer::Payload(payload))
    }

    #[test]
    fn new_rejects_zero_capacity() {
        assert_eq!(Simulator::new(0).unwrap_err(), ConfigError::InvalidCapacity);
    }

    #[test]
    fn set_transport_rejects_everything_but_udp_only() {
        let mut sim = Simulator::new(1).unwrap();
        assert!(sim.set_transport(Transport::Tcp).is_err());
        assert!(sim.set_transport(Transport::UdpOnly).is_ok());
        // idempotent, per spec.md section 8.
        assert!(sim.set_transport(Transport::UdpOnly).is_ok());
    }

    #[test]
    fn target_rejects_non_ipv6_literal() {
        let mut sim = Simulator::new(1).unwrap();
        assert!(sim.target("10.0.0.1", 53).is_err());
        assert!(sim.target("::1", 53).is_ok());
    }

    /// spec.md section 8, scenario 5: a chain with only a Payload layer is
    /// discarded without creating a socket.
    #[test]
    fn chain_without_ip_layer_is_discarded() {
        let mut sim = Simulator::new(4).unwrap();
        sim.target("::1", 5353).unwrap();

        let chain = ObjectChain::new().push(Layer::Payload(dns_payload(1)));
        sim.receive(&chain);

        assert_eq!(sim.processed(), 1);
        assert_eq!(sim.discarded(), 1);
        assert_eq!(sim.ongoing(), 0);
    }

    /// spec.md section 8, boundary case: client index >= max_clients is
    /// exactly one discard, no counters otherwise changed.
    #[test]
    fn out_of_range_client_index_is_discarded() {
        let mut sim = Simulator::new(1).unwrap();
        sim.target("::1", 5353).unwrap();

        // first 4 bytes are 0x20, 0x01, 0x0d, 0xb8 -> a nonzero native-endian
        // client index on any host, well beyond max_clients=1.
        let chain = chain_for(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), dns_payload(1));
        sim.receive(&chain);

        assert_eq!(sim.discarded(), 1);
        assert_eq!(sim.ongoing(), 0);
        assert_eq!(sim.clients().total_req_total(), 0);
    }

    /// Regression test: an idle simulator (nothing in flight, no stats
    /// timer configured) must not hang `run_nowait`/`run` waiting for an
    /// event that will never arrive. Wrapped in an outer `tokio::time::
    /// timeout` so a regression reintroducing the hang fails the test
    /// instead of wedging the whole suite.
    #[tokio::test]
    async fn run_on_idle_simulator_with_only_discards_returns_promptly() {
        let mut sim = Simulator::new(1).unwrap();
        sim.target("::1", 5353).unwrap();

        let chain = chain_for(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), dns_payload(1));
        sim.receive(&chain);
        assert_eq!(sim.discarded(), 1);
        assert_eq!(sim.ongoing(), 0);

        tokio::time::timeout(Duration::from_secs(5), sim.run())
            .await
            .expect("run() must not hang on an idle simulator");
    }

    /// spec.md section 8, scenario 1, driven end-to-end through `Simulator`
    /// against a loopback mirror resolver.
    #[tokio::test]
    async fn single_successful_exchange_updates_all_counters() {
        let mirror = UdpSocket::bind(("::1", 0)).await.unwrap();
        let mirror_addr = mirror.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, from) = mirror.recv_from(&mut buf).await.unwrap();
            mirror.send_to(&buf[..n], from).await.unwrap();
        });

        let mut sim = Simulator::new(1).unwrap();
        sim.target(&mirror_addr.ip().to_string(), mirror_addr.port())
            .unwrap();
        sim.set_transport(Transport::UdpOnly).unwrap();

        let chain = chain_for(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), dns_payload(0xAB));
        sim.receive(&chain);

        sim.run().await;
        echo.await.unwrap();

        assert_eq!(sim.processed(), 1);
        assert_eq!(sim.answered(), 1);
        assert_eq!(sim.discarded(), 0);
        assert_eq!(sim.ongoing(), 0);
        assert_eq!(sim.stats().sum().noerror, 1);
    }
}
