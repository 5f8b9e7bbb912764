//! Periodic statistics rotation.
//!
//! The original keeps a doubly linked chain of `output_dnssim_stats_t`
//! records (`first` → ... → `current`) plus a detached cumulative `sum`
//! record, rotated by a `uv_timer_t` firing every `interval_ms`. Per spec's
//! Design Notes, the intrusive `prev`/`next` chain is replaced with a flat
//! `VecDeque`, which preserves the "anchored at `first`, grows by appending
//! at `current`" semantics without pointer-chasing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::time::Interval;

/// One interval-bounded counter snapshot in the stats chain.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StatsRecord {
    pub total: u64,
    pub answered: u64,
    pub noerror: u64,
}

impl StatsRecord {
    fn bump_total(&mut self) {
        self.total += 1;
    }

    fn bump_answered(&mut self, noerror: bool) {
        self.answered += 1;
        if noerror {
            self.noerror += 1;
        }
    }
}

/// The stats chain: a lifetime cumulative `sum`, plus a sequence of
/// interval-bounded records anchored at `first` and growing at `current`.
#[derive(Debug)]
pub struct StatsChain {
    sum: StatsRecord,
    chain: VecDeque<StatsRecord>,
}

impl StatsChain {
    /// A fresh chain starts with exactly one (zeroed) record, matching the
    /// original's `output_dnssim_new`, which sets `stats_first =
    /// stats_current` before any rotation has happened.
    pub fn new() -> Self {
        let mut chain = VecDeque::new();
        chain.push_back(StatsRecord::default());
        Self {
            sum: StatsRecord::default(),
            chain,
        }
    }

    pub fn sum(&self) -> StatsRecord {
        self.sum
    }

    /// The most recently appended record (`current` in spec.md's terms).
    pub fn current(&self) -> StatsRecord {
        *self.chain.back().expect("chain is never empty")
    }

    /// The oldest record (`first`).
    pub fn first(&self) -> StatsRecord {
        *self.chain.front().expect("chain is never empty")
    }

    /// Number of records in the chain, including `first`. After `k`
    /// rotations this is `k + 1` (spec.md section 8, invariant 8).
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatsRecord> {
        self.chain.iter()
    }

    /// Request creation: bumps both `sum.total` and `current.total`
    /// (spec.md section 4.2 step 3).
    pub fn record_request(&mut self) {
        self.sum.bump_total();
        self.chain.back_mut().expect("chain is never empty").bump_total();
    }

    /// Reply validated: bumps `sum.answered`/`current.answered`, and also
    /// the `noerror` counters when the reply's rcode was `NOERROR`
    /// (spec.md section 4.4 step 4).
    pub fn record_answered(&mut self, noerror: bool) {
        self.sum.bump_answered(noerror);
        self.chain
            .back_mut()
            .expect("chain is never empty")
            .bump_answered(noerror);
    }

    /// Appends a fresh zeroed record and makes it `current`, the rewrite of
    /// `_stat_timer_cb`'s `malloc` + link-in (spec.md section 4.8 steps 2-3).
    pub fn rotate(&mut self) {
        self.chain.push_back(StatsRecord::default());
    }
}

impl Default for StatsChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the periodic rotation timer (`stat_timer` in the original).
///
/// `stat_collect`/`stat_finish` on `Simulator` construct and drop this;
/// `Simulator::poll` ticks it alongside the query set.
pub struct StatsTimer {
    interval: Interval,
}

impl StatsTimer {
    pub fn new(interval_ms: u64) -> Self {
        let period = Duration::from_millis(interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; we only want rotations at each
        // full period, matching libuv's `uv_timer_start(..., interval_ms,
        // interval_ms)` (first fire after one full interval, not at t=0).
        interval.reset_after(period);
        Self { interval }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await.into_std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chain_has_one_record() {
        let chain = StatsChain::new();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.first(), chain.current());
    }

    #[test]
    fn k_rotations_yield_k_plus_one_records() {
        let mut chain = StatsChain::new();
        for _ in 0..3 {
            chain.rotate();
        }
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn rotation_preserves_first_and_advances_current() {
        let mut chain = StatsChain::new();
        chain.record_request();
        let first_snapshot = chain.first();
        chain.rotate();
        chain.record_request();

        assert_eq!(chain.first(), first_snapshot);
        assert_eq!(chain.current().total, 1);
        assert_eq!(chain.sum().total, 2);
    }

    #[test]
    fn answered_bumps_noerror_only_on_noerror_rcode() {
        let mut chain = StatsChain::new();
        chain.record_answered(true);
        chain.record_answered(false);

        assert_eq!(chain.sum().answered, 2);
        assert_eq!(chain.sum().noerror, 1);
    }
}
