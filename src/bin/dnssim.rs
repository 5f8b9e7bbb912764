//! Minimal standalone driver for the simulator.
//!
//! spec.md section 1 marks the scripting/embedding surface that normally
//! drives this engine (a dnsjit Lua script, in the original) out of scope.
//! This binary is the stand-in so the crate is runnable on its own: it reads
//! input records from a file (one per line, `<client-ipv6> <hex-payload>`)
//! and replays them through a `Simulator` against a configured target.

use std::io::BufRead;
use std::net::Ipv6Addr;
use std::path::PathBuf;

use clap::Parser;
use dnssim::ingest::{Layer, ObjectChain};
use dnssim::simulator::Simulator;
use dnssim::transport::Transport;

/// Replay DNS packet records as UDP queries against a target resolver.
#[derive(Parser)]
#[command(name = "dnssim", version, about)]
struct Cli {
    /// Target resolver address, e.g. `::1`.
    #[arg(long)]
    target: String,

    /// Target resolver port.
    #[arg(long, default_value_t = 53)]
    port: u16,

    /// Local source address to bind outgoing queries to. Repeatable; queries
    /// round-robin across every `--bind` given.
    #[arg(long = "bind")]
    binds: Vec<Ipv6Addr>,

    /// Number of synthetic clients the client table tracks.
    #[arg(long, default_value_t = 256)]
    max_clients: usize,

    /// Per-request timeout, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Statistics rotation interval, in milliseconds. Omit to disable
    /// periodic rotation.
    #[arg(long)]
    stats_interval_ms: Option<u64>,

    /// Input file: one record per line, `<client-ipv6> <hex-payload>`.
    input: PathBuf,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    simple_logger::init().expect("failed to initialize logger");

    let cli = Cli::parse();

    let mut sim = match build_simulator(&cli) {
        Ok(sim) => sim,
        Err(err) => {
            log::error!("configuration error: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let records = match read_records(&cli.input) {
        Ok(records) => records,
        Err(err) => {
            log::error!("failed to read {}: {err}", cli.input.display());
            return std::process::ExitCode::FAILURE;
        }
    };

    for (dst, payload) in records {
        let chain = ObjectChain::new()
            .push(Layer::Ip6 { dst })
            .push(Layer::Payload(payload));
        sim.receive(&chain);
    }

    sim.run().await;

    log::info!(
        "processed={} answered={} discarded={} timed_out={}",
        sim.processed(),
        sim.answered(),
        sim.discarded(),
        sim.timed_out(),
    );

    std::process::ExitCode::SUCCESS
}

fn build_simulator(cli: &Cli) -> Result<Simulator, Box<dyn std::error::Error>> {
    let mut sim = Simulator::new(cli.max_clients)?;
    sim.target(&cli.target, cli.port)?;
    sim.set_transport(Transport::UdpOnly)?;
    sim.set_timeout_ms(cli.timeout_ms);

    for bind in &cli.binds {
        sim.bind(&bind.to_string())?;
    }

    if let Some(interval_ms) = cli.stats_interval_ms {
        sim.stat_collect(interval_ms)?;
    }

    Ok(sim)
}

/// Each line is `<client-ipv6> <hex-payload>`; blank lines and lines starting
/// with `#` are skipped.
fn read_records(path: &PathBuf) -> std::io::Result<Vec<(Ipv6Addr, Vec<u8>)>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((dst, hex_payload)) = line.split_once(char::is_whitespace) else {
            log::warn!("skipping malformed input line: {line:?}");
            continue;
        };

        let Ok(dst) = dst.parse::<Ipv6Addr>() else {
            log::warn!("skipping line with unparsable client address: {dst:?}");
            continue;
        };

        let payload = match hex_decode(hex_payload.trim()) {
            Ok(payload) => payload,
            Err(()) => {
                log::warn!("skipping line with unparsable hex payload");
                continue;
            }
        };

        records.push((dst, payload));
    }

    Ok(records)
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
