//! Simulates an overlay on an in-memory [Testnet]: nodes bootstrap through a
//! single seed, refresh their routing tables, then some go offline while the
//! rest look each other up.
//!
//! Run: `cargo run --example simulation -- --nodes 500 --offline 0.1`

use std::time::Instant;

use clap::Parser;
use prefix_dht::{rpc::Config, Dht, Testnet};
use rand::{seq::SliceRandom, Rng};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes in the network
    #[arg(short, long, default_value_t = 200)]
    nodes: usize,
    /// Length of node ids in bytes
    #[arg(long, default_value_t = 10)]
    id_len: usize,
    /// Refresh rounds every node runs before the lookups
    #[arg(short, long, default_value_t = 3)]
    rounds: usize,
    /// Number of lookups
    #[arg(short, long, default_value_t = 100)]
    lookups: usize,
    /// Fraction of nodes going offline after bootstrapping
    #[arg(short, long, default_value_t = 0.0)]
    offline: f64,
    /// Capacity of the farthest bucket
    #[arg(short, long, default_value_t = 20)]
    bucket_size: usize,
    /// Log every request
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    let config = Config {
        bucket_size: cli.bucket_size,
        ..Default::default()
    };

    let testnet = Testnet::new(cli.nodes, cli.id_len, config);
    let ids = testnet.ids();
    let nodes: Vec<Dht> = ids.iter().filter_map(|id| testnet.get(id)).collect();

    println!("\n=== BOOTSTRAP ({} nodes) ===", nodes.len());

    for round in 1..=cli.rounds {
        let start = Instant::now();
        let mut sent = 0;

        for node in &nodes {
            sent += node.refresh(&testnet);
        }

        println!(
            "round {round}: {sent} requests in {:?}, average table size {:.1}",
            start.elapsed(),
            average_known(&nodes)
        );
    }

    let mut rng = rand::thread_rng();

    let mut offline = 0;
    for id in &ids {
        if rng.gen_bool(cli.offline.clamp(0.0, 1.0)) {
            testnet.set_offline(id, true);
            offline += 1;
        }
    }

    let online: Vec<&Dht> = nodes
        .iter()
        .filter(|dht| !testnet.is_offline(dht.id()))
        .collect();

    println!("\n=== LOOKUPS ({offline} nodes offline) ===");

    let start = Instant::now();
    let mut found = 0;
    let mut requests = 0;

    for _ in 0..cli.lookups {
        let (Some(from), Some(target)) = (online.choose(&mut rng), online.choose(&mut rng)) else {
            break;
        };

        let Ok(seeker) = from.search(target.id(), &testnet) else {
            continue;
        };

        requests += seeker.responses();
        if seeker.is_done() {
            found += 1;
        }
    }

    println!(
        "found {found}/{} in {:?}, {:.1} requests per lookup",
        cli.lookups,
        start.elapsed(),
        requests as f64 / cli.lookups.max(1) as f64
    );
    println!("average table size {:.1}", average_known(&nodes));
}

fn average_known(nodes: &[Dht]) -> f64 {
    let total: usize = nodes
        .iter()
        .map(|dht| dht.routing_table().known_count())
        .sum();

    total as f64 / nodes.len().max(1) as f64
}
