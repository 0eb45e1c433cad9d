//! One pass over an edge list to find the node count and id bounds the rank job needs.

use anyhow::{Context, Result};
use clap::Parser;
use rankflow::graph_stream;
use rankflow::GraphStats;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct GraphStatsArgs {
    /// Edge list with one `src dst` pair per line
    #[arg(long)]
    edge_list: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = GraphStatsArgs::parse();

    let edges = graph_stream::from_edge_list_file(&args.edge_list)
        .with_context(|| format!("failed to read edge list {}", args.edge_list.display()))?;
    let stats = GraphStats::scan(&edges).context("the edge list has no edges")?;

    println!("n_nodes\t{}", stats.n_nodes);
    println!("n_edges\t{}", stats.n_edges);
    println!("min_node_id\t{}", stats.min_node_id);
    println!("max_node_id\t{}", stats.max_node_id);
    println!("n_sinks\t{}", stats.n_sinks);
    if stats.id_gaps() > 0 {
        log::warn!(
            "{} ids between min_node_id and max_node_id never occur",
            stats.id_gaps()
        );
    }
    Ok(())
}
