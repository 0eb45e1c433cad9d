use anyhow::{bail, Context, Result};
use clap::Parser;
use rankflow::graph_stream;
use rankflow::rank_utils;
use rankflow::{GraphStats, PageRankConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct PageRankArgs {
    /// Edge list with one `src dst` pair per line
    #[arg(long, required_unless_present = "random_nodes")]
    edge_list: Option<PathBuf>,
    /// Rank a seeded random graph over ids `0..random_nodes` instead
    #[arg(long, requires = "random_edges", conflicts_with = "edge_list")]
    random_nodes: Option<u64>,
    #[arg(long)]
    random_edges: Option<usize>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10)]
    n_iterations: usize,
    #[arg(long, default_value_t = 0.85)]
    damping_factor: f64,
    /// Number of distinct nodes; scanned from the edge list when omitted
    #[arg(long)]
    n_nodes: Option<u64>,
    #[arg(long)]
    min_node_id: Option<u64>,
    #[arg(long)]
    max_node_id: Option<u64>,
    #[arg(long, default_value_t = 10)]
    top_n: usize,
    /// Stop once no rank changes by this much in an iteration
    #[arg(long)]
    convergence_threshold: Option<f64>,
    #[arg(long)]
    no_dangling_correction: bool,
    #[arg(long)]
    no_damping: bool,
    /// Write every generation as delimited part files here
    #[arg(long)]
    dump_dir: Option<PathBuf>,
    /// Write the top ranks here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, short, default_value_t = 1)]
    workers: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = PageRankArgs::parse();

    let edges = match (&args.edge_list, args.random_nodes, args.random_edges) {
        (Some(path), _, _) => graph_stream::from_edge_list_file(path)
            .with_context(|| format!("failed to read edge list {}", path.display()))?,
        (None, Some(nodes), Some(edges)) => graph_stream::random_edges(nodes, edges, args.seed),
        _ => bail!("pass --edge-list, or --random-nodes together with --random-edges"),
    };

    let stats = GraphStats::scan(&edges);
    let bound = |supplied: Option<u64>, scanned: fn(&GraphStats) -> u64, flag: &str| {
        supplied
            .or_else(|| stats.as_ref().map(scanned))
            .with_context(|| format!("--{} is required when the edge list is empty", flag))
    };
    let n_nodes = bound(args.n_nodes, |stats| stats.n_nodes, "n-nodes")?;
    let min_node_id = bound(args.min_node_id, |stats| stats.min_node_id, "min-node-id")?;
    let max_node_id = bound(args.max_node_id, |stats| stats.max_node_id, "max-node-id")?;
    if let Some(stats) = &stats {
        if stats.id_gaps() > 0 {
            log::warn!(
                "{} ids in [{}, {}] never occur in the edge list; their share of dangling mass is lost",
                stats.id_gaps(),
                stats.min_node_id,
                stats.max_node_id
            );
        }
    }

    let mut config = PageRankConfig::default()
        .with_bounds(n_nodes, min_node_id, max_node_id)
        .with_iterations(args.n_iterations)
        .with_damping_factor(args.damping_factor)
        .with_top_n(args.top_n);
    config.dangling_correction = !args.no_dangling_correction;
    config.damping = !args.no_damping;
    config.convergence_threshold = args.convergence_threshold;
    config.dump_dir = args.dump_dir;

    let output = rankflow::execute(config, edges, timely::Config::process(args.workers))?;
    if output.dropped_groups > 0 {
        log::warn!(
            "{} contribution groups landed on ids without a node",
            output.dropped_groups
        );
    }
    if let Some(mass) = output.iteration_mass.last() {
        log::info!("total rank after the last iteration: {:.9}", mass);
    }

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            rank_utils::write_ranks(BufWriter::new(file), &output.top)?;
        }
        None => rank_utils::write_ranks(std::io::stdout().lock(), &output.top)?,
    }
    Ok(())
}
