//! Sequences the rank computation on each worker.
//!
//! Every stage runs as its own job (see [`crate::job`]): one to build the graph, one
//! per iteration, one for the top-N selection. A worker keeps only its share of the
//! current node generation between jobs, and each iteration replaces it wholesale.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use timely::communication::Allocate;
use timely::dataflow::channels::pact::{Exchange, Pipeline};
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::operators::{Concat, Map, Partition};
use timely::dataflow::{Scope, Stream};
use timely::worker::Worker;

use crate::config::PageRankConfig;
use crate::contributions::{map_contributions, redistribute_dangling_mass};
use crate::error::{PageRankError, Result};
use crate::graph_builder::build_graph;
use crate::graph_stream::{dump_generation, GraphStats};
use crate::job::{materialize, run_job};
use crate::rank_utils::RankedEntry;
use crate::records::{ChannelKey, Edge, Finalized, Message, Node, NodeId};
use crate::reduce::{reduce_contributions, RankFinalizer};
use crate::top_n::select_top_n;

/// One iteration: map, redistribute dangling mass, reduce, finalize.
pub fn rank_iteration<G: Scope>(
    node_stream: &Stream<G, Node>,
    config: &PageRankConfig,
    dropped_groups: Rc<Cell<u64>>,
) -> Stream<G, Finalized> {
    let mapped = map_contributions(node_stream, config.dangling_correction);
    let lanes = mapped.partition(2, |(key, message): (ChannelKey, Message)| {
        (key.lane(), (key, message))
    });

    let mut contributions = lanes[0].clone();
    if config.dangling_correction {
        let fan_out = redistribute_dangling_mass(
            &lanes[1],
            config.n_nodes,
            config.min_node_id,
            config.max_node_id,
        );
        contributions = contributions.concat(&fan_out);
    }

    let finalizer = RankFinalizer::new(config.effective_damping(), config.n_nodes);
    reduce_contributions(&contributions, dropped_groups)
        .map(move |reduced| finalizer.finalize(reduced))
}

/// Largest rank change of the iteration, computed on worker 0 and addressed to every worker.
pub fn broadcast_max_delta<G: Scope>(
    finalized_stream: &Stream<G, Finalized>,
    peers: usize,
) -> Stream<G, (u64, f64)> {
    finalized_stream.map(|finalized| finalized.delta).unary_frontier(
        Exchange::new(|_delta: &f64| 0),
        "ConvergenceMonitor",
        move |_capability, _info| {
            let mut delta_stash = HashMap::new();

            move |delta_input, output| {
                while let Some((time, data)) = delta_input.next() {
                    let max_delta = delta_stash.entry(time.retain()).or_insert(0.0f64);
                    for delta in data.replace(Vec::new()) {
                        *max_delta = max_delta.max(delta);
                    }
                }

                let frontier = delta_input.frontier();

                for (time, max_delta) in delta_stash.iter() {
                    if !frontier.less_equal(time) {
                        let mut session = output.session(time);
                        for worker_index in 0..peers {
                            session.give((worker_index as u64, *max_delta));
                        }
                    }
                }

                delta_stash.retain(|time, _max_delta| frontier.less_equal(time));
            }
        },
    )
}

/// What one worker saw of the run.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub nodes: usize,
    pub top: Vec<RankedEntry>,
    pub ranks: Vec<(NodeId, f64)>,
    pub iteration_mass: Vec<f64>,
    pub iterations_run: usize,
    pub dropped_groups: u64,
}

pub struct IterationDriver<'c> {
    config: &'c PageRankConfig,
}

impl<'c> IterationDriver<'c> {
    pub fn new(config: &'c PageRankConfig) -> Self {
        IterationDriver { config }
    }

    /// Runs every job on this worker. All workers must call this with the same config.
    ///
    /// Dump failures do not stop the worker, since its peers would block waiting for it;
    /// the first one is returned once the last job has finished.
    pub fn run<A: Allocate>(&self, worker: &mut Worker<A>, edges: Vec<Edge>) -> Result<WorkerReport> {
        let config = self.config;
        let index = worker.index();
        let peers = worker.peers();
        let mut report = WorkerReport::default();
        let mut first_error = None;

        let start_instant = Instant::now();
        let initial_rank = config.initial_rank();
        let mut generation = run_job(worker, "build-graph", edges, |edge_stream, probe| {
            materialize(&build_graph(edge_stream, initial_rank), Pipeline, probe)
        })
        .take();
        report.nodes = generation.len();
        log::info!(
            "worker {}: built {} nodes in {}ms",
            index,
            generation.len(),
            start_instant.elapsed().as_millis()
        );
        self.dump(0, index, &generation, &mut first_error);

        for iteration in 1..=config.n_iterations {
            let iteration_instant = Instant::now();
            let dropped_groups = Rc::new(Cell::new(0));

            let (finalized, verdicts) =
                run_job(worker, "rank-iteration", generation, |node_stream, probe| {
                    let finalized = rank_iteration(node_stream, config, Rc::clone(&dropped_groups));
                    let verdicts = config.convergence_threshold.map(|_| {
                        materialize(
                            &broadcast_max_delta(&finalized, peers),
                            Exchange::new(|(worker_index, _delta): &(u64, f64)| *worker_index),
                            probe,
                        )
                    });
                    (materialize(&finalized, Pipeline, probe), verdicts)
                });

            generation = finalized
                .take()
                .into_iter()
                .map(|finalized| finalized.node)
                .collect::<Vec<_>>();
            report.iterations_run = iteration;
            report.dropped_groups += dropped_groups.get();
            report
                .iteration_mass
                .push(generation.iter().map(|node| node.rank).sum());
            self.dump(iteration, index, &generation, &mut first_error);

            if index == 0 {
                log::info!(
                    "iteration {}/{} finished in {}ms",
                    iteration,
                    config.n_iterations,
                    iteration_instant.elapsed().as_millis()
                );
            }
            if dropped_groups.get() > 0 {
                log::debug!(
                    "worker {}: iteration {} dropped {} contributions without a node",
                    index,
                    iteration,
                    dropped_groups.get()
                );
            }

            if let (Some(threshold), Some(verdicts)) = (config.convergence_threshold, verdicts) {
                let max_delta = verdicts
                    .take()
                    .into_iter()
                    .map(|(_worker_index, delta)| delta)
                    .fold(0.0, f64::max);
                if max_delta < threshold {
                    if index == 0 {
                        log::info!(
                            "converged after {} iterations (max delta {:e} < {:e})",
                            iteration,
                            max_delta,
                            threshold
                        );
                    }
                    break;
                }
            }
        }

        let entries = generation
            .iter()
            .map(|node| RankedEntry::new(node.id, node.rank))
            .collect::<Vec<_>>();
        drop(generation);
        if config.retain_ranks {
            report.ranks = entries.iter().map(|entry| (entry.id, entry.rank)).collect();
        }

        let top_n = config.top_n;
        report.top = run_job(worker, "top-n", entries, |rank_stream, probe| {
            materialize(&select_top_n(rank_stream, top_n), Pipeline, probe)
        })
        .take()
        .into_iter()
        .flatten()
        .collect();

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn dump(
        &self,
        generation_index: usize,
        worker_index: usize,
        generation: &[Node],
        first_error: &mut Option<PageRankError>,
    ) {
        if let Some(dir) = &self.config.dump_dir {
            if let Err(err) = dump_generation(dir, generation_index, worker_index, generation) {
                log::error!("worker {}: generation dump failed: {}", worker_index, err);
                first_error.get_or_insert(err);
            }
        }
    }
}

/// Result of a run, merged over all workers.
#[derive(Debug, Default)]
pub struct PageRankOutput {
    /// Highest ranks, best first; equal ranks by ascending id.
    pub top: Vec<RankedEntry>,
    /// Every final rank sorted by id, if `retain_ranks` was set.
    pub ranks: Vec<(NodeId, f64)>,
    /// Total rank after each iteration.
    pub iteration_mass: Vec<f64>,
    pub iterations_run: usize,
    /// Contribution groups that had no node to land on, over all iterations.
    pub dropped_groups: u64,
    /// Nodes reconstructed from the edge list.
    pub n_nodes: usize,
}

impl PageRankOutput {
    fn absorb(&mut self, report: WorkerReport) {
        if !report.top.is_empty() {
            self.top = report.top;
        }
        self.ranks.extend(report.ranks);
        if self.iteration_mass.len() < report.iteration_mass.len() {
            self.iteration_mass.resize(report.iteration_mass.len(), 0.0);
        }
        for (total, mass) in self.iteration_mass.iter_mut().zip(report.iteration_mass) {
            *total += mass;
        }
        self.iterations_run = self.iterations_run.max(report.iterations_run);
        self.dropped_groups += report.dropped_groups;
        self.n_nodes += report.nodes;
    }
}

/// Runs PageRank over `edges` on the workers described by `timely_config`.
pub fn execute(
    config: PageRankConfig,
    edges: Vec<Edge>,
    timely_config: timely::Config,
) -> Result<PageRankOutput> {
    config.validate()?;
    match GraphStats::scan(&edges) {
        Some(stats) => {
            for mismatch in config.mismatches(&stats) {
                log::warn!("{}; continuing with the configured value", mismatch);
            }
        }
        None => log::warn!("edge list is empty"),
    }

    let start_instant = Instant::now();
    let config = Arc::new(config);
    let edges = Arc::new(edges);

    let guards = timely::execute(timely_config, move |worker| {
        let local_edges = edges
            .iter()
            .skip(worker.index())
            .step_by(worker.peers())
            .cloned()
            .collect::<Vec<_>>();
        IterationDriver::new(&config).run(worker, local_edges)
    })
    .map_err(PageRankError::Dataflow)?;

    let mut output = PageRankOutput::default();
    for result in guards.join() {
        output.absorb(result.map_err(PageRankError::Dataflow)??);
    }
    output.ranks.sort_by_key(|&(node_id, _rank)| node_id);

    log::info!(
        "ranked {} nodes in {} iterations ({}ms)",
        output.n_nodes,
        output.iterations_run,
        start_instant.elapsed().as_millis()
    );
    Ok(output)
}
