use std::path::PathBuf;

use crate::error::{PageRankError, Result};
use crate::graph_stream::GraphStats;
use crate::records::NodeId;

/// Parameters of one PageRank run.
///
/// `n_nodes`, `min_node_id` and `max_node_id` describe the graph and are normally
/// precomputed by a separate scan of the edge list (see [`GraphStats`]). They are
/// trusted as given: a disagreement with the actual graph is only warned about.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRankConfig {
    pub n_iterations: usize,
    pub damping_factor: f64,
    pub n_nodes: u64,
    pub min_node_id: NodeId,
    pub max_node_id: NodeId,
    pub top_n: usize,
    /// Redistribute the rank of dangling nodes over `[min_node_id, max_node_id]`.
    pub dangling_correction: bool,
    /// Apply teleportation. When off, a node's next rank is its raw contribution sum.
    pub damping: bool,
    /// Stop early once no rank moves by this much or more in one iteration.
    pub convergence_threshold: Option<f64>,
    /// Return every final rank, not only the top `top_n`.
    pub retain_ranks: bool,
    /// Write each generation as delimited part files under this directory.
    pub dump_dir: Option<PathBuf>,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        PageRankConfig {
            n_iterations: 10,
            damping_factor: 0.85,
            n_nodes: 1,
            min_node_id: 0,
            max_node_id: 0,
            top_n: 10,
            dangling_correction: true,
            damping: true,
            convergence_threshold: None,
            retain_ranks: false,
            dump_dir: None,
        }
    }
}

impl PageRankConfig {
    /// Default parameters with the graph bounds taken from a scan.
    pub fn for_graph(stats: &GraphStats) -> Self {
        PageRankConfig::default().with_bounds(stats.n_nodes, stats.min_node_id, stats.max_node_id)
    }

    pub fn with_bounds(mut self, n_nodes: u64, min_node_id: NodeId, max_node_id: NodeId) -> Self {
        self.n_nodes = n_nodes;
        self.min_node_id = min_node_id;
        self.max_node_id = max_node_id;
        self
    }

    pub fn with_iterations(mut self, n_iterations: usize) -> Self {
        self.n_iterations = n_iterations;
        self
    }

    pub fn with_damping_factor(mut self, damping_factor: f64) -> Self {
        self.damping_factor = damping_factor;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }

    pub fn with_retained_ranks(mut self) -> Self {
        self.retain_ranks = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_nodes == 0 {
            return Err(PageRankError::InvalidConfig("n_nodes must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.damping_factor) {
            return Err(PageRankError::InvalidConfig(format!(
                "damping_factor must lie in [0, 1], got {}",
                self.damping_factor
            )));
        }
        if self.min_node_id > self.max_node_id {
            return Err(PageRankError::InvalidConfig(format!(
                "min_node_id {} exceeds max_node_id {}",
                self.min_node_id, self.max_node_id
            )));
        }
        if let Some(threshold) = self.convergence_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(PageRankError::InvalidConfig(format!(
                    "convergence_threshold must be positive, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    /// Damping factor actually applied by the finalizer.
    pub fn effective_damping(&self) -> f64 {
        if self.damping {
            self.damping_factor
        } else {
            1.0
        }
    }

    pub fn initial_rank(&self) -> f64 {
        1.0 / self.n_nodes as f64
    }

    /// Disagreements between the supplied bounds and a scan of the graph.
    pub fn mismatches(&self, stats: &GraphStats) -> Vec<PageRankError> {
        [
            ("n_nodes", self.n_nodes, stats.n_nodes),
            ("min_node_id", self.min_node_id, stats.min_node_id),
            ("max_node_id", self.max_node_id, stats.max_node_id),
        ]
        .into_iter()
        .filter(|(_, supplied, observed)| supplied != observed)
        .map(|(field, supplied, observed)| PageRankError::ConfigMismatch {
            field,
            supplied,
            observed,
        })
        .collect()
    }
}
