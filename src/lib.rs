//! PageRank over a partitioned timely dataflow.
//!
//! The computation mirrors a chain of map/reduce steps. It builds adjacency records
//! from an edge list, runs a fixed number of contribution/reduction rounds with
//! dangling-mass redistribution and damping, then selects the top ranks.

pub mod config;
pub mod contributions;
pub mod driver;
pub mod error;
pub mod graph_builder;
pub mod graph_stream;
pub mod job;
pub mod rank_utils;
pub mod records;
pub mod reduce;
pub mod top_n;

pub use config::PageRankConfig;
pub use driver::{execute, PageRankOutput};
pub use error::{PageRankError, Result};
pub use graph_stream::GraphStats;
pub use rank_utils::RankedEntry;
pub use records::{Edge, Node, NodeId};
