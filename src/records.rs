//! Records that travel between stages.
//!
//! Every stage exchanges keyed records. Node state moves as whole [`Node`] values,
//! each generation replacing the last. Contributions and node records share one
//! keyed channel and are told apart by the [`Message`] tag.

use abomonation_derive::Abomonation;
use serde::Serialize;

pub type NodeId = u64;

/// A directed edge `(src, dst)`.
pub type Edge = (NodeId, NodeId);

#[derive(Clone, Debug, PartialEq, Abomonation)]
pub struct Node {
    pub id: NodeId,
    pub out_links: Vec<NodeId>,
    pub rank: f64,
}

impl Node {
    pub fn new(id: NodeId, out_links: Vec<NodeId>, rank: f64) -> Self {
        Node {
            id,
            out_links,
            rank,
        }
    }

    pub fn dangling(id: NodeId, rank: f64) -> Self {
        Node::new(id, Vec::new(), rank)
    }

    pub fn is_dangling(&self) -> bool {
        self.out_links.is_empty()
    }

    /// Rank mass sent along each outgoing edge, or `None` for a dangling node.
    pub fn contribution(&self) -> Option<f64> {
        if self.is_dangling() {
            None
        } else {
            Some(self.rank / self.out_links.len() as f64)
        }
    }

    /// Next-generation node with the same adjacency.
    pub fn with_rank(self, rank: f64) -> Self {
        Node { rank, ..self }
    }
}

/// Routing key of the contribution channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Abomonation)]
pub enum ChannelKey {
    Node(NodeId),
    /// Sentinel that gathers every partial dangling sum onto worker 0.
    DanglingMass,
}

impl ChannelKey {
    pub fn route(&self) -> u64 {
        match self {
            ChannelKey::Node(id) => *id,
            ChannelKey::DanglingMass => 0,
        }
    }

    /// Output index used to split the mapper output into contribution and dangling lanes.
    pub fn lane(&self) -> u64 {
        match self {
            ChannelKey::Node(_) => 0,
            ChannelKey::DanglingMass => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Abomonation)]
pub enum Message {
    Mass(f64),
    NodeRecord(Node),
}

/// Output of the first graph-building pass.
#[derive(Clone, Debug, PartialEq, Abomonation)]
pub enum BuildRecord {
    Adjacency(Node),
    /// The key was seen as an edge destination.
    Placeholder,
}

/// Reducer output: the node carrying its raw contribution sum, plus the rank it had before.
#[derive(Clone, Debug, PartialEq)]
pub struct Reduced {
    pub node: Node,
    pub previous_rank: f64,
}

/// Finalizer output: the next-generation node and how far its rank moved.
#[derive(Clone, Debug, PartialEq)]
pub struct Finalized {
    pub node: Node,
    pub delta: f64,
}

/// Wire form of a node record, keyed by id outside the JSON value.
#[derive(Debug, Serialize)]
pub struct WireNode<'a> {
    pub out_links: &'a [NodeId],
    pub page_rank: f64,
}

impl<'a> From<&'a Node> for WireNode<'a> {
    fn from(node: &'a Node) -> Self {
        WireNode {
            out_links: &node.out_links,
            page_rank: node.rank,
        }
    }
}
