//! Per-node reduction of one iteration's contributions, and the damping step.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use timely::dataflow::channels::pact::Exchange;
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::{Scope, Stream};

use crate::error::{PageRankError, Result};
use crate::records::{ChannelKey, Finalized, Message, Node, NodeId, Reduced};

/// Everything delivered under one node key in one iteration.
#[derive(Debug, Default)]
pub struct ContributionGroup {
    mass: f64,
    record: Option<Node>,
    extra_records: usize,
}

impl ContributionGroup {
    pub fn absorb(&mut self, message: Message) {
        match message {
            Message::Mass(mass) => self.mass += mass,
            Message::NodeRecord(node) => {
                if self.record.is_none() {
                    self.record = Some(node);
                } else {
                    self.extra_records += 1;
                }
            }
        }
    }

    /// The node carrying its raw contribution sum as rank.
    pub fn finish(self, node_id: NodeId) -> Result<Reduced> {
        if self.extra_records > 0 {
            log::warn!(
                "node {} arrived {} extra times; keeping the first record",
                node_id,
                self.extra_records
            );
        }
        let node = self.record.ok_or(PageRankError::MissingNode(node_id))?;
        Ok(Reduced {
            previous_rank: node.rank,
            node: node.with_rank(self.mass),
        })
    }
}

/// Groups contributions by node. Groups without a node record are dropped and
/// counted in `dropped_groups`.
pub fn reduce_contributions<G: Scope>(
    contribution_stream: &Stream<G, (ChannelKey, Message)>,
    dropped_groups: Rc<Cell<u64>>,
) -> Stream<G, Reduced> {
    contribution_stream.unary_frontier(
        Exchange::new(|(key, _message): &(ChannelKey, Message)| key.route()),
        "ContributionReducer",
        move |_capability, _info| {
            let mut contribution_stash = HashMap::new();

            move |contribution_input, output| {
                while let Some((time, data)) = contribution_input.next() {
                    contribution_stash
                        .entry(time.retain())
                        .or_insert(Vec::new())
                        .extend(data.replace(Vec::new()));
                }

                let frontier = contribution_input.frontier();

                for (time, contribution_changes) in contribution_stash.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut groups: HashMap<NodeId, ContributionGroup> = HashMap::new();
                        for (key, message) in contribution_changes.drain(..) {
                            match key {
                                ChannelKey::Node(node_id) => {
                                    groups.entry(node_id).or_default().absorb(message)
                                }
                                ChannelKey::DanglingMass => {
                                    log::warn!("dangling-mass record reached the reducer")
                                }
                            }
                        }

                        let mut session = output.session(time);
                        for (node_id, group) in groups {
                            match group.finish(node_id) {
                                Ok(reduced) => session.give(reduced),
                                Err(err) => {
                                    log::trace!("dropping group: {}", err);
                                    dropped_groups.set(dropped_groups.get() + 1);
                                }
                            }
                        }
                    }
                }

                contribution_stash.retain(|_time, changes| !changes.is_empty());
            }
        },
    )
}

/// `rank' = (1 - d) / N + d * raw`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankFinalizer {
    damping_factor: f64,
    teleport: f64,
}

impl RankFinalizer {
    pub fn new(damping_factor: f64, n_nodes: u64) -> Self {
        RankFinalizer {
            damping_factor,
            teleport: (1.0 - damping_factor) / n_nodes as f64,
        }
    }

    pub fn rank(&self, raw_contribution_sum: f64) -> f64 {
        self.teleport + self.damping_factor * raw_contribution_sum
    }

    pub fn finalize(&self, reduced: Reduced) -> Finalized {
        let rank = self.rank(reduced.node.rank);
        Finalized {
            delta: (rank - reduced.previous_rank).abs(),
            node: reduced.node.with_rank(rank),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_mass_around_the_node_record() {
        let mut group = ContributionGroup::default();
        group.absorb(Message::Mass(0.125));
        group.absorb(Message::NodeRecord(Node::new(3, vec![1], 0.5)));
        group.absorb(Message::Mass(0.25));

        let reduced = group.finish(3).unwrap();
        assert_eq!(reduced.previous_rank, 0.5);
        assert_eq!(reduced.node, Node::new(3, vec![1], 0.375));
    }

    #[test]
    fn mass_without_a_record_is_a_missing_node() {
        let mut group = ContributionGroup::default();
        group.absorb(Message::Mass(0.1));
        assert!(matches!(group.finish(8), Err(PageRankError::MissingNode(8))));
    }

    #[test]
    fn node_without_mass_reduces_to_zero() {
        let mut group = ContributionGroup::default();
        group.absorb(Message::NodeRecord(Node::dangling(2, 0.5)));
        assert_eq!(group.finish(2).unwrap().node.rank, 0.0);
    }

    #[test]
    fn duplicate_records_keep_the_first() {
        let mut group = ContributionGroup::default();
        group.absorb(Message::NodeRecord(Node::new(1, vec![2], 0.5)));
        group.absorb(Message::NodeRecord(Node::new(1, vec![3], 0.5)));
        assert_eq!(group.finish(1).unwrap().node.out_links, vec![2]);
    }

    #[test]
    fn finalizer_applies_teleportation_and_damping() {
        let finalizer = RankFinalizer::new(0.85, 2);
        let finalized = finalizer.finalize(Reduced {
            node: Node::new(1, vec![2], 0.25),
            previous_rank: 0.5,
        });
        assert!((finalized.node.rank - (0.075 + 0.85 * 0.25)).abs() < 1e-12);
        assert!((finalized.delta - (0.5 - 0.2875)).abs() < 1e-12);
    }

    #[test]
    fn undamped_finalizer_is_the_identity() {
        let finalizer = RankFinalizer::new(1.0, 10);
        assert_eq!(finalizer.rank(0.3), 0.3);
    }
}
