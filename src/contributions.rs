//! Rank propagation out of each node.
//!
//! The mapper splits every node's rank over its out-links and pre-aggregates the shares
//! per destination before they cross the exchange. Rank held by dangling nodes is summed
//! instead, sent to worker 0 under [`ChannelKey::DanglingMass`], and fanned back out
//! uniformly over the configured id range.

use std::collections::HashMap;

use timely::dataflow::channels::pact::Exchange;
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::{Scope, Stream};

use crate::records::{ChannelKey, Message, Node, NodeId};

/// Task-local accumulator of outgoing rank, flushed once per partition.
#[derive(Debug, Default)]
pub struct ContributionCombiner {
    incoming: HashMap<NodeId, f64>,
    dangling_mass: f64,
}

impl ContributionCombiner {
    pub fn absorb(&mut self, node: &Node) {
        match node.contribution() {
            Some(share) => {
                for dst_id in node.out_links.iter() {
                    *self.incoming.entry(*dst_id).or_insert(0.0) += share;
                }
            }
            None => self.dangling_mass += node.rank,
        }
    }

    /// One `Mass` per destination, then the partial dangling sum when `track_dangling`.
    pub fn flush(self, track_dangling: bool) -> impl Iterator<Item = (ChannelKey, Message)> {
        let dangling = track_dangling
            .then_some((ChannelKey::DanglingMass, Message::Mass(self.dangling_mass)));
        self.incoming
            .into_iter()
            .map(|(dst_id, mass)| (ChannelKey::Node(dst_id), Message::Mass(mass)))
            .chain(dangling)
    }
}

/// Emits every node unchanged as a `NodeRecord`, followed by the combined contributions.
pub fn map_contributions<G: Scope>(
    node_stream: &Stream<G, Node>,
    track_dangling: bool,
) -> Stream<G, (ChannelKey, Message)> {
    node_stream.unary_frontier(
        Exchange::new(|node: &Node| node.id),
        "ContributionMapper",
        move |_capability, _info| {
            let mut node_stash = HashMap::new();

            move |node_input, output| {
                while let Some((time, data)) = node_input.next() {
                    node_stash
                        .entry(time.retain())
                        .or_insert(Vec::new())
                        .extend(data.replace(Vec::new()));
                }

                let frontier = node_input.frontier();

                for (time, nodes) in node_stash.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut session = output.session(time);
                        let mut combiner = ContributionCombiner::default();
                        for node in nodes.drain(..) {
                            combiner.absorb(&node);
                            session.give((ChannelKey::Node(node.id), Message::NodeRecord(node)));
                        }
                        for message in combiner.flush(track_dangling) {
                            session.give(message);
                        }
                    }
                }

                node_stash.retain(|_time, nodes| !nodes.is_empty());
            }
        },
    )
}

/// Sums the partial dangling masses on worker 0 and sends `total / n_nodes` to every id
/// in `[min_node_id, max_node_id]`, whether or not a node exists there.
pub fn redistribute_dangling_mass<G: Scope>(
    dangling_stream: &Stream<G, (ChannelKey, Message)>,
    n_nodes: u64,
    min_node_id: NodeId,
    max_node_id: NodeId,
) -> Stream<G, (ChannelKey, Message)> {
    dangling_stream.unary_frontier(
        Exchange::new(|(key, _message): &(ChannelKey, Message)| key.route()),
        "DanglingMassAggregator",
        move |_capability, _info| {
            let mut mass_stash = HashMap::new();

            move |mass_input, output| {
                while let Some((time, data)) = mass_input.next() {
                    mass_stash
                        .entry(time.retain())
                        .or_insert(Vec::new())
                        .extend(data.replace(Vec::new()));
                }

                let frontier = mass_input.frontier();

                for (time, partials) in mass_stash.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut dangling_mass = 0.0;
                        for (_key, message) in partials.drain(..) {
                            match message {
                                Message::Mass(mass) => dangling_mass += mass,
                                Message::NodeRecord(node) => {
                                    log::warn!("node {} sent on the dangling-mass key", node.id)
                                }
                            }
                        }
                        log::debug!(
                            "dangling mass {:.6} over ids {}..={}",
                            dangling_mass,
                            min_node_id,
                            max_node_id
                        );

                        let share = dangling_mass / n_nodes as f64;
                        let mut session = output.session(time);
                        for node_id in min_node_id..=max_node_id {
                            session.give((ChannelKey::Node(node_id), Message::Mass(share)));
                        }
                    }
                }

                mass_stash.retain(|_time, partials| !partials.is_empty());
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mass_of(messages: &[(ChannelKey, Message)], key: ChannelKey) -> Option<f64> {
        messages.iter().find_map(|(k, message)| match message {
            Message::Mass(mass) if *k == key => Some(*mass),
            _ => None,
        })
    }

    #[test]
    fn combines_shares_per_destination() {
        let mut combiner = ContributionCombiner::default();
        combiner.absorb(&Node::new(1, vec![2, 3], 0.4));
        combiner.absorb(&Node::new(4, vec![2], 0.1));
        combiner.absorb(&Node::dangling(5, 0.3));

        let messages = combiner.flush(true).collect::<Vec<_>>();
        assert_eq!(messages.len(), 3);
        assert!((mass_of(&messages, ChannelKey::Node(2)).unwrap() - 0.3).abs() < 1e-12);
        assert!((mass_of(&messages, ChannelKey::Node(3)).unwrap() - 0.2).abs() < 1e-12);
        assert!((mass_of(&messages, ChannelKey::DanglingMass).unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn dangling_partial_is_sent_even_when_zero() {
        let mut combiner = ContributionCombiner::default();
        combiner.absorb(&Node::new(1, vec![2], 1.0));
        let messages = combiner.flush(true).collect::<Vec<_>>();
        assert_eq!(mass_of(&messages, ChannelKey::DanglingMass), Some(0.0));
    }

    #[test]
    fn untracked_dangling_mass_is_not_sent() {
        let mut combiner = ContributionCombiner::default();
        combiner.absorb(&Node::dangling(1, 1.0));
        assert_eq!(combiner.flush(false).count(), 0);
    }
}
