//! Turns a raw edge list into the first node generation.
//!
//! Pass one groups edges by source and leaves a placeholder under every destination.
//! Pass two groups by id, so that an id seen only as a destination still becomes a
//! (dangling) node.

use std::collections::HashMap;

use timely::dataflow::channels::pact::Exchange;
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::{Scope, Stream};

use crate::records::{BuildRecord, Edge, Node, NodeId};

pub fn build_graph<G: Scope>(edge_stream: &Stream<G, Edge>, initial_rank: f64) -> Stream<G, Node> {
    reconcile_dangling(&group_adjacency(edge_stream, initial_rank), initial_rank)
}

/// Pass one: one adjacency node per source, one placeholder per edge destination.
pub fn group_adjacency<G: Scope>(
    edge_stream: &Stream<G, Edge>,
    initial_rank: f64,
) -> Stream<G, (NodeId, BuildRecord)> {
    edge_stream.unary_frontier(
        Exchange::new(|&(src_id, _dst_id): &Edge| src_id),
        "AdjacencyGrouping",
        move |_capability, _info| {
            let mut edge_stash = HashMap::new();

            move |edge_input, output| {
                while let Some((time, data)) = edge_input.next() {
                    edge_stash
                        .entry(time.retain())
                        .or_insert(Vec::new())
                        .extend(data.replace(Vec::new()));
                }

                let frontier = edge_input.frontier();

                for (time, edges) in edge_stash.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut graph: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
                        for (src_id, dst_id) in edges.drain(..) {
                            graph.entry(src_id).or_insert(Vec::new()).push(dst_id);
                        }

                        let mut session = output.session(time);
                        for (src_id, out_links) in graph {
                            for dst_id in out_links.iter() {
                                session.give((*dst_id, BuildRecord::Placeholder));
                            }
                            let node = Node::new(src_id, out_links, initial_rank);
                            session.give((src_id, BuildRecord::Adjacency(node)));
                        }
                    }
                }

                edge_stash.retain(|_time, edges| !edges.is_empty());
            }
        },
    )
}

/// Pass two: prefer the real node for an id, otherwise make a dangling one.
pub fn reconcile_dangling<G: Scope>(
    build_stream: &Stream<G, (NodeId, BuildRecord)>,
    initial_rank: f64,
) -> Stream<G, Node> {
    build_stream.unary_frontier(
        Exchange::new(|(node_id, _record): &(NodeId, BuildRecord)| *node_id),
        "DanglingReconciliation",
        move |_capability, _info| {
            let mut record_stash = HashMap::new();

            move |record_input, output| {
                while let Some((time, data)) = record_input.next() {
                    record_stash
                        .entry(time.retain())
                        .or_insert(Vec::new())
                        .extend(data.replace(Vec::new()));
                }

                let frontier = record_input.frontier();

                for (time, records) in record_stash.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut nodes: HashMap<NodeId, Option<Node>> = HashMap::new();
                        for (node_id, record) in records.drain(..) {
                            let slot = nodes.entry(node_id).or_insert(None);
                            match record {
                                BuildRecord::Adjacency(node) => *slot = Some(node),
                                BuildRecord::Placeholder => {}
                            }
                        }

                        let mut session = output.session(time);
                        for (node_id, node) in nodes {
                            session.give(
                                node.unwrap_or_else(|| Node::dangling(node_id, initial_rank)),
                            );
                        }
                    }
                }

                record_stash.retain(|_time, records| !records.is_empty());
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{materialize, run_job};
    use std::sync::Arc;
    use timely::dataflow::channels::pact::Pipeline;

    fn build(edges: Vec<Edge>, workers: usize, initial_rank: f64) -> Vec<Node> {
        let edges = Arc::new(edges);
        let guards = timely::execute(timely::Config::process(workers), move |worker| {
            let local = edges
                .iter()
                .skip(worker.index())
                .step_by(worker.peers())
                .cloned()
                .collect::<Vec<_>>();
            run_job(worker, "build", local, |edges, probe| {
                materialize(&build_graph(edges, initial_rank), Pipeline, probe)
            })
            .take()
        })
        .unwrap();

        let mut nodes = guards
            .join()
            .into_iter()
            .flat_map(|result| result.unwrap())
            .collect::<Vec<_>>();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    #[test]
    fn destination_only_ids_become_dangling_nodes() {
        let nodes = build(vec![(1, 2), (1, 3), (3, 1)], 1, 1.0 / 3.0);
        assert_eq!(
            nodes,
            vec![
                Node::new(1, vec![2, 3], 1.0 / 3.0),
                Node::dangling(2, 1.0 / 3.0),
                Node::new(3, vec![1], 1.0 / 3.0),
            ]
        );
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let edges = vec![(5, 6), (6, 7), (5, 7), (7, 5), (8, 5)];
        assert_eq!(build(edges.clone(), 1, 0.25), build(edges, 1, 0.25));
    }

    #[test]
    fn partitioned_build_matches_single_worker() {
        let edges = vec![(1, 2), (2, 3), (3, 4), (4, 1), (1, 3), (2, 9), (10, 1)];
        let mut partitioned = build(edges.clone(), 3, 0.125);
        for node in partitioned.iter_mut() {
            node.out_links.sort();
        }
        let mut single = build(edges, 1, 0.125);
        for node in single.iter_mut() {
            node.out_links.sort();
        }
        assert_eq!(partitioned, single);
        assert_eq!(single.iter().filter(|node| node.is_dangling()).count(), 1);
    }

    #[test]
    fn self_loops_and_duplicate_edges_are_kept() {
        let nodes = build(vec![(1, 1), (1, 2), (1, 2)], 1, 0.5);
        assert_eq!(nodes[0], Node::new(1, vec![1, 2, 2], 0.5));
        assert_eq!(nodes[1], Node::dangling(2, 0.5));
    }
}
