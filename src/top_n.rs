use std::collections::HashMap;

use timely::dataflow::channels::pact::{Exchange, Pipeline};
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::{Scope, Stream};

use crate::rank_utils::{RankedEntry, TopK};

/// Global top `k` entries. Worker 0 emits one list, best first; other workers emit nothing.
pub fn select_top_n<G: Scope>(
    rank_stream: &Stream<G, RankedEntry>,
    k: usize,
) -> Stream<G, Vec<RankedEntry>> {
    let candidate_stream = rank_stream.unary_frontier(
        Pipeline,
        "LocalTopN",
        move |_capability, _info| {
            let mut selections = HashMap::new();

            move |rank_input, output| {
                while let Some((time, data)) = rank_input.next() {
                    selections
                        .entry(time.retain())
                        .or_insert_with(|| TopK::new(k))
                        .extend(data.replace(Vec::new()));
                }

                let frontier = rank_input.frontier();

                for (time, selection) in selections.iter_mut() {
                    if !frontier.less_equal(time) {
                        let mut session = output.session(time);
                        for entry in selection.drain_sorted() {
                            session.give(entry);
                        }
                    }
                }

                selections.retain(|time, _selection| frontier.less_equal(time));
            }
        },
    );

    candidate_stream.unary_frontier(
        Exchange::new(|_entry: &RankedEntry| 0),
        "GlobalTopN",
        move |_capability, _info| {
            let mut selections = HashMap::new();

            move |candidate_input, output| {
                while let Some((time, data)) = candidate_input.next() {
                    selections
                        .entry(time.retain())
                        .or_insert_with(|| TopK::new(k))
                        .extend(data.replace(Vec::new()));
                }

                let frontier = candidate_input.frontier();

                for (time, selection) in selections.iter_mut() {
                    if !frontier.less_equal(time) {
                        let top_ranks = selection.drain_sorted();
                        log::debug!("selected {} of the top {} ranks", top_ranks.len(), k);
                        output.session(time).give(top_ranks);
                    }
                }

                selections.retain(|time, _selection| frontier.less_equal(time));
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{materialize, run_job};
    use std::sync::Arc;

    fn top_n(ranks: Vec<(u64, f64)>, k: usize, workers: usize) -> Vec<Vec<(u64, f64)>> {
        let ranks = Arc::new(ranks);
        let guards = timely::execute(timely::Config::process(workers), move |worker| {
            let local = ranks
                .iter()
                .skip(worker.index())
                .step_by(worker.peers())
                .map(|&(id, rank)| RankedEntry::new(id, rank))
                .collect::<Vec<_>>();
            run_job(worker, "top-n", local, |entries, probe| {
                materialize(&select_top_n(entries, k), Pipeline, probe)
            })
            .take()
        })
        .unwrap();

        guards
            .join()
            .into_iter()
            .flat_map(|result| result.unwrap())
            .map(|list| list.into_iter().map(|e| (e.id, e.rank)).collect())
            .collect()
    }

    #[test]
    fn merges_local_candidates_into_one_list() {
        let ranks = vec![(1, 0.5), (2, 0.4), (3, 0.3), (4, 0.2), (5, 0.1)];
        assert_eq!(top_n(ranks.clone(), 2, 1), vec![vec![(1, 0.5), (2, 0.4)]]);
        assert_eq!(top_n(ranks, 2, 3), vec![vec![(1, 0.5), (2, 0.4)]]);
    }

    #[test]
    fn short_inputs_return_everything_sorted() {
        let ranks = vec![(7, 0.1), (3, 0.6), (5, 0.3)];
        assert_eq!(top_n(ranks, 10, 2), vec![vec![(3, 0.6), (5, 0.3), (7, 0.1)]]);
    }

    #[test]
    fn huge_bounds_do_not_preallocate() {
        let ranks = vec![(4, 0.2), (8, 0.8)];
        assert_eq!(top_n(ranks, usize::MAX, 2), vec![vec![(8, 0.8), (4, 0.2)]]);
    }
}
