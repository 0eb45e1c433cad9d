//! Runs one stage graph as a self-contained dataflow.
//!
//! A job feeds the worker's local records in at time 0, steps the worker until every
//! probed stream has passed that time, and hands back whatever was materialized.
//! Because a job is finished before the next one is built, consecutive jobs are
//! separated by a hard barrier across all workers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use timely::communication::Allocate;
use timely::dataflow::channels::pact::ParallelizationContract;
use timely::dataflow::operators::generic::Operator;
use timely::dataflow::operators::Probe;
use timely::dataflow::scopes::Child;
use timely::dataflow::{InputHandle, ProbeHandle, Scope, Stream};
use timely::worker::Worker;
use timely::Data;

/// Records collected at the end of a job, on the worker that received them.
pub struct Materialized<D>(Rc<RefCell<Vec<D>>>);

impl<D> Materialized<D> {
    pub fn take(&self) -> Vec<D> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Collects `stream` into worker-local memory, routed by `pact`.
pub fn materialize<G, D, P>(
    stream: &Stream<G, D>,
    pact: P,
    probe: &mut ProbeHandle<G::Timestamp>,
) -> Materialized<D>
where
    G: Scope,
    D: Data,
    P: ParallelizationContract<G::Timestamp, D>,
{
    let store = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&store);

    let drained: Stream<G, ()> = stream.unary(pact, "Materialize", move |_capability, _info| {
        move |input, _output| {
            while let Some((_time, data)) = input.next() {
                sink.borrow_mut().extend(data.replace(Vec::new()));
            }
        }
    });
    drained.probe_with(probe);

    Materialized(store)
}

/// Builds a dataflow over `records`, runs it to completion, and returns what `build` produced.
pub fn run_job<A, D, R, F>(worker: &mut Worker<A>, name: &str, records: Vec<D>, build: F) -> R
where
    A: Allocate,
    D: Data,
    F: for<'a> FnOnce(&Stream<Child<'a, Worker<A>, usize>, D>, &mut ProbeHandle<usize>) -> R,
{
    let start_instant = Instant::now();
    let record_count = records.len();

    let mut input = InputHandle::new();
    let mut probe = ProbeHandle::new();

    let output = worker.dataflow::<usize, _, _>(|scope| {
        let stream = input.to_stream(scope);
        build(&stream, &mut probe)
    });

    for record in records {
        input.send(record);
    }
    input.advance_to(1);

    while probe.less_than(input.time()) {
        worker.step();
    }

    log::debug!(
        "worker {}: job {} consumed {} records in {}ms",
        worker.index(),
        name,
        record_count,
        start_instant.elapsed().as_millis()
    );
    output
}
