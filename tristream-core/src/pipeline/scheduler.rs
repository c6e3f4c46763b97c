//! Worker spawning, fan-out and merge.
//!
//! Every stage instance runs on its own named thread and talks to its
//! neighbours only through bounded `crossbeam_channel` queues. A stream is a
//! [`Receiver`]; it completes when every [`Sender`] feeding it has been
//! dropped, which happens both when a worker returns and when it unwinds from
//! a panic. No stage can therefore leave its consumer waiting on a dead
//! producer.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Select, Sender};
use tracing::{debug, warn};
use tristream_types::PipelineError;

/// Stack size for worker threads. Stages keep their state on the heap.
const WORKER_STACK_SIZE: usize = 256 * 1024;

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Spawns pipeline stages and keeps track of their threads.
pub struct Scheduler {
    capacity: usize,
    workers: Vec<Worker>,
}

impl Scheduler {
    /// Creates a scheduler whose queues hold at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            workers: Vec::new(),
        }
    }

    /// Number of workers spawned so far.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Runs `body` on a new worker thread and returns the stream it feeds.
    ///
    /// The stream completes when `body` returns (or panics) and drops its sender.
    ///
    /// # Errors
    /// Returns [`PipelineError::Spawn`] if the thread cannot be created.
    pub fn spawn<T, F>(&mut self, stage: &str, body: F) -> Result<Receiver<T>, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(Sender<T>) + Send + 'static,
    {
        let (tx, rx) = bounded(self.capacity);
        let name = format!("tristream-{stage}-{}", self.workers.len());

        let handle = thread::Builder::new()
            .name(name.clone())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || body(tx))
            .map_err(|source| PipelineError::Spawn {
                worker: name.clone(),
                source,
            })?;

        self.workers.push(Worker { name, handle });
        Ok(rx)
    }

    /// Builds `width` parallel copies of a stage.
    ///
    /// `build` is called once per replica with the replica index. Replicas that
    /// read from a shared predecessor should each hold a clone of the same
    /// [`Receiver`]: every item is then delivered to exactly one of them.
    ///
    /// # Errors
    /// Stops at and returns the first error from `build`.
    pub fn fan_out<T, F>(
        &mut self,
        width: usize,
        mut build: F,
    ) -> Result<Vec<Receiver<T>>, PipelineError>
    where
        F: FnMut(&mut Self, usize) -> Result<Receiver<T>, PipelineError>,
    {
        let mut outputs = Vec::with_capacity(width);
        for replica in 0..width {
            outputs.push(build(self, replica)?);
        }
        Ok(outputs)
    }

    /// Combines `inputs` into one stream.
    ///
    /// Every item of every input is forwarded exactly once, in arrival order.
    /// The merged stream completes once all inputs have completed. If its own
    /// consumer disconnects, the merge stops and drops its inputs so that
    /// upstream producers see the disconnect too.
    ///
    /// # Errors
    /// Returns [`PipelineError::Spawn`] if the merge thread cannot be created.
    pub fn merge<T>(
        &mut self,
        mut inputs: Vec<Receiver<T>>,
    ) -> Result<Receiver<T>, PipelineError>
    where
        T: Send + 'static,
    {
        match inputs.len() {
            0 => {
                let (_, rx) = bounded(0);
                return Ok(rx);
            }
            1 => return Ok(inputs.remove(0)),
            _ => {}
        }

        self.spawn("merge", move |tx| forward_all(&inputs, &tx))
    }

    /// Waits for every spawned worker.
    ///
    /// Only call this once every stream has been drained; a worker blocked on
    /// a full queue would otherwise never finish.
    ///
    /// # Errors
    /// Returns [`PipelineError::WorkerPanicked`] naming the first worker that panicked.
    pub fn join(self) -> Result<(), PipelineError> {
        let mut first_panic = None;

        for worker in self.workers {
            if worker.handle.join().is_err() {
                warn!(worker = %worker.name, "worker panicked");
                first_panic.get_or_insert(worker.name);
            }
        }

        match first_panic {
            Some(worker) => Err(PipelineError::WorkerPanicked { worker }),
            None => Ok(()),
        }
    }
}

fn forward_all<T>(inputs: &[Receiver<T>], tx: &Sender<T>) {
    let mut select = Select::new();
    for input in inputs {
        select.recv(input);
    }

    let mut live = inputs.len();
    let mut forwarded = 0u64;

    while live > 0 {
        let oper = select.select();
        let index = oper.index();
        match oper.recv(&inputs[index]) {
            Ok(item) => {
                if tx.send(item).is_err() {
                    debug!(forwarded, "merge consumer disconnected");
                    return;
                }
                forwarded += 1;
            }
            Err(_) => {
                select.remove(index);
                live -= 1;
            }
        }
    }

    debug!(inputs = inputs.len(), forwarded, "merge complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn producer(scheduler: &mut Scheduler, items: Vec<u32>) -> Receiver<u32> {
        scheduler
            .spawn("produce", move |tx| {
                for item in items {
                    if tx.send(item).is_err() {
                        return;
                    }
                }
            })
            .unwrap()
    }

    #[test]
    fn spawn_stream_completes_when_worker_returns() {
        let mut scheduler = Scheduler::new(4);
        let rx = producer(&mut scheduler, vec![1, 2, 3]);

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(scheduler.workers(), 1);
        scheduler.join().unwrap();
    }

    #[test]
    fn merge_yields_every_item_once() {
        let mut scheduler = Scheduler::new(2);
        let inputs: Vec<_> = (0..5u32)
            .map(|s| producer(&mut scheduler, (s * 100..s * 100 + 50).collect()))
            .collect();

        let merged = scheduler.merge(inputs).unwrap();
        let mut seen: Vec<u32> = merged.iter().collect();
        seen.sort_unstable();

        let mut expected: Vec<u32> = (0..5u32).flat_map(|s| s * 100..s * 100 + 50).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
        scheduler.join().unwrap();
    }

    #[test]
    fn merge_preserves_order_within_one_input() {
        let mut scheduler = Scheduler::new(1);
        let a = producer(&mut scheduler, (0..200).collect());
        let b = producer(&mut scheduler, (1000..1200).collect());

        let merged: Vec<u32> = scheduler.merge(vec![a, b]).unwrap().iter().collect();
        let from_a: Vec<u32> = merged.iter().copied().filter(|&x| x < 1000).collect();
        let from_b: Vec<u32> = merged.iter().copied().filter(|&x| x >= 1000).collect();

        assert_eq!(from_a, (0..200).collect::<Vec<_>>());
        assert_eq!(from_b, (1000..1200).collect::<Vec<_>>());
    }

    #[test]
    fn merge_of_nothing_is_complete() {
        let mut scheduler = Scheduler::new(4);
        let merged = scheduler.merge(Vec::<Receiver<u32>>::new()).unwrap();
        assert!(merged.recv().is_err());
        assert_eq!(scheduler.workers(), 0);
    }

    #[test]
    fn merge_of_one_is_passthrough() {
        let mut scheduler = Scheduler::new(4);
        let rx = producer(&mut scheduler, vec![7, 8]);
        let merged = scheduler.merge(vec![rx]).unwrap();

        assert_eq!(merged.iter().collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(scheduler.workers(), 1);
    }

    #[test]
    fn merge_with_rendezvous_queues() {
        let mut scheduler = Scheduler::new(0);
        let inputs: Vec<_> = (0..3u32)
            .map(|s| producer(&mut scheduler, vec![s; 20]))
            .collect();

        let merged = scheduler.merge(inputs).unwrap();
        assert_eq!(merged.iter().count(), 60);
        scheduler.join().unwrap();
    }

    #[test]
    fn merge_completes_when_a_producer_panics() {
        let mut scheduler = Scheduler::new(4);
        let ok = producer(&mut scheduler, vec![1, 2]);
        let dead: Receiver<u32> = scheduler
            .spawn("dead", |tx| {
                tx.send(99).unwrap();
                panic!("producer failed");
            })
            .unwrap();

        let mut seen: Vec<u32> = scheduler.merge(vec![ok, dead]).unwrap().iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 99]);

        match scheduler.join() {
            Err(PipelineError::WorkerPanicked { worker }) => assert!(worker.contains("dead")),
            other => panic!("expected WorkerPanicked, got {other:?}"),
        }
    }

    #[test]
    fn merge_stops_when_consumer_leaves() {
        let mut scheduler = Scheduler::new(1);
        let endless: Receiver<u32> = scheduler
            .spawn("endless", |tx| while tx.send(1).is_ok() {})
            .unwrap();
        let other = producer(&mut scheduler, vec![2]);

        let merged = scheduler.merge(vec![endless, other]).unwrap();
        assert!(merged.recv().is_ok());
        drop(merged);

        // Every worker exits once the disconnect has travelled upstream.
        scheduler.join().unwrap();
    }

    #[test]
    fn fan_out_delivers_each_item_to_one_replica() {
        let mut scheduler = Scheduler::new(8);
        let source = producer(&mut scheduler, (0..1000).collect());

        let replicas = scheduler
            .fan_out(6, |s, replica| {
                let input = source.clone();
                s.spawn("double", move |tx| {
                    for item in input {
                        if tx.send((replica, item * 2)).is_err() {
                            return;
                        }
                    }
                })
            })
            .unwrap();
        drop(source);
        assert_eq!(replicas.len(), 6);

        let merged = scheduler.merge(replicas).unwrap();
        let results: Vec<(usize, u32)> = merged.iter().collect();

        let values: HashSet<u32> = results.iter().map(|&(_, v)| v).collect();
        assert_eq!(results.len(), 1000);
        assert_eq!(values, (0..1000).map(|x| x * 2).collect::<HashSet<u32>>());
        assert!(results.iter().all(|&(r, _)| r < 6));
        scheduler.join().unwrap();
    }

    #[test]
    fn fan_out_stops_at_first_build_error() {
        let mut scheduler = Scheduler::new(1);
        let mut calls = 0;
        let result = scheduler.fan_out::<u32, _>(5, |_, replica| {
            calls += 1;
            if replica == 2 {
                Err(PipelineError::InvalidConfig {
                    field: "fan_out",
                    reason: "test",
                })
            } else {
                let (_, rx) = bounded(0);
                Ok(rx)
            }
        });

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn worker_threads_are_named() {
        let mut scheduler = Scheduler::new(1);
        let rx = scheduler
            .spawn("probe", |tx| {
                let name = thread::current().name().map(str::to_owned);
                let _ = tx.send(name);
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("tristream-probe-0"));
    }
}
