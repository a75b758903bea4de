//! Fixed worker pool running one stage at a time over contiguous id chunks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

use super::IdRange;
use crate::error::{CheckError, Result};

/// Piece of a stage's range handed to one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Ids this worker owns.
    pub range: IdRange,
    /// Position among the stage's chunks.
    pub index: usize,
    /// Whether this is the highest chunk of the stage.
    pub last: bool,
}

/// Runs stage tasks on a fixed rayon pool.
pub struct ParallelExecution {
    pool: ThreadPool,
    threads: usize,
}

impl ParallelExecution {
    /// Pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sombra-check-{i}"))
            .build()
            .map_err(|e| CheckError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, threads })
    }

    /// Worker count.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Splits `range` into `min(threads, len)` chunks and runs `task` on each, blocking
    /// until all finish. An empty range still runs one empty chunk so that per-stage work
    /// past the end of the store happens.
    ///
    /// Workers are never cancelled. The first failure to complete becomes the error's
    /// source and later ones are attached as suppressed.
    pub fn run<F>(&self, stage: &str, range: IdRange, task: F) -> Result<()>
    where
        F: Fn(Chunk) -> Result<()> + Sync,
    {
        let mut pieces = range.split(self.threads);
        if pieces.is_empty() {
            pieces.push(range);
        }
        let count = pieces.len();
        let started = Instant::now();
        let failures: Mutex<Vec<CheckError>> = Mutex::new(Vec::new());
        self.pool.scope(|scope| {
            for (index, piece) in pieces.into_iter().enumerate() {
                let task = &task;
                let failures = &failures;
                scope.spawn(move |_| {
                    let chunk = Chunk {
                        range: piece,
                        index,
                        last: index + 1 == count,
                    };
                    let chunk_started = Instant::now();
                    let failure = match panic::catch_unwind(AssertUnwindSafe(|| task(chunk))) {
                        Ok(Ok(())) => None,
                        Ok(Err(err)) => Some(err),
                        Err(payload) => Some(CheckError::WorkerPanic {
                            stage: stage.to_owned(),
                            message: panic_message(payload.as_ref()),
                        }),
                    };
                    trace!(
                        stage,
                        chunk = index,
                        range = %piece,
                        elapsed_us = chunk_started.elapsed().as_micros() as u64,
                        failed = failure.is_some(),
                        "chunk finished"
                    );
                    if let Some(err) = failure {
                        failures.lock().push(err);
                    }
                });
            }
        });
        debug!(
            stage,
            range = %range,
            chunks = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage finished"
        );
        match CheckError::stage(stage, failures.into_inner()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn every_id_visited_once() {
        let execution = ParallelExecution::new(4).expect("pool");
        let visited: Vec<AtomicU64> = (0..100).map(|_| AtomicU64::new(0)).collect();
        execution
            .run("visit", IdRange::new(0, 100), |chunk| {
                for id in chunk.range.start..chunk.range.end {
                    visited[id as usize].fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
            .expect("run");
        assert!(visited.iter().all(|v| v.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn only_highest_chunk_is_last() {
        let execution = ParallelExecution::new(3).expect("pool");
        let lasts = Mutex::new(Vec::new());
        execution
            .run("last", IdRange::new(0, 9), |chunk| {
                if chunk.last {
                    lasts.lock().push(chunk.range);
                }
                Ok(())
            })
            .expect("run");
        assert_eq!(lasts.into_inner(), vec![IdRange::new(6, 9)]);
    }

    #[test]
    fn empty_range_runs_one_empty_chunk() {
        let execution = ParallelExecution::new(2).expect("pool");
        let runs = AtomicU64::new(0);
        execution
            .run("empty", IdRange::new(0, 0), |chunk| {
                assert!(chunk.range.is_empty());
                assert!(chunk.last);
                runs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .expect("run");
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn failures_are_aggregated_without_cancelling() {
        let execution = ParallelExecution::new(4).expect("pool");
        let finished = AtomicU64::new(0);
        let err = execution
            .run("failing", IdRange::new(0, 4), |chunk| {
                finished.fetch_add(1, Ordering::Relaxed);
                if chunk.index % 2 == 0 {
                    Err(StoreError::unreadable("node", chunk.range.start, "boom").into())
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(finished.load(Ordering::Relaxed), 4);
        assert_eq!(err.suppressed().len(), 1);
        assert!(matches!(err.root_cause(), CheckError::Store(_)));
    }

    #[test]
    fn panics_become_errors() {
        let execution = ParallelExecution::new(2).expect("pool");
        let err = execution
            .run("panicking", IdRange::new(0, 2), |chunk| {
                if chunk.index == 1 {
                    panic!("worker exploded");
                }
                Ok(())
            })
            .unwrap_err();
        match err.root_cause() {
            CheckError::WorkerPanic { stage, message } => {
                assert_eq!(stage, "panicking");
                assert!(message.contains("exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
