//! A bounded pool of worker threads draining a task queue, awaited with a deadline.
//! Every task owns its result; results are only read once all of them arrived.
use crate::error::{AssemblyError, Result};
use crossbeam_channel::RecvTimeoutError;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TaskPool {
    threads: usize,
    timeout: Duration,
}

impl TaskPool {
    pub fn new(threads: usize, timeout: Duration) -> Self {
        Self {
            threads: threads.max(1),
            timeout,
        }
    }
    /// Run `work` over every task. Results keep the order of `tasks`.
    /// When the deadline passes or a task panics, the workers stop after their current task
    /// and no result is returned.
    pub fn run<T, R, F>(&self, tasks: Vec<T>, work: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let num_tasks = tasks.len();
        let (task_sender, task_receiver) = crossbeam_channel::unbounded();
        for task in tasks.into_iter().enumerate() {
            if task_sender.send(task).is_err() {
                unreachable!("The task queue is closed before the workers start");
            }
        }
        drop(task_sender);
        let (result_sender, result_receiver) = crossbeam_channel::unbounded();
        let expired = AtomicBool::new(false);
        let deadline = Instant::now() + self.timeout;
        std::thread::scope(|scope| {
            for _ in 0..self.threads.min(num_tasks.max(1)) {
                let (tasks, results) = (task_receiver.clone(), result_sender.clone());
                let (work, expired) = (&work, &expired);
                scope.spawn(move || {
                    while let Ok((idx, task)) = tasks.recv() {
                        if expired.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| work(task)));
                        if results.send((idx, outcome.ok())).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_sender);
            let mut results: Vec<Option<R>> = (0..num_tasks).map(|_| None).collect();
            let mut received = 0;
            while received < num_tasks {
                match result_receiver.recv_deadline(deadline) {
                    Ok((idx, Some(result))) => {
                        results[idx] = Some(result);
                        received += 1;
                    }
                    Ok((idx, None)) => {
                        expired.store(true, Ordering::Relaxed);
                        error!("POOL\tTask {} panicked", idx);
                        return Err(AssemblyError::WorkerPanic(idx));
                    }
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                        expired.store(true, Ordering::Relaxed);
                        let pending = num_tasks - received;
                        error!("POOL\t{} tasks did not finish in time", pending);
                        return Err(AssemblyError::PoolTimeout {
                            seconds: self.timeout.as_secs(),
                            pending,
                        });
                    }
                }
            }
            debug!("POOL\t{}\t{}", num_tasks, self.threads);
            Ok(results.into_iter().flatten().collect())
        })
    }
}
