//! Bounded-concurrency worker pool for prover jobs.
//!
//! A fixed set of workers drains an unbounded job channel and reports back
//! to the coordinating thread over a second channel. Results are returned
//! in submission order whatever order the jobs finish in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, trace};

use super::config::PoolConfig;

/// Message sent from workers to the coordinator.
#[derive(Debug)]
enum PoolMessage<R> {
    Started { worker_id: usize, job: usize },
    Finished { worker_id: usize, job: usize, result: R },
}

/// Tracks how many jobs are running and the most that ever ran at once.
#[derive(Debug, Default)]
pub struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    /// Mark a job as started. Returns the number now active.
    pub fn enter(&self) -> usize {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let mut peak = self.peak.load(Ordering::SeqCst);
        while now > peak {
            match self
                .peak
                .compare_exchange_weak(peak, now, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        now
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Results of a pool execution
#[derive(Debug)]
pub struct PoolReport<R> {
    /// One result per job, in submission order
    pub results: Vec<R>,
    pub peak_active: usize,
    pub elapsed: Duration,
}

pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Run `work` on every job with at most `max_concurrency` running at once.
    pub fn execute<J, R, F>(&self, jobs: Vec<J>, work: F) -> PoolReport<R>
    where
        J: Send,
        R: Send,
        F: Fn(usize, J) -> R + Sync,
    {
        let start = Instant::now();
        let total = jobs.len();
        let num_workers = self.config.max_concurrency.max(1).min(total);
        let gauge = ActivityGauge::default();
        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();

        let (job_tx, job_rx) = unbounded();
        for job in jobs.into_iter().enumerate() {
            // the receiver is alive until the end of this function
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            let (msg_tx, msg_rx) = unbounded();
            for worker_id in 0..num_workers {
                let job_rx = job_rx.clone();
                let msg_tx = msg_tx.clone();
                let gauge = &gauge;
                let work = &work;
                scope.spawn(move || run_worker(worker_id, job_rx, msg_tx, gauge, work));
            }
            drop(msg_tx);

            for message in msg_rx {
                match message {
                    PoolMessage::Started { worker_id, job } => {
                        trace!(worker_id, job, "Job started");
                    }
                    PoolMessage::Finished {
                        worker_id,
                        job,
                        result,
                    } => {
                        trace!(worker_id, job, "Job finished");
                        slots[job] = Some(result);
                    }
                }
            }
        });

        let peak_active = gauge.peak();
        debug!(
            jobs = total,
            workers = num_workers,
            peak_active,
            "Worker pool drained"
        );
        PoolReport {
            results: slots.into_iter().flatten().collect(),
            peak_active,
            elapsed: start.elapsed(),
        }
    }
}

fn run_worker<J, R, F>(
    worker_id: usize,
    jobs: Receiver<(usize, J)>,
    messages: Sender<PoolMessage<R>>,
    gauge: &ActivityGauge,
    work: &F,
) where
    F: Fn(usize, J) -> R,
{
    for (job, input) in jobs {
        gauge.enter();
        let _ = messages.send(PoolMessage::Started { worker_id, job });
        let result = work(job, input);
        gauge.exit();
        let _ = messages.send(PoolMessage::Finished {
            worker_id,
            job,
            result,
        });
    }
}
