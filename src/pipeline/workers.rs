use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of named worker threads draining a shared job channel.
/// Blocking capture and training run here so the orchestration thread's
/// select loop is never stalled.
pub struct WorkerPool {
    job_tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let rx: Receiver<Job> = job_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .map_err(|e| anyhow!("failed to spawn worker thread {i}: {e}"))?;
            handles.push(handle);
        }
        Ok(Self {
            job_tx: Some(job_tx),
            handles,
        })
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.job_tx {
            if tx.send(Box::new(job)).is_err() {
                log::error!("worker pool is shut down, dropping job");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain outstanding jobs and exit.
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn jobs_run_on_worker_threads() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, rx) = bounded(4);
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                let _ = tx.send(i);
            });
        }
        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn drop_waits_for_outstanding_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = bounded(1);
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = tx.send(());
        });
        drop(pool);
        assert!(rx.try_recv().is_ok());
    }
}
