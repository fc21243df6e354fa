use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{PionError, Result};

/// This struct manages compute for a grid scan on this node.
pub struct Balancer {
    pub workers: usize,
    pool: ThreadPool,
}

impl Balancer {
    /// Constructs a new `Balancer` that leaves `reduce` cores idle.
    pub fn new(reduce: usize) -> Result<Self> {
        // Set equal to available_parallelism minus reduce (user input), but never zero.
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = available.saturating_sub(reduce).max(1);
        Self::with_workers(workers)
    }

    pub fn with_workers(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| {
                log::error!("failed to build worker pool: {e}");
                PionError::InvalidParameter {
                    name: "workers",
                    value: workers as f64,
                }
            })?;

        log::info!("--------- Balancer Activated ---------");
        log::info!(" Workers : {workers} ");
        log::info!("--------------------------------------");
        Ok(Balancer { workers, pool })
    }

    /// Runs `f` on every item, in parallel, keeping the input order in the output.
    /// A progress bar is shown when `progress` is set.
    pub fn scan<I, T, F>(&self, items: &[I], progress: bool, f: F) -> Vec<T>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync + Send,
    {
        let bar = if progress {
            let bar = ProgressBar::new(items.len() as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} ({eta})")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let results = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let result = f(item);
                    bar.inc(1);
                    result
                })
                .collect()
        });
        bar.finish();
        results
    }
}

#[test]
fn test_scan_keeps_order() {
    let balancer = Balancer::with_workers(3).unwrap();
    let items: Vec<usize> = (0..100).collect();
    let squares = balancer.scan(&items, false, |&i| i * i);
    assert_eq!(squares, items.iter().map(|i| i * i).collect::<Vec<_>>());
}

#[test]
fn test_reduce_never_leaves_zero_workers() {
    let balancer = Balancer::new(usize::MAX).unwrap();
    assert_eq!(balancer.workers, 1);
}
