//! Worker pools for partitioned runs.
//!
//! A pool executes a list of [`PartitionTask`]s with a shared executor and
//! returns the outcomes sorted by partition key, so callers see the same
//! order regardless of completion order. With `abort_on_error`, the first
//! failure stops workers from picking up further tasks; tasks already
//! running finish normally.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;

use sortkit_spec::{ExecutionRequest, SortError, SortResult, Sorting, WorkerPoolKind};

/// One partition scheduled on a pool.
#[derive(Debug, Clone)]
pub struct PartitionTask {
    pub key: String,
    pub request: ExecutionRequest,
}

/// Runs one partition to a sorting.
pub type PartitionExecutor = Arc<dyn Fn(&PartitionTask) -> SortResult<Sorting> + Send + Sync>;

/// Result of one executed partition.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub key: String,
    pub result: SortResult<Sorting>,
}

/// Runs `tasks` on the selected pool with at most `workers` in flight.
///
/// Partitions skipped after an abort have no outcome.
pub fn run_partitions(
    pool: WorkerPoolKind,
    workers: usize,
    tasks: Vec<PartitionTask>,
    executor: PartitionExecutor,
    abort_on_error: bool,
) -> SortResult<Vec<PartitionOutcome>> {
    let workers = workers.clamp(1, tasks.len().max(1));
    tracing::debug!(
        pool = pool.as_str(),
        workers,
        tasks = tasks.len(),
        "starting worker pool"
    );
    let mut outcomes = match pool {
        // Process workers are driven from threads; each task blocks on its
        // child process.
        WorkerPoolKind::Threads | WorkerPoolKind::Processes => {
            run_threads(workers, tasks, executor, abort_on_error)
        }
        WorkerPoolKind::Tokio => run_tokio(workers, tasks, executor, abort_on_error)?,
    };
    outcomes.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(outcomes)
}

/// Runs tasks one after another in the given order.
pub fn run_sequential(
    tasks: Vec<PartitionTask>,
    executor: PartitionExecutor,
    abort_on_error: bool,
) -> Vec<PartitionOutcome> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        let result = executor.as_ref()(&task);
        let failed = result.is_err();
        outcomes.push(PartitionOutcome {
            key: task.key,
            result,
        });
        if failed && abort_on_error {
            break;
        }
    }
    outcomes
}

fn run_threads(
    workers: usize,
    tasks: Vec<PartitionTask>,
    executor: PartitionExecutor,
    abort_on_error: bool,
) -> Vec<PartitionOutcome> {
    let queue = Mutex::new(VecDeque::from(tasks));
    let outcomes = Mutex::new(Vec::new());
    let abort = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(task) = next else {
                    break;
                };
                let result = executor.as_ref()(&task);
                if result.is_err() && abort_on_error {
                    abort.store(true, Ordering::SeqCst);
                }
                outcomes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(PartitionOutcome {
                        key: task.key,
                        result,
                    });
            });
        }
    });

    outcomes.into_inner().unwrap_or_else(PoisonError::into_inner)
}

fn run_tokio(
    workers: usize,
    tasks: Vec<PartitionTask>,
    executor: PartitionExecutor,
    abort_on_error: bool,
) -> SortResult<Vec<PartitionOutcome>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .max_blocking_threads(workers)
        .thread_name("sortkit-worker")
        .build()
        .map_err(|e| SortError::io(PathBuf::new(), e))?;

    runtime.block_on(async move {
        let semaphore = Arc::new(Semaphore::new(workers));
        let abort = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| SortError::execution("tokio", e.to_string()))?;
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let executor = Arc::clone(&executor);
            let abort = Arc::clone(&abort);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let result = executor.as_ref()(&task);
                if result.is_err() && abort_on_error {
                    abort.store(true, Ordering::SeqCst);
                }
                PartitionOutcome {
                    key: task.key,
                    result,
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| SortError::execution("tokio", e.to_string()))?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    })
}
