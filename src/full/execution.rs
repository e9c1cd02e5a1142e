//! Task scheduling: strictly sequential, or a bounded pool of scoped workers.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use super::task::{CheckTask, RunContext};
use crate::config::ExecutionOrder;
use crate::error::{CheckError, Result};

fn run_guarded(task: &CheckTask, run: &RunContext<'_>) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| task.run(run))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => {
            error!(task = %task.name, error = %source, "full_check.task_failed");
            Err(CheckError::incomplete(task.name.clone(), source))
        }
        Err(_) => {
            error!(task = %task.name, "full_check.task_panicked");
            Err(CheckError::TaskPanicked {
                task: task.name.clone(),
            })
        }
    }
}

/// Runs `tasks` in the given order and stops at the first failure.
///
/// Dependencies always name earlier tasks, so list order satisfies them in
/// sequential mode. Multi-threaded mode launches any task whose dependencies
/// have finished; after a failure no further task is launched, running ones
/// complete, and the failure is returned.
pub fn execute(
    tasks: &[CheckTask],
    order: ExecutionOrder,
    workers: usize,
    run: &RunContext<'_>,
) -> Result<()> {
    match order {
        ExecutionOrder::Sequential => {
            for task in tasks {
                run_guarded(task, run)?;
            }
            Ok(())
        }
        ExecutionOrder::MultiThreaded => execute_concurrently(tasks, workers.max(1), run),
    }
}

struct Schedule {
    launched: Vec<bool>,
    done: Vec<bool>,
    failure: Option<CheckError>,
}

impl Schedule {
    fn next_ready(&self, tasks: &[CheckTask]) -> Option<usize> {
        (0..tasks.len()).find(|&pos| {
            !self.launched[pos] && tasks[pos].depends_on.iter().all(|dep| self.done[*dep])
        })
    }

    fn all_launched(&self) -> bool {
        self.launched.iter().all(|launched| *launched)
    }
}

fn execute_concurrently(tasks: &[CheckTask], workers: usize, run: &RunContext<'_>) -> Result<()> {
    let schedule = Mutex::new(Schedule {
        launched: vec![false; tasks.len()],
        done: vec![false; tasks.len()],
        failure: None,
    });
    let wake = Condvar::new();
    let workers = workers.min(tasks.len()).max(1);
    debug!(workers, tasks = tasks.len(), "full_check.pool_started");

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| worker(tasks, run, &schedule, &wake));
        }
    });

    match schedule.into_inner().failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn worker(tasks: &[CheckTask], run: &RunContext<'_>, schedule: &Mutex<Schedule>, wake: &Condvar) {
    let mut state = schedule.lock();
    loop {
        if state.failure.is_some() || state.all_launched() {
            return;
        }
        let Some(pos) = state.next_ready(tasks) else {
            wake.wait(&mut state);
            continue;
        };
        state.launched[pos] = true;
        drop(state);

        let outcome = run_guarded(&tasks[pos], run);

        state = schedule.lock();
        match outcome {
            Ok(()) => state.done[pos] = true,
            Err(err) => {
                if state.failure.is_none() {
                    state.failure = Some(err);
                }
            }
        }
        wake.notify_all();
    }
}
