//! # Bounded task runner and fan-out.
//!
//! [`run_async`] launches one [`Task`] on its own tokio task and immediately
//! returns a [`TaskResult`]. A driver task races the work against a timeout
//! window:
//!
//! ```text
//! run_async(scope, timeout, task)
//!   ├─► worker = spawn(task.spawn(child_token))      (never aborted by the runner)
//!   └─► driver loop:
//!         ├─ worker finished      ─► deliver(outcome)            ─► exit
//!         ├─ window #1 elapsed    ─► child_token.cancel()
//!         │                          deliver(Timeout)             ─► re-arm window
//!         ├─ window #n elapsed    ─► warn "still running"         ─► re-arm window
//!         └─ TaskResult dropped   ─► exit (worker left detached)
//! ```
//!
//! ## Rules
//! - The result channel holds two values: at most one advisory `Timeout`
//!   followed by the task's own outcome. Delivery never blocks.
//! - The **first** value read is authoritative for the caller
//!   ([`TaskResult::wait`]); [`TaskResult::outcome`] skips the advisory timeout
//!   and waits for the task's own result.
//! - A timeout does **not** stop the task. It cancels the task's child token;
//!   tasks that want to honor timeouts must observe it.
//! - Errors returned by the task are delivered verbatim; a panic becomes
//!   [`TaskError::Fatal`].
//! - `timeout = 0s` disables the race.
//! - Must be called from within a tokio runtime.
//!
//! [`run_all`] launches N tasks the same way and returns N results in input
//! order. Siblings are never cancelled when one of them fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::scope::Scope;
use crate::tasks::{Task, TaskRef};

/// Number of values a result channel can hold (advisory timeout + real outcome).
pub const RESULT_CAPACITY: usize = 2;

type Outcome = Result<(), TaskError>;

/// Receiving side of a task's result channel.
///
/// The runner is the only writer. Dropping the `TaskResult` abandons the task:
/// it keeps running, but nobody observes its outcome.
#[derive(Debug)]
pub struct TaskResult {
    name: String,
    rx: mpsc::Receiver<Outcome>,
}

impl TaskResult {
    /// Name of the task this result belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next delivered value.
    ///
    /// The first call returns the authoritative outcome: either the task's own
    /// result or an advisory [`TaskError::Timeout`]. Once the channel is drained
    /// and closed this returns [`TaskError::Canceled`].
    pub async fn wait(&mut self) -> Outcome {
        self.rx.recv().await.unwrap_or(Err(TaskError::Canceled))
    }

    /// Returns the next value if one is already delivered.
    pub fn try_wait(&mut self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }

    /// Waits for the task's own outcome, skipping an advisory timeout.
    ///
    /// Blocks for as long as the task runs. If the channel closes after a
    /// timeout without a real outcome, the timeout is returned.
    pub async fn outcome(mut self) -> Outcome {
        let mut timed_out = None;
        while let Some(res) = self.rx.recv().await {
            match res {
                Err(e @ TaskError::Timeout { .. }) => timed_out = Some(e),
                other => return other,
            }
        }
        Err(timed_out.unwrap_or(TaskError::Canceled))
    }
}

/// Launches `task` and returns its result channel without waiting.
///
/// The task receives a child token of `scope`; it is cancelled when the first
/// timeout window elapses or when the scope itself is cancelled.
pub fn run_async<T>(scope: &Scope, timeout: Duration, task: Arc<T>) -> TaskResult
where
    T: Task + ?Sized,
{
    let (tx, rx) = mpsc::channel(RESULT_CAPACITY);
    let name = task.name().to_string();
    let child = scope.child();

    let worker = tokio::spawn(child.instrument(task.spawn(child.token().clone())));
    tokio::spawn(child.instrument(drive(
        worker,
        tx,
        timeout,
        name.clone(),
        child.token().clone(),
    )));

    TaskResult { name, rx }
}

/// Launches every task via [`run_async`]; result `i` belongs to task `i`.
pub fn run_all<I>(scope: &Scope, timeout: Duration, tasks: I) -> Vec<TaskResult>
where
    I: IntoIterator<Item = TaskRef>,
{
    tasks
        .into_iter()
        .map(|task| run_async(scope, timeout, task))
        .collect()
}

/// Waits on every result concurrently and returns the first error by index.
///
/// Reads only the authoritative (first) value of each result.
pub async fn wait_all(mut results: Vec<TaskResult>) -> Outcome {
    let outcomes = futures::future::join_all(results.iter_mut().map(|r| r.wait())).await;
    match outcomes.into_iter().find_map(Result::err) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Races the worker against re-armed timeout windows and delivers outcomes.
async fn drive(
    mut worker: JoinHandle<Outcome>,
    tx: mpsc::Sender<Outcome>,
    timeout: Duration,
    name: String,
    token: CancellationToken,
) {
    if timeout.is_zero() {
        tokio::select! {
            res = &mut worker => deliver(&tx, &name, join_outcome(res)),
            _ = tx.closed() => debug!(task = %name, "result dropped; task abandoned"),
        }
        return;
    }

    let mut windows: u32 = 0;
    loop {
        tokio::select! {
            biased;
            res = &mut worker => {
                deliver(&tx, &name, join_outcome(res));
                return;
            }
            _ = time::sleep(timeout) => {
                windows = windows.saturating_add(1);
                if windows == 1 {
                    warn!(task = %name, ?timeout, "task timed out; signalling cancellation");
                    token.cancel();
                    deliver(&tx, &name, Err(TaskError::Timeout { timeout }));
                } else {
                    warn!(task = %name, ?timeout, windows, "task still running after timeout");
                }
            }
            _ = tx.closed() => {
                debug!(task = %name, "result dropped; task abandoned");
                return;
            }
        }
    }
}

fn deliver(tx: &mpsc::Sender<Outcome>, name: &str, res: Outcome) {
    if let Err(e) = tx.try_send(res) {
        debug!(task = %name, error = %e, "task outcome not delivered");
    }
}

fn join_outcome(res: Result<Outcome, JoinError>) -> Outcome {
    match res {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(TaskError::fatal(format!("task panicked: {e}"))),
        Err(_) => Err(TaskError::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::tasks::TaskFn;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn scope() -> Scope {
        Scope::root(&Logger::test())
    }

    #[tokio::test(start_paused = true)]
    async fn completes_before_timeout() {
        let task = TaskFn::arc("sleeper", |_ctx: CancellationToken| async {
            time::sleep(Duration::from_secs(1)).await;
            Ok(())
        });
        let started = time::Instant::now();
        let mut res = run_async(&scope(), TIMEOUT, task);

        assert_eq!(res.wait().await, Ok(()));
        assert!(started.elapsed() < TIMEOUT);
        assert_eq!(res.name(), "sleeper");
    }

    #[tokio::test(start_paused = true)]
    async fn error_is_delivered_verbatim() {
        let task = TaskFn::arc("broken", |_ctx: CancellationToken| async {
            Err(TaskError::fail("example error"))
        });
        let mut res = run_async(&scope(), TIMEOUT, task);
        assert_eq!(res.wait().await, Err(TaskError::fail("example error")));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_reports_timeout_first() {
        let task = TaskFn::arc("stuck", |_ctx: CancellationToken| async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let mut res = run_async(&scope(), TIMEOUT, task);
        assert_eq!(res.wait().await, Err(TaskError::Timeout { timeout: TIMEOUT }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_signals_the_task_token() {
        let task = TaskFn::arc("cooperative", |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err(TaskError::Canceled)
        });
        let mut res = run_async(&scope(), TIMEOUT, task);

        assert!(res.wait().await.unwrap_err().is_timeout());
        assert_eq!(res.wait().await, Err(TaskError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn real_outcome_follows_advisory_timeout() {
        let task = TaskFn::arc("stubborn", |_ctx: CancellationToken| async {
            time::sleep(Duration::from_secs(25)).await;
            Ok(())
        });
        let res = run_async(&scope(), TIMEOUT, task);
        assert_eq!(res.outcome().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn many_elapsed_windows_deliver_one_timeout_then_the_outcome() {
        let timeout = Duration::from_millis(10);
        let task = TaskFn::arc("long", |_ctx: CancellationToken| async {
            time::sleep(Duration::from_secs(2)).await;
            Ok(())
        });
        let mut res = run_async(&scope(), timeout, task);

        assert_eq!(res.wait().await, Err(TaskError::Timeout { timeout }));
        assert_eq!(res.wait().await, Ok(()));
        assert_eq!(res.try_wait(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_waits_for_completion() {
        let task = TaskFn::arc("slow", |_ctx: CancellationToken| async {
            time::sleep(Duration::from_secs(120)).await;
            Ok(())
        });
        let mut res = run_async(&scope(), Duration::ZERO, task);
        assert_eq!(res.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn panic_becomes_fatal() {
        let task = TaskFn::arc("panicky", |_ctx: CancellationToken| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let mut res = run_async(&scope(), TIMEOUT, task);
        let err = res.wait().await.unwrap_err();
        assert_eq!(err.as_label(), "task_fatal");
    }

    #[tokio::test]
    async fn launch_does_not_block() {
        let gate = Arc::new(AtomicBool::new(false));
        let seen = gate.clone();
        let task = TaskFn::arc("gated", move |_ctx: CancellationToken| {
            let seen = seen.clone();
            async move {
                while !seen.load(Ordering::SeqCst) {
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
        });

        let mut res = run_async(&scope(), TIMEOUT, task);
        assert!(res.try_wait().is_none());
        gate.store(true, Ordering::SeqCst);
        assert_eq!(res.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn fan_out_of_nothing_is_empty() {
        let results = run_all(&scope(), TIMEOUT, Vec::new());
        assert!(results.is_empty());
        assert_eq!(wait_all(results).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_keeps_input_order() {
        let tasks: Vec<TaskRef> = vec![
            TaskFn::arc("first", |_ctx: CancellationToken| async {
                time::sleep(Duration::from_secs(3)).await;
                Ok::<_, TaskError>(())
            }),
            TaskFn::arc("second", |_ctx: CancellationToken| async {
                Err::<(), _>(TaskError::fail("example error"))
            }),
            TaskFn::arc("third", |_ctx: CancellationToken| async {
                time::sleep(Duration::from_secs(1)).await;
                Ok::<_, TaskError>(())
            }),
        ];

        let mut results = run_all(&scope(), TIMEOUT, tasks);
        assert_eq!(results.len(), 3);
        let names: Vec<&str> = results.iter().map(TaskResult::name).collect();
        assert_eq!(names, ["first", "second", "third"]);

        assert_eq!(results[2].wait().await, Ok(()));
        assert_eq!(results[1].wait().await, Err(TaskError::fail("example error")));
        assert_eq!(results[0].wait().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_all_returns_first_error_by_index() {
        let tasks: Vec<TaskRef> = vec![
            TaskFn::arc("ok", |_ctx: CancellationToken| async { Ok::<_, TaskError>(()) }),
            TaskFn::arc("late", |_ctx: CancellationToken| async {
                time::sleep(Duration::from_secs(2)).await;
                Err::<(), _>(TaskError::fail("late"))
            }),
            TaskFn::arc("early", |_ctx: CancellationToken| async {
                Err::<(), _>(TaskError::fail("early"))
            }),
        ];
        let results = run_all(&scope(), TIMEOUT, tasks);
        assert_eq!(wait_all(results).await, Err(TaskError::fail("late")));
    }
}
