use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use crate::errors::TaskError;

type QueuedOperation = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct TaskQueueState {
    operations: VecDeque<QueuedOperation>,

    /// `true` while a drain loop owns this queue.
    is_processing: bool,
}

struct TaskQueueInner {
    name: String,

    state: Mutex<TaskQueueState>,

    /// Mirrors `TaskQueueState::is_processing`, updated in the same critical section.
    processing_tx: watch::Sender<bool>,
}

impl TaskQueueInner {
    fn lock_state(&self) -> MutexGuard<'_, TaskQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs caller-supplied asynchronous operations strictly one at a time, in submission order.
///
/// The queue never interprets what an operation does: it starts it, waits for it to settle
/// and hands the outcome back to whoever submitted it. A failing (or panicking) operation
/// only affects its own submitter, the next operation starts right after.
///
/// Handles are cheap to clone and all clones drive the same queue.
/// `add` spawns the drain loop, so it must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct SequentialTaskQueue {
    inner: Arc<TaskQueueInner>,
}

impl SequentialTaskQueue {
    pub fn new<S: Into<String>>(name: S) -> Self {
        let (processing_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(TaskQueueInner {
                name: name.into(),
                state: Mutex::new(TaskQueueState {
                    operations: VecDeque::new(),
                    is_processing: false,
                }),
                processing_tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue an operation. The returned [`QueuedTask`] settles exactly when the operation does.
    ///
    /// Dropping the returned task does not cancel the operation.
    pub fn add<F, Fut, T, E>(&self, operation: F) -> QueuedTask<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let queued_operation: QueuedOperation = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { operation().await })
                    .catch_unwind()
                    .await;

                let settled = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(TaskError::Failed(error)),
                    Err(_) => Err(TaskError::Panicked),
                };

                // The submitter is allowed to stop listening.
                let _ = result_tx.send(settled);
            }
            .boxed()
        });

        let should_start_draining = {
            let mut state = self.inner.lock_state();
            state.operations.push_back(queued_operation);

            if state.is_processing {
                false
            } else {
                state.is_processing = true;
                self.inner.processing_tx.send_replace(true);
                true
            }
        };

        if should_start_draining {
            tokio::spawn(Self::drain(self.inner.clone()));
        } else {
            trace!(queue = self.inner.name, "Operation queued behind an active drain loop.");
        }

        QueuedTask { receiver: result_rx }
    }

    /// Number of operations waiting to start (the one currently running is not counted).
    pub fn len(&self) -> usize {
        self.inner.lock_state().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock_state().is_processing
    }

    /// Resolves once no drain loop is active. Returns immediately on an idle queue.
    pub async fn wait_until_idle(&self) {
        let mut processing_rx = self.inner.processing_tx.subscribe();

        // The sender lives as long as `self.inner`, which we are holding.
        let _ = processing_rx
            .wait_for(|is_processing| !*is_processing)
            .await;
    }

    async fn drain(inner: Arc<TaskQueueInner>) {
        debug!(queue = inner.name, "Started draining queue.");

        let mut settled_operations: usize = 0;

        loop {
            let next_operation = {
                let mut state = inner.lock_state();

                match state.operations.pop_front() {
                    Some(operation) => operation,
                    None => {
                        state.is_processing = false;
                        inner.processing_tx.send_replace(false);
                        break;
                    }
                }
            };

            // Panics are caught inside the operation wrapper and reported to its submitter.
            next_operation().await;
            settled_operations += 1;
        }

        debug!(
            queue = inner.name,
            settled_operations = settled_operations,
            "Queue drained, going idle."
        );
    }
}


/// Deferred result of an operation submitted through [`SequentialTaskQueue::add`].
#[must_use = "dropping a QueuedTask discards the result, the operation still runs"]
pub struct QueuedTask<T, E> {
    receiver: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> Future for QueuedTask<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| match received {
                Ok(settled) => settled,
                // The drain task was torn down mid-operation.
                Err(_) => Err(TaskError::Dropped),
            })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;
    use tokio::time::{sleep, Instant};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn operations_never_overlap_and_run_in_submission_order() {
        let queue = SequentialTaskQueue::new("test");
        let spans: Arc<Mutex<Vec<(usize, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        // Earlier operations take longer, so any overlap would reorder completions.
        let tasks: Vec<_> = (0..5usize)
            .map(|index| {
                let spans = spans.clone();
                queue.add(move || async move {
                    let started = Instant::now();
                    sleep(Duration::from_millis(50 * (5 - index as u64))).await;
                    spans.lock().unwrap().push((index, started, Instant::now()));
                    Ok::<_, ()>(index)
                })
            })
            .collect();

        let results = join_all(tasks).await;
        assert_eq!(
            results.into_iter().map(|result| result.unwrap()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );

        let spans = spans.lock().unwrap();
        let order: Vec<usize> = spans.iter().map(|(index, _, _)| *index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        for pair in spans.windows(2) {
            let (_, _, previous_end) = pair[0];
            let (_, next_start, _) = pair[1];
            assert!(next_start >= previous_end, "operations overlapped");
        }
    }

    #[tokio::test]
    async fn failing_operation_does_not_affect_its_neighbours() {
        let queue = SequentialTaskQueue::new("test");

        let first = queue.add(|| async { Ok::<_, String>("first") });
        let second = queue.add(|| async { Err::<&str, _>("broken image".to_string()) });
        let third = queue.add(|| async { Ok::<_, String>("third") });

        assert_eq!(first.await.unwrap(), "first");
        match second.await {
            Err(TaskError::Failed(reason)) => assert_eq!(reason, "broken image"),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
        assert_eq!(third.await.unwrap(), "third");
    }

    #[tokio::test]
    async fn panicking_operation_is_reported_and_queue_keeps_going() {
        let queue = SequentialTaskQueue::new("test");

        let panicking = queue.add(|| async {
            if true {
                panic!("decoder exploded");
            }
            Ok::<(), ()>(())
        });
        let after = queue.add(|| async { Ok::<_, ()>(7) });

        assert!(matches!(panicking.await, Err(TaskError::Panicked)));
        assert_eq!(after.await.unwrap(), 7);

        queue.wait_until_idle().await;
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn idle_queue_restarts_draining_on_new_work() {
        let queue = SequentialTaskQueue::new("test");
        assert!(!queue.is_processing());

        queue.add(|| async { Ok::<_, ()>(()) }).await.unwrap();
        queue.wait_until_idle().await;
        assert!(!queue.is_processing());
        assert!(queue.is_empty());

        let value = queue.add(|| async { Ok::<_, ()>("again") }).await.unwrap();
        assert_eq!(value, "again");

        queue.wait_until_idle().await;
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn dropped_task_handle_still_runs_the_operation() {
        let queue = SequentialTaskQueue::new("test");
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let runs = runs.clone();
            let _ = queue.add(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            });
        }

        queue.wait_until_idle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_pending_work_while_an_operation_is_running() {
        let queue = SequentialTaskQueue::new("test");
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocked = queue.add(move || async move {
            let _ = release_rx.await;
            Ok::<_, ()>(())
        });
        let waiting = queue.add(|| async { Ok::<_, ()>(()) });

        assert!(queue.is_processing());
        // Let the drain loop pick up the first operation.
        tokio::task::yield_now().await;
        assert_eq!(queue.len(), 1);

        release_tx.send(()).unwrap();
        blocked.await.unwrap();
        waiting.await.unwrap();

        queue.wait_until_idle().await;
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn task_reports_dropped_when_the_runtime_shuts_down() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let task = runtime.block_on(async {
            let queue = SequentialTaskQueue::new("test");
            let task = queue.add(|| futures_util::future::pending::<Result<(), ()>>());

            // Let the drain loop start the never-settling operation.
            tokio::task::yield_now().await;
            task
        });

        drop(runtime);

        assert!(matches!(task.now_or_never(), Some(Err(TaskError::Dropped))));
    }
}
