//! Task queue: per-lane bounded channels, worker pools, retry and submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] stops the lanes from taking new tasks and
//! waits for the ones already running. Tasks still queued are dropped.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use techmd_core::models::{GenerationTask, Lane};
use techmd_core::{AppError, Config, TaskError};

use crate::context::TaskHandlerContext;
use crate::single_flight::{DruidGuard, DruidLocks};

/// Maximum delay before retrying a failed task. Caps exponential backoff
/// so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
#[inline]
pub(crate) fn retry_backoff(base: Duration, retry: u32) -> Duration {
    let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
        .min(Duration::from_secs(MAX_RETRY_BACKOFF_SECS))
}

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    pub default_lane_workers: usize,
    pub low_lane_workers: usize,
    /// Bound of each lane's channel.
    pub capacity: usize,
    /// Per attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            default_lane_workers: 4,
            low_lane_workers: 1,
            capacity: 1000,
            timeout: Duration::from_secs(3600),
            max_retries: 3,
            retry_base: Duration::from_secs(2),
        }
    }
}

impl TaskQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_lane_workers: config.task_default_lane_workers(),
            low_lane_workers: config.task_low_lane_workers(),
            capacity: config.task_queue_capacity(),
            timeout: config.task_timeout(),
            max_retries: config.task_max_retries(),
            ..Self::default()
        }
    }

    fn workers(&self, lane: Lane) -> usize {
        match lane {
            Lane::Default => self.default_lane_workers,
            Lane::Low => self.low_lane_workers,
        }
    }
}

pub struct TaskQueue {
    default_tx: mpsc::Sender<GenerationTask>,
    low_tx: mpsc::Sender<GenerationTask>,
    shutdown_tx: watch::Sender<bool>,
    lanes: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Create the queue and spawn one worker pool per lane. Must be called
    /// inside a Tokio runtime.
    pub fn new(config: TaskQueueConfig, context: Weak<dyn TaskHandlerContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let locks = DruidLocks::new();
        let capacity = config.capacity.max(1);

        let mut lanes = Vec::with_capacity(2);
        let mut spawn_lane = |lane: Lane| {
            let (tx, rx) = mpsc::channel(capacity);
            lanes.push(tokio::spawn(Self::lane_worker(
                lane,
                rx,
                config.clone(),
                context.clone(),
                locks.clone(),
                shutdown_rx.clone(),
            )));
            tx
        };
        let default_tx = spawn_lane(Lane::Default);
        let low_tx = spawn_lane(Lane::Low);

        Self {
            default_tx,
            low_tx,
            shutdown_tx,
            lanes: Mutex::new(lanes),
        }
    }

    /// Queue a task on its lane. Fails fast when the lane is full.
    #[tracing::instrument(skip(self, task), fields(task.id = %task.id, druid = %task.druid, lane = %task.lane))]
    pub fn submit(&self, task: GenerationTask) -> Result<Uuid, AppError> {
        let id = task.id;
        let lane = task.lane;
        let files = task.files.len();
        let tx = match lane {
            Lane::Default => &self.default_tx,
            Lane::Low => &self.low_tx,
        };

        match tx.try_send(task) {
            Ok(()) => {
                tracing::info!(task_id = %id, lane = %lane, files, "Task submitted to queue");
                Ok(id)
            }
            Err(TrySendError::Full(task)) => {
                tracing::warn!(task_id = %id, druid = %task.druid, lane = %lane, "Task queue is full");
                Err(AppError::QueueFull(format!("{} lane is at capacity", lane)))
            }
            Err(TrySendError::Closed(_)) => {
                Err(AppError::Internal("Task queue is shut down".to_string()))
            }
        }
    }

    /// Stop taking tasks and wait for running ones to finish.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            tracing::debug!("Task queue lanes already stopped");
        }
        let lanes = std::mem::take(&mut *self.lanes.lock().unwrap_or_else(|e| e.into_inner()));
        for lane in lanes {
            if let Err(e) = lane.await {
                tracing::error!(error = %e, "Task queue lane panicked");
            }
        }
        tracing::info!("Task queue stopped");
    }

    /// Hands each lane task to a worker once its druid is free. Tasks for a
    /// druid that is already running wait in `pending`, up to `capacity` of
    /// them, without holding a worker.
    async fn lane_worker(
        lane: Lane,
        mut rx: mpsc::Receiver<GenerationTask>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        locks: DruidLocks,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let workers = config.workers(lane);
        tracing::info!(lane = %lane, workers, capacity = config.capacity, "Task queue lane started");

        let semaphore = Arc::new(Semaphore::new(workers));
        let released = locks.released();
        let mut pending: VecDeque<GenerationTask> = VecDeque::new();
        let mut accepting = true;
        let mut running = JoinSet::new();

        'lane: loop {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                _ = shutdown_rx.changed() => break,
            };
            let Ok(permit) = permit else { break };

            let (task, guard) = loop {
                let notified = released.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(ready) = take_runnable(&mut pending, &locks) {
                    break ready;
                }
                if !accepting && pending.is_empty() {
                    break 'lane;
                }

                tokio::select! {
                    task = rx.recv(), if accepting && pending.len() < config.capacity.max(1) => match task {
                        Some(task) => pending.push_back(task),
                        None => accepting = false,
                    },
                    _ = &mut notified => {}
                    _ = shutdown_rx.changed() => break 'lane,
                }
            };

            let config = config.clone();
            let context = context.clone();
            let shutdown_rx = shutdown_rx.clone();
            running.spawn(async move {
                let _permit = permit;
                Self::process_task_with_retry(task, guard, config, context, shutdown_rx).await;
            });

            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(lane = %lane, error = %e, "Task panicked");
                }
            }
        }

        rx.close();
        let dropped = rx.len() + pending.len();
        if dropped > 0 {
            tracing::warn!(lane = %lane, dropped, "Queued tasks dropped at shutdown");
        }

        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                tracing::error!(lane = %lane, error = %e, "Task panicked");
            }
        }
        tracing::info!(lane = %lane, "Task queue lane stopped");
    }

    #[tracing::instrument(skip_all, fields(task.id = %task.id, druid = %task.druid, lane = %task.lane))]
    async fn process_task_with_retry(
        task: GenerationTask,
        _guard: DruidGuard,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut retry_count = 0;

        loop {
            let Some(ctx) = context.upgrade() else {
                tracing::error!(task_id = %task.id, "TaskHandlerContext was dropped, cannot process task");
                return;
            };

            let error = match tokio::time::timeout(config.timeout, ctx.clone().dispatch_task(&task)).await {
                Ok(Ok(_)) => {
                    tracing::info!(task_id = %task.id, retry_count, "Task completed successfully");
                    return;
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    let e = anyhow::anyhow!(
                        "Task timed out after {} seconds",
                        config.timeout.as_secs()
                    );
                    tracing::error!(task_id = %task.id, error = %e, "Task timed out");
                    ctx.task_failed(&task, &e).await;
                    return;
                }
            };

            let is_unrecoverable = error
                .downcast_ref::<TaskError>()
                .map(|te| !te.is_recoverable())
                .unwrap_or(false);

            tracing::error!(
                task_id = %task.id,
                error = %error,
                retry_count,
                max_retries = config.max_retries,
                unrecoverable = is_unrecoverable,
                "Task failed"
            );

            if is_unrecoverable || retry_count >= config.max_retries {
                ctx.task_failed(&task, &error).await;
                return;
            }

            let backoff = retry_backoff(config.retry_base, retry_count);
            retry_count += 1;
            tracing::info!(task_id = %task.id, retry_count, backoff_ms = backoff.as_millis() as u64, "Retrying task");
            drop(ctx);

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.changed() => {
                    tracing::warn!(task_id = %task.id, "Shutdown during retry backoff, giving up");
                    if let Some(ctx) = context.upgrade() {
                        ctx.task_failed(&task, &error).await;
                    }
                    return;
                }
            }
        }
    }
}

/// Removes the oldest pending task whose druid is free, with its lock.
/// A druid's tasks keep their submission order.
fn take_runnable(
    pending: &mut VecDeque<GenerationTask>,
    locks: &DruidLocks,
) -> Option<(GenerationTask, DruidGuard)> {
    let mut busy = HashSet::new();
    for index in 0..pending.len() {
        let druid = &pending[index].druid;
        if busy.contains(druid) {
            continue;
        }
        match locks.try_lock(druid) {
            Some(guard) => return pending.remove(index).map(|task| (task, guard)),
            None => {
                busy.insert(druid.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use techmd_core::models::GenerationFiles;
    use tokio::sync::{mpsc::UnboundedReceiver, Notify};

    const DRUID: &str = "druid:bc123df4567";
    const OTHER_DRUID: &str = "druid:gh123jk4567";

    #[derive(Debug, PartialEq)]
    enum Event {
        Started(String),
        Finished(String),
        Failed(String, String),
    }

    enum Outcome {
        Recoverable,
        Unrecoverable,
    }

    struct FakeContext {
        failures: Mutex<VecDeque<Outcome>>,
        attempts: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        gate: Option<(String, Arc<Notify>)>,
        events: mpsc::UnboundedSender<Event>,
    }

    impl FakeContext {
        fn new(delay: Duration) -> (Arc<Self>, UnboundedReceiver<Event>) {
            Self::build(delay, Vec::new(), None)
        }

        fn build(
            delay: Duration,
            failures: Vec<Outcome>,
            gate: Option<(String, Arc<Notify>)>,
        ) -> (Arc<Self>, UnboundedReceiver<Event>) {
            let (events, rx) = mpsc::unbounded_channel();
            let ctx = Self {
                failures: Mutex::new(failures.into()),
                attempts: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
                gate,
                events,
            };
            (Arc::new(ctx), rx)
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskHandlerContext for FakeContext {
        async fn dispatch_task(
            self: Arc<Self>,
            task: &GenerationTask,
        ) -> anyhow::Result<serde_json::Value> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _ = self.events.send(Event::Started(task.druid.clone()));

            if let Some((druid, gate)) = &self.gate {
                if *druid == task.druid {
                    gate.notified().await;
                }
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let failure = self.failures.lock().unwrap().pop_front();
            match failure {
                None => {
                    let _ = self.events.send(Event::Finished(task.druid.clone()));
                    Ok(serde_json::json!({ "druid": task.druid }))
                }
                Some(Outcome::Recoverable) => {
                    Err(TaskError::recoverable(anyhow::anyhow!("database unavailable")).into())
                }
                Some(Outcome::Unrecoverable) => {
                    Err(TaskError::unrecoverable(anyhow::anyhow!("files not found")).into())
                }
            }
        }

        async fn task_failed(self: Arc<Self>, task: &GenerationTask, error: &anyhow::Error) {
            let _ = self
                .events
                .send(Event::Failed(task.druid.clone(), error.to_string()));
        }
    }

    fn config() -> TaskQueueConfig {
        TaskQueueConfig {
            default_lane_workers: 2,
            low_lane_workers: 1,
            capacity: 10,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_base: Duration::from_millis(1),
        }
    }

    fn queue_for(ctx: &Arc<FakeContext>, config: TaskQueueConfig) -> TaskQueue {
        let ctx: Arc<dyn TaskHandlerContext> = ctx.clone();
        TaskQueue::new(config, Arc::downgrade(&ctx))
    }

    fn task(druid: &str, lane: Lane) -> GenerationTask {
        GenerationTask::new(druid, GenerationFiles::FilepathMap(Vec::new()), false, lane)
    }

    async fn next_event(rx: &mut UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for task event")
            .expect("event channel closed")
    }

    async fn next_terminal_event(rx: &mut UnboundedReceiver<Event>) -> Event {
        loop {
            match next_event(rx).await {
                Event::Started(_) => continue,
                event => return event,
            }
        }
    }

    #[test]
    fn test_retry_backoff_doubles_from_base() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_backoff(base, 0), Duration::from_secs(2));
        assert_eq!(retry_backoff(base, 1), Duration::from_secs(4));
        assert_eq!(retry_backoff(base, 2), Duration::from_secs(8));
        assert_eq!(retry_backoff(base, 7), Duration::from_secs(256));
    }

    #[test]
    fn test_retry_backoff_caps_at_max() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(MAX_RETRY_BACKOFF_SECS);
        assert_eq!(retry_backoff(base, 8), max);
        assert_eq!(retry_backoff(base, 40), max);
        assert_eq!(retry_backoff(base, u32::MAX), max);
    }

    #[test]
    fn test_default_config() {
        let config = TaskQueueConfig::default();
        assert_eq!(config.retry_base, Duration::from_secs(2));
        assert_eq!(config.workers(Lane::Default), 4);
        assert_eq!(config.workers(Lane::Low), 1);
    }

    #[tokio::test]
    async fn test_task_completes() {
        let (ctx, mut events) = FakeContext::new(Duration::ZERO);
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();

        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Finished(DRUID.to_string())
        );
        assert_eq!(ctx.attempts(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_recoverable_error_is_retried() {
        let (ctx, mut events) = FakeContext::build(
            Duration::ZERO,
            vec![Outcome::Recoverable, Outcome::Recoverable],
            None,
        );
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();

        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Finished(DRUID.to_string())
        );
        assert_eq!(ctx.attempts(), 3);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrecoverable_error_is_not_retried() {
        let (ctx, mut events) =
            FakeContext::build(Duration::ZERO, vec![Outcome::Unrecoverable], None);
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();

        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Failed(DRUID.to_string(), "files not found".to_string())
        );
        assert_eq!(ctx.attempts(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (ctx, mut events) = FakeContext::build(
            Duration::ZERO,
            vec![
                Outcome::Recoverable,
                Outcome::Recoverable,
                Outcome::Recoverable,
                Outcome::Recoverable,
            ],
            None,
        );
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();

        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Failed(DRUID.to_string(), "database unavailable".to_string())
        );
        assert_eq!(ctx.attempts(), 3);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_fails_without_retry() {
        let (ctx, mut events) = FakeContext::new(Duration::from_secs(10));
        let queue = queue_for(
            &ctx,
            TaskQueueConfig {
                timeout: Duration::from_millis(20),
                ..config()
            },
        );

        queue.submit(task(DRUID, Lane::Default)).unwrap();

        match next_terminal_event(&mut events).await {
            Event::Failed(druid, error) => {
                assert_eq!(druid, DRUID);
                assert!(error.contains("timed out"), "{error}");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(ctx.attempts(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_druid_runs_one_at_a_time() {
        let (ctx, mut events) = FakeContext::new(Duration::from_millis(30));
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        queue.submit(task(DRUID, Lane::Default)).unwrap();

        let mut finished = 0;
        while finished < 2 {
            if let Event::Finished(_) = next_event(&mut events).await {
                finished += 1;
            }
        }
        assert_eq!(ctx.max_in_flight.load(Ordering::SeqCst), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_backlog_for_busy_druid_does_not_hold_workers() {
        let gate = Arc::new(Notify::new());
        let (ctx, mut events) = FakeContext::build(
            Duration::ZERO,
            Vec::new(),
            Some((DRUID.to_string(), gate.clone())),
        );
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        assert_eq!(next_event(&mut events).await, Event::Started(DRUID.to_string()));

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        queue.submit(task(OTHER_DRUID, Lane::Default)).unwrap();
        assert_eq!(next_event(&mut events).await, Event::Started(OTHER_DRUID.to_string()));
        assert_eq!(next_event(&mut events).await, Event::Finished(OTHER_DRUID.to_string()));

        gate.notify_one();
        assert_eq!(next_event(&mut events).await, Event::Finished(DRUID.to_string()));
        assert_eq!(next_event(&mut events).await, Event::Started(DRUID.to_string()));
        gate.notify_one();
        assert_eq!(next_event(&mut events).await, Event::Finished(DRUID.to_string()));

        assert_eq!(ctx.attempts(), 3);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_take_runnable_keeps_druid_order() {
        let locks = DruidLocks::new();
        let first = task(DRUID, Lane::Default);
        let second = task(DRUID, Lane::Default);
        let other = task(OTHER_DRUID, Lane::Default);
        let (first_id, second_id, other_id) = (first.id, second.id, other.id);
        let mut pending = VecDeque::from([first, second, other]);

        let (task, guard) = take_runnable(&mut pending, &locks).unwrap();
        assert_eq!(task.id, first_id);

        let (task, _other_guard) = take_runnable(&mut pending, &locks).unwrap();
        assert_eq!(task.id, other_id);
        assert!(take_runnable(&mut pending, &locks).is_none());

        drop(guard);
        let (task, _guard) = take_runnable(&mut pending, &locks).unwrap();
        assert_eq!(task.id, second_id);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_different_druids_run_concurrently() {
        let (ctx, mut events) = FakeContext::new(Duration::from_millis(100));
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        queue.submit(task(OTHER_DRUID, Lane::Default)).unwrap();

        let mut finished = 0;
        while finished < 2 {
            if let Event::Finished(_) = next_event(&mut events).await {
                finished += 1;
            }
        }
        assert_eq!(ctx.max_in_flight.load(Ordering::SeqCst), 2);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_lane_rejects_submission() {
        let (ctx, _events) = FakeContext::new(Duration::ZERO);
        let queue = queue_for(
            &ctx,
            TaskQueueConfig {
                default_lane_workers: 0,
                capacity: 1,
                ..config()
            },
        );

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        let err = queue.submit(task(OTHER_DRUID, Lane::Default)).unwrap_err();
        assert!(matches!(err, AppError::QueueFull(_)));

        // Low lane has its own channel.
        queue.submit(task(OTHER_DRUID, Lane::Low)).unwrap();
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_low_lane_runs_while_default_is_busy() {
        let gate = Arc::new(Notify::new());
        let (ctx, mut events) = FakeContext::build(
            Duration::ZERO,
            Vec::new(),
            Some((DRUID.to_string(), gate.clone())),
        );
        let queue = queue_for(
            &ctx,
            TaskQueueConfig {
                default_lane_workers: 1,
                ..config()
            },
        );

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        assert_eq!(next_event(&mut events).await, Event::Started(DRUID.to_string()));

        queue.submit(task(OTHER_DRUID, Lane::Low)).unwrap();
        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Finished(OTHER_DRUID.to_string())
        );

        gate.notify_one();
        assert_eq!(
            next_terminal_event(&mut events).await,
            Event::Finished(DRUID.to_string())
        );
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_task() {
        let (ctx, mut events) = FakeContext::new(Duration::from_millis(50));
        let queue = queue_for(&ctx, config());

        queue.submit(task(DRUID, Lane::Default)).unwrap();
        assert_eq!(next_event(&mut events).await, Event::Started(DRUID.to_string()));

        queue.shutdown().await;
        assert_eq!(events.try_recv().unwrap(), Event::Finished(DRUID.to_string()));

        let err = queue.submit(task(DRUID, Lane::Default)).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
