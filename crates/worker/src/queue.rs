//! Serial job queue.
//!
//! Jobs run one at a time in arrival order. A single processor task pops the
//! head of the queue, makes it the active job and drives it through input
//! wait, execution, artifact delivery and a final status. The waiting list
//! and the active handle share one mutex that is never held across an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use audiobot_core::convert::Converter;
use audiobot_core::job::{Artifact, InputMedia, JobError, JobExecutor, JobSpec, MediaFile};
use audiobot_core::params::JobParams;
use audiobot_core::progress::{self, Progress};
use audiobot_core::scope::{CancelReason, ExecutionScope};
use audiobot_core::status::{
    error_status, STATUS_CANCELED, STATUS_DONE, STATUS_DOWNLOADED, STATUS_INPUT_REQUEST,
    STATUS_UPLOADING,
};
use audiobot_core::types::{ChatKind, MessageRef, Origin, TaskId, UserId};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::announcer::{self, Announcement, Announcer};
use crate::sink::{ArtifactSink, DeliveryFile, SinkError, StatusSink};
use crate::status::StatusMessage;
use crate::throttle::ProgressThrottle;
use crate::upload::deliver_with_retry;

/// Default per-job deadline.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on the wait for input media.
pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default progress interval in private chats.
pub const DEFAULT_PRIVATE_INTERVAL: Duration = Duration::from_millis(500);

/// Default progress interval in group chats.
pub const DEFAULT_GROUP_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub job_timeout: Duration,
    pub input_timeout: Duration,
    pub private_interval: Duration,
    pub group_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_timeout: DEFAULT_JOB_TIMEOUT,
            input_timeout: DEFAULT_INPUT_TIMEOUT,
            private_interval: DEFAULT_PRIVATE_INTERVAL,
            group_interval: DEFAULT_GROUP_INTERVAL,
        }
    }
}

impl QueueConfig {
    pub fn progress_interval(&self, kind: ChatKind) -> Duration {
        match kind {
            ChatKind::Private => self.private_interval,
            ChatKind::Group => self.group_interval,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no active job")]
    NoActiveJob,
}

/// What the queue is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Empty,
    WaitingForInput,
    Processing,
    /// The active job has its outcome; its final status is being sent
    /// before it is removed.
    Draining,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub phase: QueuePhase,
    pub active: Option<TaskId>,
    pub waiting: Vec<TaskId>,
}

#[derive(Debug)]
struct JobEntry {
    task_id: TaskId,
    origin: Origin,
    prompt: String,
    params: JobParams,
    announced_position: usize,
}

#[derive(Debug)]
struct ActiveJob {
    task_id: TaskId,
    user_id: UserId,
    scope: ExecutionScope,
    waiting_for_input: bool,
    input_tx: Option<oneshot::Sender<InputMedia>>,
    finished: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<JobEntry>,
    active: Option<ActiveJob>,
}

struct Inner<E> {
    state: Mutex<QueueState>,
    wakeup: Notify,
    config: QueueConfig,
    executor: E,
    converter: Converter,
    status_sink: Arc<dyn StatusSink>,
    artifacts: Arc<dyn ArtifactSink>,
    announcer: Announcer,
    shutdown: CancellationToken,
}

/// Handle to the job queue. Cheap to clone.
pub struct JobQueue<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for JobQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: JobExecutor> JobQueue<E> {
    /// Start the processor task. It runs until `shutdown` is canceled; the
    /// returned handle resolves once it has stopped.
    pub fn start(
        config: QueueConfig,
        executor: E,
        converter: Converter,
        status_sink: Arc<dyn StatusSink>,
        artifacts: Arc<dyn ArtifactSink>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            config,
            executor,
            converter,
            announcer: announcer::spawn(status_sink.clone()),
            status_sink,
            artifacts,
            shutdown,
        });

        let processor = Arc::clone(&inner);
        let handle = tokio::spawn(async move { processor.run().await });

        (Self { inner }, handle)
    }

    /// Append a job and return its id. If jobs are ahead of it, the origin
    /// message gets a position notice.
    pub fn enqueue(&self, origin: Origin, prompt: String, params: JobParams) -> TaskId {
        let task_id = TaskId::random();
        let kind = params.kind();
        {
            let mut state = self.inner.lock();
            let position = state.waiting.len() + usize::from(state.active.is_some());
            if position > 0 {
                self.inner.announce(task_id, origin.message(), position);
            }
            state.waiting.push_back(JobEntry {
                task_id,
                origin,
                prompt,
                params,
                announced_position: position,
            });
            tracing::info!(task_id = %task_id, kind = %kind, position, "Job queued");
        }
        self.inner.wakeup.notify_one();
        task_id
    }

    /// Hand input media to the active job. Accepted only while that job waits
    /// for input and only from the user who queued it.
    pub fn supply_input(&self, user_id: UserId, media: InputMedia) -> bool {
        let mut state = self.inner.lock();
        let Some(active) = state.active.as_mut() else {
            return false;
        };
        if active.user_id != user_id {
            return false;
        }
        match active.input_tx.take() {
            Some(tx) => tx.send(media).is_ok(),
            None => false,
        }
    }

    /// Cancel the active job.
    pub fn cancel_active(&self) -> Result<TaskId, QueueError> {
        let state = self.inner.lock();
        let active = state.active.as_ref().ok_or(QueueError::NoActiveJob)?;
        tracing::info!(task_id = %active.task_id, "Canceling active job");
        active.scope.cancel();
        Ok(active.task_id)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.lock();
        let phase = match &state.active {
            Some(active) if active.finished => QueuePhase::Draining,
            Some(active) if active.waiting_for_input => QueuePhase::WaitingForInput,
            Some(_) => QueuePhase::Processing,
            None => QueuePhase::Empty,
        };
        QueueSnapshot {
            phase,
            active: state.active.as_ref().map(|a| a.task_id),
            waiting: state.waiting.iter().map(|e| e.task_id).collect(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.inner.executor
    }
}

impl<E: JobExecutor> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, task_id: TaskId, reply_to: MessageRef, position: usize) {
        let _ = self.announcer.send(Announcement::Position {
            task_id,
            reply_to,
            position,
        });
    }

    async fn run(&self) {
        tracing::info!("Job queue started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.activate_next() {
                Some((entry, scope)) => {
                    self.process(&entry, &scope).await;
                    scope.close();
                    self.lock().active = None;
                }
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.wakeup.notified() => {}
                    }
                }
            }
        }

        tracing::info!("Job queue shutting down");
    }

    /// Pop the head of the queue, make it active and refresh the positions of
    /// everything behind it.
    fn activate_next(&self) -> Option<(JobEntry, ExecutionScope)> {
        let mut state = self.lock();
        let entry = state.waiting.pop_front()?;
        let scope = ExecutionScope::with_deadline(&self.shutdown, self.config.job_timeout);
        state.active = Some(ActiveJob {
            task_id: entry.task_id,
            user_id: entry.origin.user_id,
            scope: scope.clone(),
            waiting_for_input: false,
            input_tx: None,
            finished: false,
        });

        for (ahead, waiting) in state.waiting.iter_mut().enumerate() {
            let position = ahead + 1;
            if position != waiting.announced_position {
                waiting.announced_position = position;
                self.announce(waiting.task_id, waiting.origin.message(), position);
            }
        }
        Some((entry, scope))
    }

    async fn claim_status_message(&self, task_id: TaskId) -> Option<MessageRef> {
        let (reply, claimed) = oneshot::channel();
        self.announcer
            .send(Announcement::Claim { task_id, reply })
            .ok()?;
        claimed.await.ok().flatten()
    }

    async fn process(&self, entry: &JobEntry, scope: &ExecutionScope) {
        let existing = self.claim_status_message(entry.task_id).await;
        let mut status = StatusMessage::new(
            self.status_sink.clone(),
            entry.origin.message(),
            existing,
            entry.params.to_string(),
        );
        tracing::info!(
            task_id = %entry.task_id,
            kind = %entry.params.kind(),
            user_id = entry.origin.user_id,
            "Job started"
        );

        let final_text = match self.run_job(entry, scope, &mut status).await {
            Ok(text) => {
                tracing::info!(task_id = %entry.task_id, "Job finished");
                text
            }
            Err(e) => {
                let text = match (scope.reason(), &e) {
                    (Some(CancelReason::Requested), _) | (None, JobError::Canceled) => {
                        tracing::info!(task_id = %entry.task_id, "Job canceled");
                        STATUS_CANCELED.to_string()
                    }
                    (Some(CancelReason::DeadlineExceeded), _) => {
                        let timeout = JobError::DeadlineExceeded(scope.deadline());
                        tracing::warn!(task_id = %entry.task_id, error = %timeout, "Job timed out");
                        error_status(&timeout)
                    }
                    (None, e) => {
                        tracing::warn!(task_id = %entry.task_id, error = %e, "Job failed");
                        error_status(e)
                    }
                };
                status.with_params(&text)
            }
        };
        if let Some(active) = self.lock().active.as_mut() {
            active.finished = true;
        }
        status.finalize(&final_text).await;
    }

    /// Drive a job to completion and return its final status text.
    async fn run_job(
        &self,
        entry: &JobEntry,
        scope: &ExecutionScope,
        status: &mut StatusMessage,
    ) -> Result<String, JobError> {
        status.progress(&Progress::indeterminate()).await;

        let input = if entry.params.requires_input() {
            Some(self.await_input(scope, status).await?)
        } else {
            None
        };

        let job = JobSpec {
            task_id: entry.task_id,
            prompt: entry.prompt.clone(),
            params: entry.params.clone(),
        };
        let (reporter, events) = progress::channel();
        let throttle =
            ProgressThrottle::new(self.config.progress_interval(entry.origin.chat_kind));
        let (result, ()) = tokio::join!(
            self.executor.execute(scope.token(), &job, input, reporter),
            throttle.run(status, events, scope.token()),
        );
        if scope.is_cancelled() {
            return Err(JobError::Canceled);
        }

        match result? {
            Artifact::Media { files, staging } => {
                status.set_with_params(STATUS_UPLOADING).await;
                self.upload(status.reply_target(), scope.token(), &files)
                    .await
                    .map_err(|e| JobError::Delivery(e.to_string()))?;
                drop(staging);
                Ok(status.with_params(STATUS_DONE))
            }
            Artifact::Text(text) => Ok(text),
            Artifact::Notice(notice) => Ok(format!("{STATUS_DONE}\n{notice}")),
        }
    }

    async fn await_input(
        &self,
        scope: &ExecutionScope,
        status: &mut StatusMessage,
    ) -> Result<InputMedia, JobError> {
        let (tx, rx) = oneshot::channel();
        if let Some(active) = self.lock().active.as_mut() {
            active.waiting_for_input = true;
            active.input_tx = Some(tx);
        }
        status.set_with_params(STATUS_INPUT_REQUEST).await;

        let received = tokio::select! {
            media = rx => media.ok(),
            _ = scope.cancelled() => return Err(JobError::Canceled),
            _ = tokio::time::sleep(self.config.input_timeout) => None,
        };
        if let Some(active) = self.lock().active.as_mut() {
            active.waiting_for_input = false;
            active.input_tx = None;
        }

        let media = received.ok_or(JobError::InputTimeout)?;
        if media.data.is_empty() {
            return Err(JobError::EmptyInput);
        }
        tracing::debug!(filename = %media.filename, bytes = media.data.len(), "Got input media");

        status.set_with_params(STATUS_DOWNLOADED).await;
        if let Some(message) = media.message {
            status.retarget(message);
        }
        Ok(media)
    }

    async fn upload(
        &self,
        reply_to: MessageRef,
        scope: &CancellationToken,
        files: &[MediaFile],
    ) -> Result<(), SinkError> {
        // A delivery still running on cancel is dropped unfinished.
        tokio::select! {
            biased;
            _ = scope.cancelled() => Err(SinkError::Canceled),
            result = deliver_with_retry(move || self.upload_once(reply_to, scope, files)) => result,
        }
    }

    /// Convert every file and stream the results to the artifact sink. Each
    /// call starts fresh conversions.
    async fn upload_once(
        &self,
        reply_to: MessageRef,
        scope: &CancellationToken,
        files: &[MediaFile],
    ) -> Result<(), SinkError> {
        let mut streams = Vec::with_capacity(files.len());
        for file in files {
            streams.push(self.converter.convert(scope, &file.path, file.format)?);
        }

        {
            let mut deliveries: Vec<DeliveryFile<'_>> = files
                .iter()
                .zip(streams.iter_mut())
                .map(|(file, stream)| DeliveryFile {
                    filename: &file.filename,
                    format: file.format,
                    reader: stream,
                })
                .collect();
            self.artifacts.deliver(reply_to, &mut deliveries).await?;
        }

        for stream in streams {
            stream.finish().await?;
        }
        Ok(())
    }
}
