//! Due-task reminders.
//!
//! [`DueTaskNotifier`] asks for notification permission once, and while it is
//! granted polls the task list: one check right away, then one per interval.
//! Every task that is incomplete and due within [`GRACE_PERIOD_SECS`] of now gets a
//! [`Reminder`] tagged `task-{id}`.
//!
//! There is no "already reminded" set. A task that stays due and incomplete
//! is reminded again on every cycle; collapsing repeats is left to the sink,
//! which can key on the tag.
//!
//! ```rust,ignore
//! let mut notifier = DueTaskNotifier::new(api, permission, Arc::new(TracingReminderSink));
//! notifier.request_permission().await;
//! // ...
//! notifier.stop();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::error::AppError;
use crate::models::{StatusFilter, Task, TaskId};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How far ahead of now a due time still counts as due, in seconds.
pub const GRACE_PERIOD_SECS: i64 = 5 * 60;

pub fn grace_period() -> TimeDelta {
    TimeDelta::seconds(GRACE_PERIOD_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unrequested,
    PermissionPending,
    Granted,
    Denied,
}

/// Where notification permission comes from.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Prompts for permission. Resolves to `Granted` or `Denied`.
    async fn request(&self) -> PermissionState;

    /// The permission as it stands right now. Checked before every poll.
    fn current(&self) -> PermissionState;
}

pub trait ReminderSink: Send + Sync {
    fn show(&self, reminder: &Reminder);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task_id: TaskId,
    pub title: String,
    pub body: String,
    /// Dedup key; repeats with the same tag may be collapsed by the sink.
    pub tag: String,
}

impl Reminder {
    pub fn for_task(task: &Task) -> Self {
        let body = match task.description.as_deref() {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => format!("Task \"{}\" is due now!", task.title),
        };
        Self {
            task_id: task.id.clone(),
            title: format!("Task Reminder: {}", task.title),
            body,
            tag: format!("task-{}", task.id),
        }
    }
}

/// Tasks that are incomplete and due no later than `now` plus the grace period.
pub fn due_tasks(tasks: &[Task], now: DateTime<Utc>) -> Vec<&Task> {
    let cutoff = now + grace_period();
    tasks
        .iter()
        .filter(|task| !task.completed)
        .filter(|task| task.due_at.is_some_and(|due| due <= cutoff))
        .collect()
}

/// Permission answered from a fixed setting, e.g. configuration.
pub struct StaticPermission {
    answer: PermissionState,
    state: AtomicU8,
}

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        let answer = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        Self {
            answer,
            state: AtomicU8::new(encode(PermissionState::Unrequested)),
        }
    }

    /// Changes what the next check sees, as if the user flipped the setting.
    pub fn set_granted(&self, granted: bool) {
        let state = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        self.state.store(encode(state), Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionSource for StaticPermission {
    async fn request(&self) -> PermissionState {
        let current = self.current();
        let granted = match current {
            PermissionState::Granted | PermissionState::Denied => current,
            _ => self.answer,
        };
        self.state.store(encode(granted), Ordering::SeqCst);
        granted
    }

    fn current(&self) -> PermissionState {
        decode(self.state.load(Ordering::SeqCst))
    }
}

fn encode(state: PermissionState) -> u8 {
    match state {
        PermissionState::Unrequested => 0,
        PermissionState::PermissionPending => 1,
        PermissionState::Granted => 2,
        PermissionState::Denied => 3,
    }
}

fn decode(raw: u8) -> PermissionState {
    match raw {
        1 => PermissionState::PermissionPending,
        2 => PermissionState::Granted,
        3 => PermissionState::Denied,
        _ => PermissionState::Unrequested,
    }
}

/// Writes reminders to the log.
pub struct TracingReminderSink;

impl ReminderSink for TracingReminderSink {
    fn show(&self, reminder: &Reminder) {
        info!(tag = %reminder.tag, "{}: {}", reminder.title, reminder.body);
    }
}

/// Forwards reminders over a channel to whoever renders them.
pub struct ChannelReminderSink {
    tx: mpsc::UnboundedSender<Reminder>,
}

impl ChannelReminderSink {
    pub fn new(tx: mpsc::UnboundedSender<Reminder>) -> Self {
        Self { tx }
    }
}

impl ReminderSink for ChannelReminderSink {
    fn show(&self, reminder: &Reminder) {
        // A closed receiver means the view is gone; nothing to do.
        let _ = self.tx.send(reminder.clone());
    }
}

/// The part of the notifier shared with the polling task.
struct DueTaskCheck {
    api: Arc<dyn TaskApi>,
    permission: Arc<dyn PermissionSource>,
    sink: Arc<dyn ReminderSink>,
}

impl DueTaskCheck {
    async fn run(&self) -> Result<Vec<Reminder>, AppError> {
        if self.permission.current() != PermissionState::Granted {
            debug!("notification permission not granted, skipping due-task check");
            return Ok(Vec::new());
        }

        let tasks = self.api.list_tasks(StatusFilter::All).await?;
        let reminders: Vec<Reminder> = due_tasks(&tasks, Utc::now())
            .into_iter()
            .map(Reminder::for_task)
            .collect();

        for reminder in &reminders {
            self.sink.show(reminder);
        }
        if !reminders.is_empty() {
            info!("Sent {} task reminders", reminders.len());
        }
        Ok(reminders)
    }
}

/// Owns the running poll loop. Cancelling or dropping it stops the loop.
pub struct NotifierHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl NotifierHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("due-task poller ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct DueTaskNotifier {
    check: Arc<DueTaskCheck>,
    poll_interval: Duration,
    state: PermissionState,
    handle: Option<NotifierHandle>,
}

impl DueTaskNotifier {
    pub fn new(
        api: Arc<dyn TaskApi>,
        permission: Arc<dyn PermissionSource>,
        sink: Arc<dyn ReminderSink>,
    ) -> Self {
        Self {
            check: Arc::new(DueTaskCheck {
                api,
                permission,
                sink,
            }),
            poll_interval: POLL_INTERVAL,
            state: PermissionState::Unrequested,
            handle: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The last answered permission, downgraded to `Denied` once the source
    /// no longer grants it.
    pub fn state(&self) -> PermissionState {
        match self.state {
            PermissionState::Granted
                if self.check.permission.current() != PermissionState::Granted =>
            {
                PermissionState::Denied
            }
            state => state,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_cancelled())
    }

    /// Asks for permission and starts polling once it is granted.
    ///
    /// Calling this again after a denial re-prompts. Calling it while
    /// granted and polling does nothing, unless the source has since
    /// revoked permission.
    pub async fn request_permission(&mut self) -> PermissionState {
        if self.state == PermissionState::Granted && self.is_polling() {
            if self.check.permission.current() == PermissionState::Granted {
                return self.state;
            }
            debug!("notification permission revoked, asking again");
        }

        self.state = PermissionState::PermissionPending;
        self.state = match self.check.permission.request().await {
            PermissionState::Granted => PermissionState::Granted,
            _ => PermissionState::Denied,
        };
        info!("notification permission: {:?}", self.state);

        if self.state == PermissionState::Granted {
            self.start_polling();
        } else {
            self.stop();
        }
        self.state
    }

    /// Runs one due-task check outside the schedule.
    pub async fn check_now(&self) -> Result<Vec<Reminder>, AppError> {
        self.check.run().await
    }

    /// Stops the poll loop. Permission state is kept.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }

    fn start_polling(&mut self) {
        self.stop();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.check.clone(),
            self.poll_interval,
            cancel.clone(),
        ));
        self.handle = Some(NotifierHandle {
            cancel,
            task: Some(task),
        });
    }
}

async fn poll_loop(check: Arc<DueTaskCheck>, period: Duration, cancel: CancellationToken) {
    info!("due-task poller started (interval: {:?})", period);

    // The first tick completes immediately, which gives the startup check.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = check.run() => {
                        if let Err(e) = result {
                            warn!("Error checking for due tasks: {}", e);
                        }
                    }
                }
            }
        }
    }

    info!("due-task poller stopped");
}
