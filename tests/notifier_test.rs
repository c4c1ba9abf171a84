mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{FakeTaskApi, task};
use taskdeck::models::Task;
use taskdeck::services::{
    ChannelReminderSink, DueTaskNotifier, PermissionSource, PermissionState, Reminder,
    StaticPermission,
};
use tokio::sync::mpsc;

fn overdue(id: i64, title: &str) -> Task {
    let mut t = task(id, title);
    t.due_at = Some(Utc::now() - TimeDelta::hours(1));
    t
}

fn far_off(id: i64, title: &str) -> Task {
    let mut t = task(id, title);
    t.due_at = Some(Utc::now() + TimeDelta::days(2));
    t
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Reminder>) -> Vec<Reminder> {
    let mut out = Vec::new();
    while let Ok(reminder) = rx.try_recv() {
        out.push(reminder);
    }
    out
}

fn build_notifier(
    api: Arc<FakeTaskApi>,
    permission: Arc<StaticPermission>,
) -> (DueTaskNotifier, mpsc::UnboundedReceiver<Reminder>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let notifier = DueTaskNotifier::new(api, permission, Arc::new(ChannelReminderSink::new(tx)));
    (notifier, rx)
}

#[tokio::test(start_paused = true)]
async fn polls_immediately_then_every_minute() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent"), far_off(2, "Later")]));
    let (mut notifier, mut rx) = build_notifier(api.clone(), Arc::new(StaticPermission::new(true)));

    assert_eq!(notifier.state(), PermissionState::Unrequested);
    assert_eq!(notifier.request_permission().await, PermissionState::Granted);
    assert!(notifier.is_polling());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.lists(), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.lists(), 3);

    let reminders = drain(&mut rx);
    assert_eq!(reminders.len(), 3);
    assert!(reminders.iter().all(|r| r.tag == "task-1"));
    assert_eq!(reminders[0].title, "Task Reminder: Pay rent");

    notifier.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn never_polls_without_permission() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let (mut notifier, mut rx) = build_notifier(api.clone(), Arc::new(StaticPermission::new(false)));

    assert_eq!(notifier.request_permission().await, PermissionState::Denied);
    assert!(!notifier.is_polling());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.lists(), 0);
    assert!(drain(&mut rx).is_empty());

    let reminders = notifier.check_now().await.unwrap();
    assert!(reminders.is_empty());
    assert_eq!(api.lists(), 0);
}

#[tokio::test(start_paused = true)]
async fn re_request_after_denial_starts_polling() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let permission = Arc::new(StaticPermission::new(false));
    let (mut notifier, mut rx) = build_notifier(api.clone(), permission.clone());

    assert_eq!(notifier.request_permission().await, PermissionState::Denied);

    permission.set_granted(true);
    assert_eq!(notifier.request_permission().await, PermissionState::Granted);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.lists(), 1);
    assert_eq!(drain(&mut rx).len(), 1);

    notifier.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn revoked_permission_skips_polls() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let permission = Arc::new(StaticPermission::new(true));
    let (mut notifier, _rx) = build_notifier(api.clone(), permission.clone());

    notifier.request_permission().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.lists(), 1);

    permission.set_granted(false);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(api.lists(), 1);

    notifier.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn revocation_shows_in_state_and_stops_on_re_request() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let permission = Arc::new(StaticPermission::new(true));
    let (mut notifier, _rx) = build_notifier(api.clone(), permission.clone());

    assert_eq!(notifier.request_permission().await, PermissionState::Granted);
    tokio::time::sleep(Duration::from_secs(1)).await;

    permission.set_granted(false);
    assert_eq!(notifier.state(), PermissionState::Denied);
    assert_eq!(notifier.request_permission().await, PermissionState::Denied);
    assert!(!notifier.is_polling());

    permission.set_granted(true);
    assert_eq!(notifier.request_permission().await, PermissionState::Granted);
    assert!(notifier.is_polling());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.lists(), 2);

    notifier.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fetch_failures_do_not_stop_the_loop() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    api.fail_lists(2);
    let (mut notifier, mut rx) = build_notifier(api.clone(), Arc::new(StaticPermission::new(true)));

    notifier.request_permission().await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(api.lists(), 2);
    assert!(drain(&mut rx).is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.lists(), 3);
    assert_eq!(drain(&mut rx).len(), 1);

    notifier.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn check_now_reminds_only_open_dated_tasks() {
    let mut done = overdue(1, "Done already");
    done.completed = true;
    let api = Arc::new(FakeTaskApi::with_tasks(vec![
        done,
        task(2, "Someday"),
        overdue(3, "Call mom"),
        far_off(4, "Next week"),
    ]));
    let permission = Arc::new(StaticPermission::new(true));
    let (notifier, mut rx) = build_notifier(api.clone(), permission.clone());

    // Granted at the source, but no poll loop started.
    assert_eq!(permission.request().await, PermissionState::Granted);

    let reminders = notifier.check_now().await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].tag, "task-3");
    assert_eq!(reminders[0].body, "Task \"Call mom\" is due now!");
    assert_eq!(drain(&mut rx), reminders);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_loop() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let (mut notifier, _rx) = build_notifier(api.clone(), Arc::new(StaticPermission::new(true)));

    notifier.request_permission().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    notifier.stop();
    assert!(!notifier.is_polling());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.lists(), 1);
    assert_eq!(notifier.state(), PermissionState::Granted);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_notifier_cancels_the_loop() {
    let api = Arc::new(FakeTaskApi::with_tasks(vec![overdue(1, "Pay rent")]));
    let (mut notifier, _rx) = build_notifier(api.clone(), Arc::new(StaticPermission::new(true)));

    notifier.request_permission().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(notifier);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.lists(), 1);
}
