mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{shared_with, sim_server, test_config, Harness, StubServices};
use talkbot::bot::reminders::ReminderScheduler;
use talkbot::bot::Controller;
use talkbot::storage::reminders::ReminderStore;

#[tokio::test]
async fn remindme_schedules_a_durable_job() {
    let mut h = Harness::new();
    let alice = h.user("Alice");

    h.pm(alice, "remindme \"stretch\" in 10 minutes");
    assert_eq!(
        h.last_pm(alice),
        "OK, I will remind you to 'stretch' in 10 minutes."
    );
    let jobs = h.shared.reminders.all().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].user_id, alice);
    assert_eq!(jobs[0].message, "stretch");
    let delay = jobs[0].fire_at - Utc::now();
    assert!(delay > chrono::Duration::minutes(9) && delay <= chrono::Duration::minutes(10));

    h.pm(alice, "remindme stretch in ten minutes");
    assert!(h.last_pm(alice).starts_with("Usage: remindme"));
    assert_eq!(h.shared.reminders.len(), 1);
}

#[tokio::test]
async fn due_jobs_are_delivered_through_the_live_session() {
    let (sim, lobby, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let controller = tokio::spawn(Controller::new(Arc::new(sim.clone()), shared.clone()).run());
    for _ in 0..200 {
        if shared.live.current().is_some_and(|s| s.is_logged_in()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let alice = sim.add_user("Alice", "alice", lobby);
    shared
        .reminders
        .schedule_in(alice, "drink water", chrono::Duration::minutes(5))
        .unwrap();
    shared
        .reminders
        .schedule_in(alice, "later", chrono::Duration::hours(5))
        .unwrap();

    let scheduler = ReminderScheduler::new(shared.clone());
    assert_eq!(scheduler.fire_due(Utc::now()).await, 0);
    let delivered = scheduler
        .fire_due(Utc::now() + chrono::Duration::minutes(6))
        .await;
    assert_eq!(delivered, 1);
    assert!(sim
        .private_texts_to(alice)
        .contains(&"[Reminder] drink water".to_string()));
    assert_eq!(shared.reminders.len(), 1);

    shared.control.request_shutdown();
    controller.await.unwrap();
}

#[tokio::test]
async fn undeliverable_jobs_wait_then_expire() {
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    shared
        .reminders
        .schedule_in(42, "ping me", chrono::Duration::minutes(1))
        .unwrap();
    let scheduler = ReminderScheduler::new(shared.clone());

    // No live session: the job is kept inside the grace period.
    let soon = Utc::now() + chrono::Duration::minutes(2);
    assert_eq!(scheduler.fire_due(soon).await, 0);
    assert_eq!(shared.reminders.len(), 1);

    let much_later = Utc::now() + chrono::Duration::hours(3);
    assert_eq!(scheduler.fire_due(much_later).await, 0);
    assert_eq!(shared.reminders.len(), 0);
}

#[test]
fn jobs_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders");
    let id = {
        let store = ReminderStore::open(&path).unwrap();
        store
            .schedule_in(7, "persisted", chrono::Duration::days(1))
            .unwrap()
            .id
    };
    let store = ReminderStore::open(&path).unwrap();
    let jobs = store.all().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, id);
    store.remove(id).unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn out_of_range_delay_gets_usage_and_session_survives() {
    let mut h = Harness::new();
    let alice = h.user("Alice");

    h.pm(alice, "remindme \"x\" in 100000000000 days");
    assert!(h.last_pm(alice).starts_with("Usage: remindme"));
    assert!(h.shared.reminders.is_empty());
    assert_eq!(h.session.end_reason(), None);

    h.pm(alice, "ping");
    assert_eq!(h.last_pm(alice), "Pong!");
}

#[tokio::test]
async fn scheduler_loop_stops_on_shutdown() {
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = tokio::spawn(ReminderScheduler::new(shared.clone()).run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    shared.control.request_shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
