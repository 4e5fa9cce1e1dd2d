mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{shared_with, sim_server, test_config, StubServices, ADMIN_USERNAME};
use talkbot::bot::{Controller, ControllerExit, Shared};
use talkbot::transport::sim::SimServer;
use talkbot::transport::ClientErrorCode;
use tokio::time::Instant;

fn spawn_controller(sim: &SimServer, shared: &Arc<Shared>) -> tokio::task::JoinHandle<ControllerExit> {
    tokio::spawn(Controller::new(Arc::new(sim.clone()), shared.clone()).run())
}

async fn wait_logged_in(shared: &Shared) {
    for _ in 0..1000 {
        if shared.live.current().is_some_and(|h| h.is_logged_in()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never logged in");
}

async fn wait_attempts(sim: &SimServer, n: usize) {
    for _ in 0..10_000 {
        if sim.connect_attempts().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} connect attempts, saw {}", n, sim.connect_attempts().len());
}

#[tokio::test(start_paused = true)]
async fn fixed_backoff_waits_exactly_the_configured_delay() {
    let (sim, _, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;

    let lost_at = Instant::now();
    sim.drop_connection();
    wait_attempts(&sim, 2).await;
    assert_eq!(sim.connect_attempts()[1] - lost_at, Duration::from_secs(5));

    wait_logged_in(&shared).await;
    shared.control.request_shutdown();
    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn failed_connects_are_retried_within_range() {
    let (sim, _, _) = sim_server();
    sim.set_connect_ok(false);
    let mut config = test_config();
    config.bot.reconnect_delay_min = 2;
    config.bot.reconnect_delay_max = 4;
    let shared = shared_with(config, Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);

    wait_attempts(&sim, 4).await;
    let attempts = sim.connect_attempts();
    for pair in attempts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_secs(2) && gap <= Duration::from_secs(4),
            "gap {:?} outside the backoff range",
            gap
        );
    }

    sim.set_connect_ok(true);
    wait_logged_in(&shared).await;
    shared.control.request_shutdown();
    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_backoff_prevents_reconnect() {
    let (sim, _, _) = sim_server();
    let mut config = test_config();
    config.bot.reconnect_delay_min = 30;
    config.bot.reconnect_delay_max = 30;
    let shared = shared_with(config, Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;

    sim.drop_connection();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(shared.live.current().is_none());
    shared.control.request_shutdown();

    let exit = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert_eq!(exit.unwrap().unwrap(), ControllerExit::Shutdown);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sim.connect_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fatal_login_error_stops_without_retry() {
    let (sim, _, _) = sim_server();
    sim.set_login_error(Some(ClientErrorCode::InvalidAccount));
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));

    let exit = spawn_controller(&sim, &shared).await.unwrap();
    assert_eq!(exit, ControllerExit::Fatal(ClientErrorCode::InvalidAccount));
    assert!(shared.control.is_shutting_down());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sim.connect_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn admin_restart_reconnects_without_backoff() {
    let (sim, lobby, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;
    let first = shared.live.current().unwrap().id();

    let boss = sim.add_user("Boss", ADMIN_USERNAME, lobby);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let asked_at = Instant::now();
    sim.say_private(boss, "rs");

    wait_attempts(&sim, 2).await;
    assert!(sim.connect_attempts()[1] - asked_at < Duration::from_secs(1));
    wait_logged_in(&shared).await;
    assert_ne!(shared.live.current().unwrap().id(), first);
    assert!(sim
        .private_texts_to(boss)
        .contains(&"Acknowledged. Restarting bot...".to_string()));

    shared.control.request_shutdown();
    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn admin_quit_shuts_down_for_good() {
    let (sim, lobby, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;

    let boss = sim.add_user("Boss", ADMIN_USERNAME, lobby);
    tokio::time::sleep(Duration::from_millis(10)).await;
    sim.say_private(boss, "q");

    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
    assert!(shared.live.current().is_none());
    assert_eq!(sim.connect_attempts().len(), 1);
    assert!(sim.bot_user_id().is_none());
}

#[tokio::test(start_paused = true)]
async fn console_restart_replaces_the_session() {
    let (sim, _, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;
    let first = shared.live.current().unwrap().id();

    let (out, _) = talkbot::console::execute("restart", &shared);
    assert_eq!(out, "Restart requested.");
    wait_attempts(&sim, 2).await;
    wait_logged_in(&shared).await;
    assert_ne!(shared.live.current().unwrap().id(), first);

    let (_, action) = talkbot::console::execute("quit", &shared);
    assert_eq!(action, talkbot::console::ConsoleAction::Exit);
    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_restarts_build_one_new_session() {
    let (sim, _, _) = sim_server();
    let shared = shared_with(test_config(), Arc::new(StubServices::default()));
    let task = spawn_controller(&sim, &shared);
    wait_logged_in(&shared).await;

    shared.control.request_restart();
    shared.control.request_restart();
    wait_attempts(&sim, 2).await;
    wait_logged_in(&shared).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sim.connect_attempts().len(), 2);
    assert!(shared.live.current().is_some_and(|h| h.is_logged_in()));

    shared.control.request_shutdown();
    assert_eq!(task.await.unwrap(), ControllerExit::Shutdown);
}
