mod common;

use common::{sim_server, test_config, Harness};
use talkbot::config::ConfigStore;
use talkbot::transport::{MessageKind, TextMessage, TransportEvent};

#[tokio::test]
async fn private_command_gets_private_reply() {
    let mut h = Harness::new();
    let alice = h.user("Alice");
    h.pm(alice, "PING");
    assert_eq!(h.last_pm(alice), "Pong!");
}

#[tokio::test]
async fn fragmented_message_dispatches_once() {
    let mut h = Harness::new();
    let alice = h.user("Alice");
    let bot = h.sim.bot_user_id().unwrap();
    for (text, more) in [("pi", true), ("n", true), ("g", false)] {
        h.sim.emit(TransportEvent::TextMessage(TextMessage {
            kind: MessageKind::User,
            from_user_id: alice,
            to_user_id: bot,
            channel_id: h.lobby,
            text: text.to_string(),
            more,
        }));
    }
    h.pump();
    assert_eq!(h.pms_to(alice), vec!["Pong!".to_string()]);
}

#[tokio::test]
async fn channel_commands_need_a_marker_and_an_occupied_channel() {
    let mut h = Harness::new();
    let alice = h.user("Alice");
    h.clear();

    h.say(alice, "poll \"Q\" \"A\" \"B\"");
    assert!(h.channel_msgs(h.lobby).is_empty());

    h.sim.say_channel(alice, h.games, "!poll \"Q\" \"A\" \"B\"");
    h.pump();
    assert!(h.channel_msgs(h.games).is_empty());

    h.say(alice, "!poll \"Lunch?\" \"Pizza\" \"Soup\"");
    let msgs = h.channel_msgs(h.lobby);
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("Poll #1 created: Lunch?"));
}

#[tokio::test]
async fn non_admin_is_refused_admin_commands() {
    let mut h = Harness::new();
    let alice = h.user("Alice");
    h.pm(alice, "lock");
    assert_eq!(h.last_pm(alice), "Error: You are not authorized to use 'lock'.");
    assert!(!h.session.handle().with_state(|s| s.is_locked()));
}

#[tokio::test]
async fn lock_refuses_everything_but_pinned_commands() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");

    h.pm(boss, "lock");
    assert_eq!(h.last_pm(boss), "Bot lock is now ON.");

    h.pm(alice, "ping");
    assert_eq!(h.last_pm(alice), "Command ignored; bot is locked.");

    h.pm(alice, "whoami");
    assert!(h.last_pm(alice).starts_with("Nick: Alice"));

    h.clear();
    h.say(alice, "!poll \"Q\" \"A\" \"B\"");
    assert!(h.channel_msgs(h.lobby).is_empty());
    assert!(h.pms_to(alice).is_empty());

    h.pm(boss, "lock");
    assert_eq!(h.last_pm(boss), "Bot lock is now OFF.");
    h.pm(alice, "ping");
    assert_eq!(h.last_pm(alice), "Pong!");
}

#[tokio::test]
async fn unknown_verbs_are_silent_but_still_locked_out() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");
    h.pm(alice, "frobnicate now");
    assert!(h.pms_to(alice).is_empty());

    h.pm(boss, "lock");
    h.pm(alice, "frobnicate");
    assert_eq!(h.last_pm(alice), "Command ignored; bot is locked.");
}

#[tokio::test]
async fn blocking_a_command() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");

    h.pm(boss, "block ping");
    assert_eq!(h.last_pm(boss), "Command 'ping' has been BLOCKED.");
    h.pm(boss, "block ping");
    assert_eq!(h.last_pm(boss), "Command 'ping' is already blocked.");

    h.pm(alice, "ping");
    assert_eq!(h.last_pm(alice), "Command 'ping' is blocked.");

    h.pm(boss, "block h");
    assert_eq!(h.last_pm(boss), "Error: Command 'h' cannot be blocked.");

    h.pm(boss, "block poll");
    assert_eq!(h.last_pm(boss), "Command '!poll' has been BLOCKED.");

    h.pm(boss, "block");
    assert_eq!(
        h.last_pm(boss),
        "Usage: block <command>\nCurrently blocked: !poll, ping"
    );

    h.pm(boss, "unblock ping");
    assert_eq!(h.last_pm(boss), "Command 'ping' has been UNBLOCKED.");
    h.pm(alice, "ping");
    assert_eq!(h.last_pm(alice), "Pong!");
}

#[tokio::test]
async fn help_shows_admin_section_only_to_admins() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");

    h.pm(alice, "h");
    let plain = h.last_pm(alice);
    assert!(plain.starts_with("--- Bot Commands (Send via PM) ---"));
    assert!(!plain.contains("--- Admin Commands ---"));

    h.pm(boss, "h");
    assert!(h.last_pm(boss).contains("--- Admin Commands ---"));

    // `h` in the channel is answered privately.
    h.clear();
    h.say(alice, "!h");
    assert!(h.channel_msgs(h.lobby).is_empty());
    assert!(h.last_pm(alice).starts_with("--- Bot Commands"));
}

#[tokio::test]
async fn broadcasts_are_never_commands() {
    let mut h = Harness::new();
    let alice = h.user("Alice");
    h.sim.emit(TransportEvent::TextMessage(TextMessage {
        kind: MessageKind::Broadcast,
        from_user_id: alice,
        to_user_id: 0,
        channel_id: 0,
        text: "ping".to_string(),
        more: false,
    }));
    h.pump();
    assert!(h.pms_to(alice).is_empty());
}

#[tokio::test]
async fn handler_failure_is_reported_and_session_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let unwritable = dir.path().join("missing-dir").join("config.toml");
    let store = ConfigStore::new(test_config(), Some(unwritable));
    let (sim, lobby, games) = sim_server();
    let mut h = Harness::on_store(sim, lobby, games, store);
    let boss = h.admin();

    h.pm(boss, "gapi k-123");
    assert_eq!(
        h.last_pm(boss),
        "An unexpected error occurred executing 'gapi'."
    );
    assert_eq!(h.session.end_reason(), None);
    assert!(h.session.handle().is_logged_in());

    h.pm(boss, "ping");
    assert_eq!(h.last_pm(boss), "Pong!");
}
