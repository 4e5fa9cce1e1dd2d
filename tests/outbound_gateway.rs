mod common;

use common::Harness;
use talkbot::transport::{MessageKind, MAX_FRAGMENT_CHARS};

#[tokio::test]
async fn long_channel_text_is_split_with_continuation_flags() {
    let mut h = Harness::new();
    let boss = h.admin();
    h.clear();

    let text = "é".repeat(MAX_FRAGMENT_CHARS + 10);
    h.pm(boss, &format!("ct {}", text));
    assert_eq!(h.last_pm(boss), "Message sent to channel.");

    let fragments: Vec<_> = h
        .sim
        .sent()
        .into_iter()
        .filter(|m| m.kind == MessageKind::Channel)
        .collect();
    assert_eq!(fragments.len(), 2);
    assert!(fragments[0].more);
    assert!(!fragments[1].more);
    assert_eq!(fragments[0].text.chars().count(), MAX_FRAGMENT_CHARS);
    assert_eq!(fragments[1].text.chars().count(), 10);
    assert_eq!(h.channel_msgs(h.lobby), vec![text]);
}

#[tokio::test]
async fn channel_toggle_refuses_channel_sends() {
    let mut h = Harness::new();
    let boss = h.admin();

    h.pm(boss, "tg_chanmsg");
    assert_eq!(h.last_pm(boss), "Channel Messages is now OFF.");
    h.clear();

    h.pm(boss, "ct hello");
    assert_eq!(
        h.last_pm(boss),
        "Error: Could not send to channel (channel messages are disabled)."
    );
    assert!(h.channel_msgs(h.lobby).is_empty());
}

#[tokio::test]
async fn broadcast_toggle() {
    let mut h = Harness::new();
    let boss = h.admin();
    h.clear();

    h.pm(boss, "bm hello all");
    assert_eq!(h.last_pm(boss), "Broadcast sent.");
    assert!(h
        .sim
        .sent()
        .iter()
        .any(|m| m.kind == MessageKind::Broadcast && m.text == "hello all"));

    h.pm(boss, "tg_broadcast");
    h.pm(boss, "bm again");
    assert_eq!(
        h.last_pm(boss),
        "Error: Could not send broadcast (broadcasts are disabled)."
    );
}

#[tokio::test]
async fn rejected_fragment_aborts_the_rest() {
    let mut h = Harness::new();
    let boss = h.admin();
    h.clear();
    h.sim.reject_sends_after(Some(1));

    h.pm(boss, &format!("ct {}", "x".repeat(MAX_FRAGMENT_CHARS * 3)));
    let sent = h.sim.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, MessageKind::Channel);
    assert!(sent[0].more);
}
