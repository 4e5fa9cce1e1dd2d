mod common;

use common::{sim_server, test_config, Harness};
use talkbot::transport::sim::AdminOp;
use talkbot::transport::UserRights;

#[tokio::test]
async fn third_warning_kicks_and_resets() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");

    h.pm(boss, "!filter add Darn");
    assert_eq!(h.last_pm(boss), "Word 'darn' added to filter. Filter enabled.");
    assert_eq!(h.shared.config.read().bot.filtered_words, vec!["darn".to_string()]);
    assert!(h.shared.config.read().bot.features.word_filter);

    h.clear();
    h.say(alice, "well DARN it");
    h.say(alice, "darn!");
    assert_eq!(
        h.channel_msgs(h.lobby),
        vec![
            "Warning 1/3 for Alice: Please avoid inappropriate language.".to_string(),
            "Warning 2/3 for Alice: Please avoid inappropriate language.".to_string(),
        ]
    );
    assert!(h.sim.admin_ops().is_empty());

    h.clear();
    h.say(alice, "darn");
    assert_eq!(
        h.sim.admin_ops(),
        vec![AdminOp::Kick {
            user_id: alice,
            channel_id: h.lobby
        }]
    );
    let msgs = h.channel_msgs(h.lobby);
    assert_eq!(msgs[0], "Warning 3/3 for Alice: Please avoid inappropriate language.");
    assert!(msgs.contains(&"User Alice kicked after 3 warnings.".to_string()));
    assert_eq!(h.session.handle().with_state(|s| s.warnings(alice)), 0);
}

#[tokio::test]
async fn filter_only_matches_whole_words() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");
    h.pm(boss, "!filter add darn");
    h.clear();

    h.say(alice, "the darned cat");
    assert!(h.channel_msgs(h.lobby).is_empty());
    assert_eq!(h.session.handle().with_state(|s| s.warnings(alice)), 0);
}

#[tokio::test]
async fn filtered_command_is_swallowed() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");
    h.pm(boss, "!filter add darn");
    h.clear();

    h.say(alice, "!poll \"darn?\" \"yes\" \"no\"");
    let msgs = h.channel_msgs(h.lobby);
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("Warning 1/3"));
    assert!(h.session.handle().with_state(|s| s.polls.is_empty()));
}

#[tokio::test]
async fn without_kick_right_the_bot_says_so() {
    let (sim, lobby, games) = sim_server();
    sim.set_bot_rights(UserRights::TEXTMESSAGE_USER | UserRights::TEXTMESSAGE_CHANNEL);
    let mut h = Harness::on_server(sim, lobby, games, test_config());
    let boss = h.admin();
    let alice = h.user("Alice");
    h.pm(boss, "!filter add darn");
    h.clear();

    for _ in 0..3 {
        h.say(alice, "darn");
    }
    assert!(h.sim.admin_ops().is_empty());
    assert_eq!(
        h.channel_msgs(h.lobby).last().map(String::as_str),
        Some("Alice has 3 warnings, but bot cannot kick.")
    );
    assert_eq!(h.session.handle().with_state(|s| s.warnings(alice)), 0);
}

#[tokio::test]
async fn rejected_kick_is_not_announced() {
    let mut h = Harness::new();
    let boss = h.admin();
    let alice = h.user("Alice");
    h.pm(boss, "!filter add darn");
    h.sim.reject_admin_ops(true);
    h.clear();

    for _ in 0..3 {
        h.say(alice, "darn");
    }
    let msgs = h.channel_msgs(h.lobby);
    assert_eq!(
        msgs.last().map(String::as_str),
        Some("Alice has 3 warnings, but the kick request failed.")
    );
    assert!(!msgs.iter().any(|m| m.contains("kicked after")));
    assert!(h.sim.admin_ops().is_empty());
    assert_eq!(h.session.handle().with_state(|s| s.warnings(alice)), 0);
}

#[tokio::test]
async fn filter_toggle_and_list() {
    let mut h = Harness::new();
    let boss = h.admin();

    h.pm(boss, "!tfilter");
    assert_eq!(
        h.last_pm(boss),
        "Cannot enable the word filter: the filter list is empty. Use '!filter add <word>'."
    );

    h.pm(boss, "!filter add heck");
    h.pm(boss, "!filter list");
    assert_eq!(h.last_pm(boss), "Filtered Words (ENABLED): heck");

    h.pm(boss, "!filter remove heck");
    assert_eq!(h.last_pm(boss), "Word 'heck' removed from filter.");
    h.pm(boss, "!filter list");
    assert_eq!(h.last_pm(boss), "Filtered Words (DISABLED): Empty");

    h.pm(boss, "!filter add two words");
    assert_eq!(h.last_pm(boss), "Usage: !filter <add|remove|list> [word]");
}
