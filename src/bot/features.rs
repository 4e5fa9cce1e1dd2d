//! Runtime feature toggles.
//!
//! Console and admin commands name features by short keys. The key table is
//! explicit; an unknown key is a [`ToggleError::UnknownFeature`], never a
//! silent no-op.

use crate::config::FeatureDefaults;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    JoinLeaveAnnouncements,
    ChannelMessages,
    Broadcast,
    AiPrivate,
    AiChannel,
    WordFilter,
    Lock,
    ContextHistory,
    DebugLogging,
}

/// Console key, feature and display label.
pub const FEATURE_TABLE: &[(&str, Feature, &str)] = &[
    ("jcl", Feature::JoinLeaveAnnouncements, "Join/Leave Announcements"),
    ("chanmsg", Feature::ChannelMessages, "Channel Messages"),
    ("broadcast", Feature::Broadcast, "Broadcast Messages"),
    ("aipm", Feature::AiPrivate, "AI in PM"),
    ("aichan", Feature::AiChannel, "AI in Channel"),
    ("filter", Feature::WordFilter, "Word Filter"),
    ("lock", Feature::Lock, "Bot Lock"),
    ("context_history", Feature::ContextHistory, "Context History"),
    ("debug_logging", Feature::DebugLogging, "Debug Logging"),
];

impl Feature {
    pub fn key(self) -> &'static str {
        FEATURE_TABLE
            .iter()
            .find(|(_, f, _)| *f == self)
            .map(|(k, _, _)| *k)
            .unwrap_or("?")
    }

    pub fn label(self) -> &'static str {
        FEATURE_TABLE
            .iter()
            .find(|(_, f, _)| *f == self)
            .map(|(_, _, l)| *l)
            .unwrap_or("?")
    }

    pub fn all() -> impl Iterator<Item = Feature> {
        FEATURE_TABLE.iter().map(|(_, f, _)| *f)
    }
}

impl FromStr for Feature {
    type Err = ToggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FEATURE_TABLE
            .iter()
            .find(|(k, _, _)| *k == wanted)
            .map(|(_, f, _)| *f)
            .ok_or(ToggleError::UnknownFeature(wanted))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToggleError {
    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),
    #[error("Cannot enable the word filter: the filter list is empty")]
    EmptyFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureToggles {
    pub join_leave_announcements: bool,
    pub channel_messages: bool,
    pub broadcast: bool,
    pub ai_private: bool,
    pub ai_channel: bool,
    pub word_filter: bool,
    pub lock: bool,
    pub context_history: bool,
    pub debug_logging: bool,
}

impl FeatureToggles {
    pub fn from_defaults(
        defaults: &FeatureDefaults,
        context_history: bool,
        debug_logging: bool,
        have_filter_words: bool,
    ) -> Self {
        Self {
            join_leave_announcements: defaults.join_leave_announcements,
            channel_messages: defaults.channel_messages,
            broadcast: defaults.broadcast,
            ai_private: defaults.ai_pm,
            ai_channel: defaults.ai_channel,
            word_filter: defaults.word_filter && have_filter_words,
            lock: false,
            context_history,
            debug_logging,
        }
    }

    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::JoinLeaveAnnouncements => self.join_leave_announcements,
            Feature::ChannelMessages => self.channel_messages,
            Feature::Broadcast => self.broadcast,
            Feature::AiPrivate => self.ai_private,
            Feature::AiChannel => self.ai_channel,
            Feature::WordFilter => self.word_filter,
            Feature::Lock => self.lock,
            Feature::ContextHistory => self.context_history,
            Feature::DebugLogging => self.debug_logging,
        }
    }

    pub fn set(&mut self, feature: Feature, on: bool) {
        let slot = match feature {
            Feature::JoinLeaveAnnouncements => &mut self.join_leave_announcements,
            Feature::ChannelMessages => &mut self.channel_messages,
            Feature::Broadcast => &mut self.broadcast,
            Feature::AiPrivate => &mut self.ai_private,
            Feature::AiChannel => &mut self.ai_channel,
            Feature::WordFilter => &mut self.word_filter,
            Feature::Lock => &mut self.lock,
            Feature::ContextHistory => &mut self.context_history,
            Feature::DebugLogging => &mut self.debug_logging,
        };
        *slot = on;
    }
}

/// Raise or lower the global log level for the `debug_logging` toggle.
pub fn apply_debug_logging(enabled: bool) {
    let level = if enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    log::set_max_level(level);
}

pub fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}
