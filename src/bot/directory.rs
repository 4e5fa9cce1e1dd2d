//! Cache of the users the server has told us about.
//!
//! Rebuilt from the server's user list at login and patched by join, leave
//! and update events. The cache answers nickname lookups and admin-set
//! derivation without a round trip; it never decides the bot's own rights.

use crate::config::BotConfig;
use crate::transport::{UserId, UserInfo};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone)]
pub struct UserDirectory {
    users: HashMap<UserId, UserInfo>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, users: impl IntoIterator<Item = UserInfo>) {
        self.users = users.into_iter().map(|u| (u.user_id, u)).collect();
    }

    /// Insert or replace a snapshot, returning the previous one.
    pub fn upsert(&mut self, info: UserInfo) -> Option<UserInfo> {
        self.users.insert(info.user_id, info)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<UserInfo> {
        self.users.remove(&user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<&UserInfo> {
        self.users.get(&user_id)
    }

    pub fn nickname(&self, user_id: UserId) -> Option<&str> {
        self.users.get(&user_id).map(|u| u.nickname.as_str())
    }

    /// Case-insensitive nickname lookup; the lowest user id wins on ties.
    pub fn find_by_nick(&self, nickname: &str) -> Option<&UserInfo> {
        let wanted = nickname.trim();
        self.users
            .values()
            .filter(|u| u.nickname.eq_ignore_ascii_case(wanted))
            .min_by_key(|u| u.user_id)
    }

    pub fn in_channel(&self, channel_id: i32) -> Vec<&UserInfo> {
        let mut users: Vec<&UserInfo> = self
            .users
            .values()
            .filter(|u| u.channel_id == channel_id)
            .collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    /// User ids whose account name is listed in `admin_usernames`.
    pub fn admin_ids(&self, bot: &BotConfig) -> HashSet<UserId> {
        self.users
            .values()
            .filter(|u| !u.username.is_empty() && bot.is_admin_username(&u.username))
            .map(|u| u.user_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
