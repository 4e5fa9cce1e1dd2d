//! Whole-word, case-insensitive matching for the channel word filter.

use std::collections::BTreeMap;

use log::warn;
use regex::Regex;

/// Warnings a sender collects before the bot tries to kick them.
pub const WARNING_THRESHOLD: u32 = 3;

fn word_pattern(word: &str) -> Option<Regex> {
    match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("cannot compile filter word {:?}: {}", word, e);
            None
        }
    }
}

/// The filter list with one compiled pattern per word. Patterns are built
/// when the list changes, never per message.
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    patterns: BTreeMap<String, Regex>,
}

impl WordFilter {
    pub fn new<'a, I>(words: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut filter = Self::default();
        for word in words {
            filter.insert(word);
        }
        filter
    }

    /// Add a word (stored lowercased). False if it was already listed or
    /// could not be compiled.
    pub fn insert(&mut self, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        if word.is_empty() || self.patterns.contains_key(&word) {
            return false;
        }
        match word_pattern(&word) {
            Some(re) => {
                self.patterns.insert(word, re);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, word: &str) -> bool {
        self.patterns.remove(&word.trim().to_lowercase()).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    /// First listed word found in `text`, in list order.
    pub fn find(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(w, _)| w.as_str())
    }
}
