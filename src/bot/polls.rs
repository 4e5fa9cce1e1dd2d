//! Simple per-session polls: `!poll`, `!vote`, `!results`.

use crate::transport::UserId;
use std::collections::{BTreeMap, HashMap};

pub const MAX_POLL_OPTIONS: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    #[error("A poll needs a question and at least two options.")]
    TooFewOptions,
    #[error("A poll can have at most 10 options.")]
    TooManyOptions,
    #[error("Poll #{0} does not exist.")]
    UnknownPoll(u32),
    #[error("Poll #{poll} has no option {option}.")]
    UnknownOption { poll: u32, option: usize },
}

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub creator: UserId,
    /// Voter -> zero-based option index.
    votes: HashMap<UserId, usize>,
}

impl Poll {
    pub fn tally(&self) -> Vec<usize> {
        let mut counts = vec![0; self.options.len()];
        for idx in self.votes.values() {
            if let Some(slot) = counts.get_mut(*idx) {
                *slot += 1;
            }
        }
        counts
    }

    pub fn total_votes(&self) -> usize {
        self.votes.len()
    }

    pub fn render_results(&self) -> String {
        let counts = self.tally();
        let total = self.total_votes();
        let mut lines = vec![format!("--- Poll #{} Results: {} ---", self.id, self.question)];
        for (i, (option, count)) in self.options.iter().zip(counts).enumerate() {
            let pct = if total > 0 {
                count as f64 * 100.0 / total as f64
            } else {
                0.0
            };
            lines.push(format!("{}. {}: {} vote(s) ({:.1}%)", i + 1, option, count, pct));
        }
        lines.push(format!("Total votes: {}", total));
        lines.join("\n")
    }

    pub fn render_announcement(&self) -> String {
        let mut lines = vec![format!("Poll #{} created: {}", self.id, self.question)];
        for (i, option) in self.options.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, option));
        }
        lines.push(format!("Vote with: !vote {} <option number>", self.id));
        lines.join("\n")
    }
}

#[derive(Debug, Default)]
pub struct PollBook {
    polls: BTreeMap<u32, Poll>,
    next_id: u32,
}

impl PollBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        creator: UserId,
        question: &str,
        options: Vec<String>,
    ) -> Result<&Poll, PollError> {
        if question.trim().is_empty() || options.len() < 2 {
            return Err(PollError::TooFewOptions);
        }
        if options.len() > MAX_POLL_OPTIONS {
            return Err(PollError::TooManyOptions);
        }
        self.next_id += 1;
        let id = self.next_id;
        let poll = Poll {
            id,
            question: question.trim().to_string(),
            options,
            creator,
            votes: HashMap::new(),
        };
        Ok(self.polls.entry(id).or_insert(poll))
    }

    /// Record a vote for the 1-based `option`. A repeat vote replaces the old one.
    pub fn vote(&mut self, poll_id: u32, voter: UserId, option: usize) -> Result<&Poll, PollError> {
        let poll = self
            .polls
            .get_mut(&poll_id)
            .ok_or(PollError::UnknownPoll(poll_id))?;
        if option == 0 || option > poll.options.len() {
            return Err(PollError::UnknownOption {
                poll: poll_id,
                option,
            });
        }
        poll.votes.insert(voter, option - 1);
        Ok(poll)
    }

    pub fn get(&self, poll_id: u32) -> Option<&Poll> {
        self.polls.get(&poll_id)
    }

    pub fn latest(&self) -> Option<&Poll> {
        self.polls.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}

/// Extract the double-quoted segments of `input`: `"Q" "A" "B"` -> `[Q, A, B]`.
pub fn parse_quoted(input: &str) -> Vec<String> {
    input
        .split('"')
        .skip(1)
        .step_by(2)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_segments_are_extracted() {
        assert_eq!(
            parse_quoted(r#""Lunch?" "Pizza" "Tacos"  "#),
            vec!["Lunch?", "Pizza", "Tacos"]
        );
        assert!(parse_quoted("no quotes here").is_empty());
    }

    #[test]
    fn repeat_vote_moves_instead_of_counting_twice() {
        let mut book = PollBook::new();
        let id = book
            .create(1, "Color?", vec!["Red".into(), "Blue".into()])
            .unwrap()
            .id;
        book.vote(id, 10, 1).unwrap();
        book.vote(id, 11, 1).unwrap();
        book.vote(id, 10, 2).unwrap();
        let poll = book.get(id).unwrap();
        assert_eq!(poll.tally(), vec![1, 1]);
        assert_eq!(poll.total_votes(), 2);
        assert!(poll.render_results().contains("Red: 1 vote(s) (50.0%)"));
    }

    #[test]
    fn option_limits_are_enforced() {
        let mut book = PollBook::new();
        assert_eq!(
            book.create(1, "Q", vec!["only".into()]).unwrap_err(),
            PollError::TooFewOptions
        );
        let many: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert_eq!(book.create(1, "Q", many).unwrap_err(), PollError::TooManyOptions);
        let id = book.create(1, "Q", vec!["a".into(), "b".into()]).unwrap().id;
        assert_eq!(
            book.vote(id, 2, 3).unwrap_err(),
            PollError::UnknownOption { poll: id, option: 3 }
        );
        assert_eq!(book.vote(99, 2, 1).unwrap_err(), PollError::UnknownPoll(99));
    }
}
