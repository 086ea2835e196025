//! Topic pattern helpers.
//!
//! The gateway's own pattern syntax is path-style: `/` separates levels, `+`
//! matches exactly one level and a trailing `#` matches any number of
//! remaining levels (including none). This is also MQTT's filter syntax.
//!
//! A `Topic` holds the subscribers bound under one pattern; the in-process
//! backend keeps one per distinct pattern.

use std::collections::HashSet;

pub type SubscriberId = String;

/// Default pattern when a request names none: everything.
pub const MATCH_ALL: &str = "#";

#[derive(Debug, Default)]
pub struct Topic {
    pub pattern: String,
    pub subscribers: HashSet<SubscriberId>,
}

impl Topic {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, id: SubscriberId) {
        self.subscribers.insert(id);
    }

    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }

    pub fn matches(&self, key: &str) -> bool {
        matches(&self.pattern, key)
    }
}

/// Rewrites `pattern` character by character through `table`. Characters
/// without an entry pass through unchanged.
pub fn translate(pattern: &str, table: &[(char, char)]) -> String {
    pattern
        .chars()
        .map(|c| {
            table
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

/// Tests a concrete routing key against a path-style pattern.
pub fn matches(pattern: &str, key: &str) -> bool {
    let mut levels = key.split('/');
    for part in pattern.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}
