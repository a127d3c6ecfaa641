use std::collections::BTreeSet;

use super::matchers::{classify, LineMatch};

/// Names the server uses for itself in chat-like output.
const RESERVED_NAMES: [&str; 2] = ["Server", "Rcon"];

/// Players currently connected, as far as console output tells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRoster {
    players: BTreeSet<String>,
}

fn is_reserved(name: &str) -> bool {
    name.is_empty() || RESERVED_NAMES.contains(&name)
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the roster changed.
    pub fn join(&mut self, name: &str) -> bool {
        if is_reserved(name) {
            return false;
        }
        self.players.insert(name.to_owned())
    }

    pub fn leave(&mut self, name: &str) -> bool {
        self.players.remove(name)
    }

    pub fn replace<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: BTreeSet<String> = names
            .into_iter()
            .filter(|name| !is_reserved(name.as_ref()))
            .map(|name| name.as_ref().to_owned())
            .collect();
        if next == self.players {
            return false;
        }
        self.players = next;
        true
    }

    pub fn reset(&mut self) -> bool {
        if self.players.is_empty() {
            return false;
        }
        self.players.clear();
        true
    }

    /// Feeds one console line through the roster matchers.
    pub fn apply_line(&mut self, line: &str) -> bool {
        match classify(line) {
            Some(found) => self.apply(&found),
            None => false,
        }
    }

    pub fn apply(&mut self, found: &LineMatch) -> bool {
        match found {
            LineMatch::Joined(name) => self.join(name),
            LineMatch::Left(name) => self.leave(name),
            LineMatch::PlayerList(names) => self.replace(names),
            LineMatch::Ready => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains(name)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Sorted snapshot of the current names.
    pub fn players(&self) -> Vec<String> {
        self.players.iter().cloned().collect()
    }
}
