use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DONE_PATTERN: Regex =
        Regex::new(r"\bDone\s*\(").expect("Failed to compile DONE_PATTERN regex");
    static ref JOIN_PATTERN: Regex = Regex::new(r"(?:^|[\s:\]])([^\s:\]\[]*) joined the game\s*$")
        .expect("Failed to compile JOIN_PATTERN regex");
    static ref LEAVE_PATTERN: Regex = Regex::new(r"(?:^|[\s:\]])([^\s:\]\[]*) left the game\s*$")
        .expect("Failed to compile LEAVE_PATTERN regex");
    static ref LIST_PATTERN: Regex =
        Regex::new(r"players online:(.*)$").expect("Failed to compile LIST_PATTERN regex");
}

/// Everything the daemon understands about console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMatcher {
    Ready,
    PlayerJoined,
    PlayerLeft,
    PlayerList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    Ready,
    Joined(String),
    Left(String),
    PlayerList(Vec<String>),
}

impl LineMatcher {
    /// Evaluation order; the first hit wins.
    pub const ALL: [LineMatcher; 4] = [
        LineMatcher::Ready,
        LineMatcher::PlayerJoined,
        LineMatcher::PlayerLeft,
        LineMatcher::PlayerList,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LineMatcher::Ready => "ready",
            LineMatcher::PlayerJoined => "player-joined",
            LineMatcher::PlayerLeft => "player-left",
            LineMatcher::PlayerList => "player-list",
        }
    }

    pub fn pattern(&self) -> &'static Regex {
        match self {
            LineMatcher::Ready => &DONE_PATTERN,
            LineMatcher::PlayerJoined => &JOIN_PATTERN,
            LineMatcher::PlayerLeft => &LEAVE_PATTERN,
            LineMatcher::PlayerList => &LIST_PATTERN,
        }
    }

    pub fn apply(&self, line: &str) -> Option<LineMatch> {
        let caps = self.pattern().captures(line)?;
        Some(match self {
            LineMatcher::Ready => LineMatch::Ready,
            LineMatcher::PlayerJoined => LineMatch::Joined(caps[1].to_owned()),
            LineMatcher::PlayerLeft => LineMatch::Left(caps[1].to_owned()),
            LineMatcher::PlayerList => LineMatch::PlayerList(
                caps[1]
                    .split(',')
                    .map(|name| name.trim().to_owned())
                    .filter(|name| !name.is_empty())
                    .collect(),
            ),
        })
    }
}

pub fn classify(line: &str) -> Option<LineMatch> {
    LineMatcher::ALL.iter().find_map(|matcher| matcher.apply(line))
}
