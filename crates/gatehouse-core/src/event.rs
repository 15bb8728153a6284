//! Incoming events and the trigger kinds a pipeline can accept.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Event kinds a pipeline may be configured to run on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Push => "push",
            TriggerKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an incoming event. Unrecognised kinds are kept verbatim so they can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventKind {
    Push,
    PullRequest,
    Other(String),
}

impl EventKind {
    /// The trigger kind this event corresponds to, if any.
    pub fn trigger_kind(&self) -> Option<TriggerKind> {
        match self {
            EventKind::Push => Some(TriggerKind::Push),
            EventKind::PullRequest => Some(TriggerKind::PullRequest),
            EventKind::Other(_) => None,
        }
    }
}

impl FromStr for EventKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "push" => EventKind::Push,
            "pull_request" | "pull-request" => EventKind::PullRequest,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.to_string()
    }
}

impl From<TriggerKind> for EventKind {
    fn from(value: TriggerKind) -> Self {
        match value {
            TriggerKind::Push => EventKind::Push,
            TriggerKind::PullRequest => EventKind::PullRequest,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::PullRequest => f.write_str("pull_request"),
            EventKind::Other(kind) => f.write_str(kind),
        }
    }
}

/// An incoming event that may start a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    /// Commit SHA, branch or other ref the event points at.
    pub git_ref: String,
}

impl Event {
    pub fn new(kind: EventKind, git_ref: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
        }
    }

    pub fn push(git_ref: impl Into<String>) -> Self {
        Self::new(EventKind::Push, git_ref)
    }

    pub fn pull_request(git_ref: impl Into<String>) -> Self {
        Self::new(EventKind::PullRequest, git_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("push".parse::<EventKind>().unwrap(), EventKind::Push);
        assert_eq!(
            "pull_request".parse::<EventKind>().unwrap(),
            EventKind::PullRequest
        );
        assert_eq!(
            "pull-request".parse::<EventKind>().unwrap(),
            EventKind::PullRequest
        );
    }

    #[test]
    fn keeps_unknown_kinds() {
        let kind: EventKind = "issue_comment".parse().unwrap();
        assert_eq!(kind, EventKind::Other("issue_comment".to_string()));
        assert_eq!(kind.trigger_kind(), None);
        assert_eq!(kind.to_string(), "issue_comment");
    }

    #[test]
    fn trigger_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TriggerKind::PullRequest).unwrap();
        assert_eq!(json, "\"pull_request\"");
    }

    #[test]
    fn event_kind_serializes_as_plain_string() {
        let event = Event::new("issue_comment".parse().unwrap(), "main");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "issue_comment");
    }
}
