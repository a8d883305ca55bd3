//! Serializable identifiers and tags shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an execution unit (one outreach run).
pub type RunId = u64;

/// Identifier of a work item (one prospect).
pub type ItemId = u64;

/// Identifier of the agent configuration that owns a run.
pub type AgentId = u64;

/// Category of rate-limited outbound behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Social-network connection request.
    ConnectionRequest,
    /// Social-network direct message.
    Message,
    /// Social-network profile visit.
    ProfileVisit,
    /// Likes, comments and similar engagement.
    Engagement,
    /// Social-network people search.
    Search,
    /// Outbound email.
    EmailSend,
    /// Inbox poll for replies.
    EmailCheck,
    /// Web search about a prospect's company.
    CompanyResearch,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::ConnectionRequest,
        Self::Message,
        Self::ProfileVisit,
        Self::Engagement,
        Self::Search,
        Self::EmailSend,
        Self::EmailCheck,
        Self::CompanyResearch,
    ];

    /// Stable snake_case tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::Message => "message",
            Self::ProfileVisit => "profile_visit",
            Self::Engagement => "engagement",
            Self::Search => "search",
            Self::EmailSend => "email_send",
            Self::EmailCheck => "email_check",
            Self::CompanyResearch => "company_research",
        }
    }

    /// Warm-up category this action counts against, if any.
    pub const fn warmup_category(self) -> Option<WarmupCategory> {
        match self {
            Self::ConnectionRequest => Some(WarmupCategory::Connections),
            Self::Message => Some(WarmupCategory::Messages),
            Self::ProfileVisit => Some(WarmupCategory::Visits),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`ActionType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownActionType(s.to_string()))
    }
}

/// Coarse bucket used by the warm-up schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupCategory {
    /// Connection requests.
    Connections,
    /// Direct messages.
    Messages,
    /// Profile visits.
    Visits,
}
