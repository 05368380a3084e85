use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push topics the server emits. The set is closed: a frame naming any
/// other topic is counted and dropped by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    /// A notification was created server-side for this identity
    #[serde(rename = "notification:new")]
    NotificationNew,
    #[serde(rename = "project:assigned")]
    ProjectAssigned,
    #[serde(rename = "project:unassigned")]
    ProjectUnassigned,
    /// A leave request's status changed (employee-facing)
    #[serde(rename = "leave:status")]
    LeaveStatus,
    /// A new leave request exists (reviewer-facing)
    #[serde(rename = "leave:created")]
    LeaveCreated,
    #[serde(rename = "attendance:checkin")]
    AttendanceCheckin,
    #[serde(rename = "attendance:checkout")]
    AttendanceCheckout,
    /// Payload carries the new audit entry
    #[serde(rename = "audit:log")]
    AuditLog,
    /// Payload is `{message}`, surfaced verbatim as a blocking notice
    #[serde(rename = "audit:alert")]
    AuditAlert,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::NotificationNew,
        Topic::ProjectAssigned,
        Topic::ProjectUnassigned,
        Topic::LeaveStatus,
        Topic::LeaveCreated,
        Topic::AttendanceCheckin,
        Topic::AttendanceCheckout,
        Topic::AuditLog,
        Topic::AuditAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NotificationNew => "notification:new",
            Topic::ProjectAssigned => "project:assigned",
            Topic::ProjectUnassigned => "project:unassigned",
            Topic::LeaveStatus => "leave:status",
            Topic::LeaveCreated => "leave:created",
            Topic::AttendanceCheckin => "attendance:checkin",
            Topic::AttendanceCheckout => "attendance:checkout",
            Topic::AuditLog => "audit:log",
            Topic::AuditAlert => "audit:alert",
        }
    }

    /// Whether the payload carries data the core uses. For every other
    /// topic the payload is only a trigger.
    pub fn carries_payload(&self) -> bool {
        matches!(self, Topic::AuditLog | Topic::AuditAlert)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown topic: {}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

/// One inbound frame from the push channel, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

impl PushFrame {
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self {
            topic: topic.as_str().to_string(),
            payload,
        }
    }

    pub fn topic(&self) -> Result<Topic, UnknownTopic> {
        self.topic.parse()
    }
}

/// Opaque identity sent in the join message; the server routes events for
/// this identity to our channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound join message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JoinMessage {
    Join { identity: Identity },
}
