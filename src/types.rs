//! Core types for the coordination engine.

use crate::db::MemoryRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// `message_type` of task rows.
pub const TASK_MESSAGE_TYPE: &str = "task";
/// `message_type` of claim and session lifecycle rows.
pub const RESOURCE_MESSAGE_TYPE: &str = "resource";

/// Who is calling, and where. Supplied by the surrounding process, never
/// resolved or authenticated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
    /// Workspace every read and write is scoped to.
    pub fold_id: String,
    /// Unique per connection, e.g. "armand/quiet-oak".
    pub agent: String,
    /// Base name used for grouping, e.g. "armand".
    pub user: String,
    pub session_id: String,
}

impl AgentContext {
    pub fn new(
        fold_id: impl Into<String>,
        agent: impl Into<String>,
        user: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            fold_id: fold_id.into(),
            agent: agent.into(),
            user: user.into(),
            session_id: session_id.into(),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    Claimed,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Open,
        TaskStatus::Claimed,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Claimed => "claimed",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Active tasks take part in title dedup.
    pub fn is_active(&self) -> bool {
        !matches!(self, TaskStatus::Done)
    }

    /// Statuses that name a current holder.
    pub fn is_held(&self) -> bool {
        matches!(self, TaskStatus::Claimed | TaskStatus::InProgress)
    }

    /// Whether an update may move a task from `self` to `next`.
    /// Re-stating the current status is allowed except on a done task.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if *self == next {
            return *self != Done;
        }
        matches!(
            (self, next),
            (Open, Claimed)
                | (Open, InProgress)
                | (Claimed, InProgress)
                | (InProgress, Done)
                | (Claimed, Blocked)
                | (InProgress, Blocked)
                | (Blocked, InProgress)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TaskStatus::Open),
            "claimed" => Ok(TaskStatus::Claimed),
            "in_progress" | "in-progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Task priority. Variant order is severity order: `Urgent` sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// 0 for urgent through 3 for low.
    pub fn severity(&self) -> u8 {
        *self as u8
    }

    /// True if `self` is at least as severe as `floor`.
    pub fn at_or_above(&self, floor: Priority) -> bool {
        self.severity() <= floor.severity()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Metadata map of a task row.
///
/// Lenient on read: missing fields take defaults, a field holding a value of
/// the wrong shape (an unknown priority, a non-string note) reads as its
/// default, and unrecognized keys are kept in `extra` so updates never drop
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskMeta {
    #[serde(deserialize_with = "lenient::string")]
    pub event: String,
    #[serde(deserialize_with = "lenient::parsed")]
    pub status: TaskStatus,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::parsed")]
    pub priority: Priority,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub assigned_to: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub parent_task: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub milestone: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub created_by: Option<String>,
    #[serde(deserialize_with = "lenient::opt_time")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_time")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub blocked_reason: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field decoders that never fail on a well-formed JSON value.
mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    /// Enum stored as a string. Unknown or non-string values read as the default.
    pub fn parsed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_string(deserializer)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(str::to_string))
    }

    /// RFC 3339 timestamp; anything else reads as unset.
    pub fn opt_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}

impl TaskMeta {
    pub fn from_map(map: &Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(map.clone()))
    }

    pub fn to_map(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Append a note as its own `[timestamp] text` line.
    pub fn append_note(&mut self, note: &str, at: DateTime<Utc>) {
        let line = format!("[{}] {}", at.to_rfc3339(), note);
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, line),
            _ => line,
        });
    }
}

/// Flattened view of a task row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    #[serde(skip)]
    pub seq: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub milestone: Option<String>,
    pub parent_task: Option<String>,
    pub created_by: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub notes: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Task {
    /// Flatten a task row. Returns the decoded metadata alongside so callers
    /// that rewrite the row keep unknown keys.
    pub fn from_row(row: &MemoryRow) -> serde_json::Result<(Task, TaskMeta)> {
        let meta = TaskMeta::from_map(&row.metadata)?;
        let task = Task {
            id: row.id.clone(),
            seq: row.seq,
            title: meta.title.clone(),
            description: meta.description.clone().filter(|d| !d.is_empty()),
            status: meta.status,
            priority: meta.priority,
            assigned_to: meta.assigned_to.clone().filter(|a| !a.is_empty()),
            milestone: meta.milestone.clone().filter(|m| !m.is_empty()),
            parent_task: meta.parent_task.clone().filter(|p| !p.is_empty()),
            created_by: meta.created_by.clone().unwrap_or_else(|| row.agent.clone()),
            claimed_at: meta.claimed_at,
            completed_at: meta.completed_at,
            blocked_reason: meta.blocked_reason.clone().filter(|b| !b.is_empty()),
            notes: meta.notes.clone().filter(|n| !n.is_empty()),
            created_at: row.ts,
        };
        Ok((task, meta))
    }

    /// Text compared against claim scopes when scoring contention.
    pub fn scope_text(&self) -> String {
        match self.description {
            Some(ref d) => format!("{} {}", self.title, d),
            None => self.title.clone(),
        }
    }

    pub fn summary(&self) -> TaskRef {
        TaskRef {
            id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            assigned_to: self.assigned_to.clone(),
        }
    }
}

/// Enough of a task for a caller to act on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
}

/// Kind of a resource event, stored as `metadata.event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Task,
    Claim,
    Unclaim,
    SessionEnd,
    SessionDone,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Task => "task",
            EventKind::Claim => "claim",
            EventKind::Unclaim => "unclaim",
            EventKind::SessionEnd => "session_end",
            EventKind::SessionDone => "session_done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(EventKind::Task),
            "claim" => Some(EventKind::Claim),
            "unclaim" => Some(EventKind::Unclaim),
            "session_end" => Some(EventKind::SessionEnd),
            "session_done" => Some(EventKind::SessionDone),
            _ => None,
        }
    }

    /// Events that end a session's claims.
    pub fn ends_session(&self) -> bool {
        matches!(self, EventKind::SessionEnd | EventKind::SessionDone)
    }
}

/// Metadata map of a claim row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMeta {
    pub event: String,
    pub scope: String,
    pub files: Vec<String>,
    pub user: Option<String>,
    pub task_id: Option<String>,
}

/// A claim event as recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimRecord {
    pub id: String,
    pub agent: String,
    pub scope: String,
    pub files: Vec<String>,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub created_at: i64,
}

/// A claim that survived the liveness fold: the newest live claim of an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveClaim {
    pub agent: String,
    pub scope: String,
    pub files: Vec<String>,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Session outcome recorded by `end_session` with a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Blocked,
    Failed,
    Partial,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Blocked => "blocked",
            SessionOutcome::Failed => "failed",
            SessionOutcome::Partial => "partial",
        }
    }
}

impl FromStr for SessionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "completed" => Ok(SessionOutcome::Completed),
            "blocked" => Ok(SessionOutcome::Blocked),
            "failed" => Ok(SessionOutcome::Failed),
            "partial" => Ok(SessionOutcome::Partial),
            other => Err(format!("unknown session outcome: {}", other)),
        }
    }
}
